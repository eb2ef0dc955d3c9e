//! Player hitboxes: vertical capsules.

use tracer_shared::{Vec3, PLAYER_HEIGHT, PLAYER_RADIUS};

/// Upright capsule standing on `base`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capsule {
    /// Feet position (bottom of the capsule).
    pub base: Vec3,
    /// Radius of the cylinder and both caps.
    pub radius: f32,
    /// Total height, caps included.
    pub height: f32,
}

impl Capsule {
    /// Standard player hitbox.
    #[must_use]
    pub fn player(base: Vec3) -> Self {
        Self::new(base, PLAYER_RADIUS, PLAYER_HEIGHT)
    }

    /// Capsule with explicit dimensions. Height is raised to at least `2 * radius`.
    #[must_use]
    pub fn new(base: Vec3, radius: f32, height: f32) -> Self {
        let height = height.max(radius * 2.0);
        Self { base, radius, height }
    }

    /// Centres of the bottom and top caps.
    fn segment(&self) -> (f32, f32) {
        (self.base.y + self.radius, self.base.y + self.height - self.radius)
    }

    /// Distance along a unit ray to the first contact, if within `max_distance`.
    ///
    /// An origin inside the capsule reports zero.
    #[must_use]
    pub fn ray_entry(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        let (y0, y1) = self.segment();
        let r2 = self.radius * self.radius;
        let mut best: Option<f32> = None;

        // Cylinder side, in the XZ plane
        let mx = origin.x - self.base.x;
        let mz = origin.z - self.base.z;
        let a = direction.x * direction.x + direction.z * direction.z;
        let c = mx * mx + mz * mz - r2;
        if a > f32::EPSILON {
            let b = mx * direction.x + mz * direction.z;
            let disc = b * b - a * c;
            if disc >= 0.0 {
                let t = ((-b - disc.sqrt()) / a).max(0.0);
                let far = (-b + disc.sqrt()) / a;
                let y = origin.y + direction.y * t;
                if far >= 0.0 && (y0..=y1).contains(&y) {
                    best = Some(t);
                }
            }
        } else if c <= 0.0 {
            // Vertical ray inside the infinite cylinder: only the caps matter,
            // unless the origin already sits within the straight section.
            if (y0..=y1).contains(&origin.y) {
                best = Some(0.0);
            }
        }

        // End caps
        for centre_y in [y0, y1] {
            let centre = Vec3::new(self.base.x, centre_y, self.base.z);
            if let Some(t) = ray_sphere(origin, direction, centre, r2) {
                if best.map_or(true, |b| t < b) {
                    best = Some(t);
                }
            }
        }

        best.filter(|t| *t <= max_distance)
    }
}

/// Entry distance of a unit ray into a sphere; zero if the origin is inside.
fn ray_sphere(origin: Vec3, direction: Vec3, centre: Vec3, r2: f32) -> Option<f32> {
    let m = origin - centre;
    let b = m.dot(direction);
    let c = m.dot(m) - r2;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    Some((-b - disc.sqrt()).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AHEAD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    #[test]
    fn test_hits_cylinder_side() {
        let capsule = Capsule::player(Vec3::new(0.0, 0.0, -10.0));
        let t = capsule.ray_entry(Vec3::new(0.0, 1.0, 0.0), AHEAD, 100.0).expect("hit");
        assert!((t - (10.0 - PLAYER_RADIUS)).abs() < 1e-4);
    }

    #[test]
    fn test_misses_beside_and_above() {
        let capsule = Capsule::player(Vec3::new(0.0, 0.0, -10.0));
        assert!(capsule.ray_entry(Vec3::new(0.5, 1.0, 0.0), AHEAD, 100.0).is_none());
        assert!(capsule.ray_entry(Vec3::new(0.0, 1.9, 0.0), AHEAD, 100.0).is_none());
    }

    #[test]
    fn test_hits_top_cap() {
        let capsule = Capsule::player(Vec3::new(0.0, 0.0, -10.0));
        // Through the upper cap, above the straight section
        let t = capsule.ray_entry(Vec3::new(0.0, 1.6, 0.0), AHEAD, 100.0).expect("hit");
        assert!(t > 10.0 - PLAYER_RADIUS && t < 10.0);

        let down = Vec3::new(0.0, -1.0, 0.0);
        let t = capsule.ray_entry(Vec3::new(0.0, 5.0, -10.0), down, 100.0).expect("hit");
        assert!((t - (5.0 - PLAYER_HEIGHT)).abs() < 1e-4);
    }

    #[test]
    fn test_respects_range_and_direction() {
        let capsule = Capsule::player(Vec3::new(0.0, 0.0, -10.0));
        assert!(capsule.ray_entry(Vec3::new(0.0, 1.0, 0.0), AHEAD, 5.0).is_none());
        assert!(capsule.ray_entry(Vec3::new(0.0, 1.0, 0.0), -AHEAD, 100.0).is_none());
    }

    #[test]
    fn test_origin_inside_reports_zero() {
        let capsule = Capsule::player(Vec3::ZERO);
        assert_eq!(capsule.ray_entry(Vec3::new(0.0, 1.0, 0.0), AHEAD, 1.0), Some(0.0));
    }
}
