//! Flat arena: a ground plane plus axis-aligned walls.
//!
//! Reference [`CollisionWorld`] used by the headless server, the benches
//! and the tests. Movement resolves one axis at a time (X, Z, then Y) and
//! cancels any axis step that would push the body into a wall.

use tracer_shared::Vec3;

use super::traits::{Body, CollisionWorld, EntityId};

/// Entity id reported for the ground plane.
pub const GROUND_ENTITY: EntityId = 0;

/// Axis-aligned box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Box from two corners in any order.
    #[must_use]
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Bounding box of a body standing at `position`.
    #[must_use]
    pub fn around_body(body: &Body, position: Vec3) -> Self {
        Self {
            min: Vec3::new(position.x - body.radius, position.y, position.z - body.radius),
            max: Vec3::new(position.x + body.radius, position.y + body.height, position.z + body.radius),
        }
    }

    /// Strict overlap; touching faces do not count.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Entry distance of a ray, slab method. Zero if the origin is inside.
    #[must_use]
    pub fn ray_entry(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_max = f32::INFINITY;

        for (o, d, lo, hi) in [
            (origin.x, direction.x, self.min.x, self.max.x),
            (origin.y, direction.y, self.min.y, self.max.y),
            (origin.z, direction.z, self.min.z, self.max.z),
        ] {
            if d.abs() < f32::EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (near, far) = {
                let a = (lo - o) * inv;
                let b = (hi - o) * inv;
                if a <= b { (a, b) } else { (b, a) }
            };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// Ground plane at a fixed height with box walls on top.
#[derive(Clone, Debug, Default)]
pub struct FlatArena {
    ground_height: f32,
    walls: Vec<Aabb>,
}

impl FlatArena {
    /// Bare ground plane.
    #[must_use]
    pub const fn new(ground_height: f32) -> Self {
        Self {
            ground_height,
            walls: Vec::new(),
        }
    }

    /// Square arena at y = 0 enclosed by four walls at `half_extent`.
    #[must_use]
    pub fn open(half_extent: f32) -> Self {
        const THICKNESS: f32 = 1.0;
        const HEIGHT: f32 = 5.0;
        let e = half_extent;
        let t = THICKNESS;
        Self::new(0.0)
            .with_wall(Aabb::new(Vec3::new(-e - t, 0.0, -e - t), Vec3::new(e + t, HEIGHT, -e)))
            .with_wall(Aabb::new(Vec3::new(-e - t, 0.0, e), Vec3::new(e + t, HEIGHT, e + t)))
            .with_wall(Aabb::new(Vec3::new(-e - t, 0.0, -e), Vec3::new(-e, HEIGHT, e)))
            .with_wall(Aabb::new(Vec3::new(e, 0.0, -e), Vec3::new(e + t, HEIGHT, e)))
    }

    /// Adds a wall. Wall `i` reports entity id `i + 1`.
    #[must_use]
    pub fn with_wall(mut self, wall: Aabb) -> Self {
        self.walls.push(wall);
        self
    }

    /// Ground height.
    #[must_use]
    pub const fn ground_height(&self) -> f32 {
        self.ground_height
    }

    /// Walls in id order.
    #[must_use]
    pub fn walls(&self) -> &[Aabb] {
        &self.walls
    }

    fn blocked(&self, body: &Body, position: Vec3) -> bool {
        let bounds = Aabb::around_body(body, position);
        self.walls.iter().any(|wall| wall.overlaps(&bounds))
    }
}

impl CollisionWorld for FlatArena {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<(EntityId, Vec3)> {
        let mut best: Option<(EntityId, f32)> = None;

        if direction.y < -f32::EPSILON && origin.y >= self.ground_height {
            let t = (self.ground_height - origin.y) / direction.y;
            if t <= max_distance {
                best = Some((GROUND_ENTITY, t));
            }
        }

        for (index, wall) in self.walls.iter().enumerate() {
            if let Some(t) = wall.ray_entry(origin, direction) {
                if t <= max_distance && best.map_or(true, |(_, b)| t < b) {
                    best = Some((index as EntityId + 1, t));
                }
            }
        }

        best.map(|(id, t)| (id, origin + direction * t))
    }

    fn move_with_collision(&self, body: &Body, desired: Vec3) -> Vec3 {
        let mut position = body.position;

        // X
        if desired.x != 0.0 {
            let candidate = Vec3::new(position.x + desired.x, position.y, position.z);
            if !self.blocked(body, candidate) {
                position = candidate;
            }
        }

        // Z
        if desired.z != 0.0 {
            let candidate = Vec3::new(position.x, position.y, position.z + desired.z);
            if !self.blocked(body, candidate) {
                position = candidate;
            }
        }

        // Y, clamped to the ground
        if desired.y != 0.0 {
            let y = (position.y + desired.y).max(self.ground_height.min(position.y));
            let candidate = Vec3::new(position.x, y, position.z);
            if !self.blocked(body, candidate) {
                position = candidate;
            }
        }

        position - body.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_stops_fall() {
        let arena = FlatArena::new(0.0);
        let body = Body::player(Vec3::new(0.0, 0.5, 0.0));
        let moved = arena.move_with_collision(&body, Vec3::new(0.0, -2.0, 0.0));
        assert!((moved.y + 0.5).abs() < 1e-6);

        let grounded = Body::player(Vec3::ZERO);
        let moved = arena.move_with_collision(&grounded, Vec3::new(0.1, -0.01, 0.0));
        assert_eq!(moved, Vec3::new(0.1, 0.0, 0.0));
    }

    #[test]
    fn test_wall_blocks_horizontal_axis_only() {
        let arena = FlatArena::new(0.0).with_wall(Aabb::new(Vec3::new(1.0, 0.0, -5.0), Vec3::new(2.0, 3.0, 5.0)));
        let body = Body::player(Vec3::new(0.5, 0.0, 0.0));
        let moved = arena.move_with_collision(&body, Vec3::new(0.3, 0.0, 0.2));
        assert_eq!(moved.x, 0.0);
        assert!((moved.z - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_raycast_hits_nearest_wall() {
        let arena = FlatArena::new(0.0)
            .with_wall(Aabb::new(Vec3::new(-1.0, 0.0, -10.0), Vec3::new(1.0, 3.0, -9.0)))
            .with_wall(Aabb::new(Vec3::new(-1.0, 0.0, -5.0), Vec3::new(1.0, 3.0, -4.0)));
        let hit = arena.raycast(Vec3::new(0.0, 1.6, 0.0), Vec3::new(0.0, 0.0, -1.0), 100.0);
        let (id, point) = hit.expect("wall in the way");
        assert_eq!(id, 2);
        assert!((point.z + 4.0).abs() < 1e-5);

        assert!(arena.raycast(Vec3::new(0.0, 1.6, 0.0), Vec3::new(0.0, 0.0, -1.0), 3.0).is_none());
    }

    #[test]
    fn test_raycast_hits_ground() {
        let arena = FlatArena::new(0.0);
        let dir = Vec3::new(0.0, -1.0, -1.0).normalize_or_zero();
        let (id, point) = arena.raycast(Vec3::new(0.0, 2.0, 0.0), dir, 10.0).expect("ground");
        assert_eq!(id, GROUND_ENTITY);
        assert!(point.y.abs() < 1e-5);
    }

    #[test]
    fn test_open_arena_encloses_players() {
        let arena = FlatArena::open(10.0);
        assert_eq!(arena.walls().len(), 4);
        let body = Body::player(Vec3::new(9.5, 0.0, 0.0));
        let moved = arena.move_with_collision(&body, Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(moved.x, 0.0);
    }
}
