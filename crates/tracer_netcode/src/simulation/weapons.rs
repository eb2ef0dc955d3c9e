//! # Weapons
//!
//! Data-driven weapon descriptors and the single fire routine every weapon
//! goes through. There is no per-weapon behaviour code: a shotgun is a
//! descriptor with `pellet_count = 8` and some spread.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracer_shared::Vec3;

use crate::config::invalid;
use crate::error::ConfigResult;

/// Static description of a weapon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeaponDescriptor {
    /// Display name.
    pub name: String,
    /// Damage per pellet.
    pub damage: f32,
    /// Shots per second.
    pub fire_rate: f32,
    /// Reload duration in seconds.
    pub reload_time: f32,
    /// Rounds per magazine.
    pub magazine_size: u32,
    /// Rays per shot.
    pub pellet_count: u32,
    /// Cone half-angle in degrees for pellet spread.
    pub spread_degrees: f32,
    /// Maximum hit distance.
    pub range: f32,
}

impl Default for WeaponDescriptor {
    fn default() -> Self {
        Self::rifle()
    }
}

impl WeaponDescriptor {
    /// Automatic rifle.
    #[must_use]
    pub fn rifle() -> Self {
        Self {
            name: "rifle".to_owned(),
            damage: 25.0,
            fire_rate: 10.0,
            reload_time: 2.0,
            magazine_size: 30,
            pellet_count: 1,
            spread_degrees: 0.0,
            range: 200.0,
        }
    }

    /// Pump shotgun.
    #[must_use]
    pub fn shotgun() -> Self {
        Self {
            name: "shotgun".to_owned(),
            damage: 12.0,
            fire_rate: 1.2,
            reload_time: 2.5,
            magazine_size: 6,
            pellet_count: 8,
            spread_degrees: 6.0,
            range: 40.0,
        }
    }

    /// Sidearm.
    #[must_use]
    pub fn pistol() -> Self {
        Self {
            name: "pistol".to_owned(),
            damage: 20.0,
            fire_rate: 4.0,
            reload_time: 1.5,
            magazine_size: 12,
            pellet_count: 1,
            spread_degrees: 0.0,
            range: 100.0,
        }
    }

    /// Rifle, shotgun, pistol.
    #[must_use]
    pub fn default_loadout() -> Vec<Self> {
        vec![Self::rifle(), Self::shotgun(), Self::pistol()]
    }

    /// Seconds between shots.
    #[must_use]
    pub fn fire_interval(&self) -> f64 {
        1.0 / f64::from(self.fire_rate)
    }

    /// Checks the descriptor is usable.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.damage.is_finite() && self.damage >= 0.0) {
            return Err(invalid("weapons.damage", format!("{}: must not be negative", self.name)));
        }
        if !(self.fire_rate.is_finite() && self.fire_rate > 0.0) {
            return Err(invalid("weapons.fire_rate", format!("{}: must be positive", self.name)));
        }
        if !(self.reload_time.is_finite() && self.reload_time >= 0.0) {
            return Err(invalid("weapons.reload_time", format!("{}: must not be negative", self.name)));
        }
        if self.magazine_size == 0 {
            return Err(invalid("weapons.magazine_size", format!("{}: must be at least 1", self.name)));
        }
        if self.pellet_count == 0 || self.pellet_count > 32 {
            return Err(invalid("weapons.pellet_count", format!("{}: must be within 1..=32", self.name)));
        }
        if !(self.spread_degrees.is_finite() && (0.0..90.0).contains(&self.spread_degrees)) {
            return Err(invalid("weapons.spread_degrees", format!("{}: must be within 0..90", self.name)));
        }
        if !(self.range.is_finite() && self.range > 0.0) {
            return Err(invalid("weapons.range", format!("{}: must be positive", self.name)));
        }
        Ok(())
    }
}

/// Mutable per-slot weapon state. Part of every snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WeaponState {
    /// Rounds in the magazine.
    pub ammo: u32,
    /// Reload in progress.
    pub reloading: bool,
    /// Time the current reload started.
    pub reload_started_at: f64,
    /// Earliest time the next shot may leave.
    pub next_fire_at: f64,
}

impl WeaponState {
    /// Full magazine, ready to fire.
    #[must_use]
    pub const fn loaded(descriptor_magazine: u32) -> Self {
        Self {
            ammo: descriptor_magazine,
            reloading: false,
            reload_started_at: 0.0,
            next_fire_at: 0.0,
        }
    }
}

/// Result of pulling the trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireOutcome {
    /// A round left the barrel.
    Fired,
    /// Still cycling from the previous shot.
    Cooldown,
    /// Mid-reload.
    Reloading,
    /// Magazine empty; a reload was started.
    Empty,
}

/// Starts a reload unless one is running or the magazine is full.
///
/// Returns true if a reload started.
pub fn start_reload(weapon: &mut WeaponState, descriptor: &WeaponDescriptor, now: f64) -> bool {
    if weapon.reloading || weapon.ammo >= descriptor.magazine_size {
        return false;
    }
    weapon.reloading = true;
    weapon.reload_started_at = now;
    true
}

/// Completes the reload once `now >= reload_started_at + reload_time`.
///
/// Returns true if the reload completed on this call.
pub fn advance_reload(weapon: &mut WeaponState, descriptor: &WeaponDescriptor, now: f64) -> bool {
    if weapon.reloading && now >= weapon.reload_started_at + f64::from(descriptor.reload_time) {
        weapon.ammo = descriptor.magazine_size;
        weapon.reloading = false;
        return true;
    }
    false
}

/// Cancels a reload in progress (weapon switch).
pub fn cancel_reload(weapon: &mut WeaponState) {
    weapon.reloading = false;
}

/// The one fire routine. Consumes a round and arms the cooldown on success.
pub fn try_fire(weapon: &mut WeaponState, descriptor: &WeaponDescriptor, now: f64) -> FireOutcome {
    if weapon.reloading {
        return FireOutcome::Reloading;
    }
    if now < weapon.next_fire_at {
        return FireOutcome::Cooldown;
    }
    if weapon.ammo == 0 {
        start_reload(weapon, descriptor, now);
        return FireOutcome::Empty;
    }
    weapon.ammo -= 1;
    weapon.next_fire_at = now + descriptor.fire_interval();
    FireOutcome::Fired
}

/// Pellet directions for one shot.
///
/// Spread is drawn from a generator seeded by `seed`, so the same shot
/// always produces the same pellets on every machine.
#[must_use]
pub fn pellet_directions(aim: Vec3, descriptor: &WeaponDescriptor, seed: u64) -> Vec<Vec3> {
    let aim = aim.normalize_or_zero();
    if descriptor.pellet_count <= 1 || descriptor.spread_degrees <= 0.0 {
        return vec![aim; descriptor.pellet_count.max(1) as usize];
    }

    // Orthonormal basis around the aim vector
    let helper = if aim.y.abs() < 0.99 { Vec3::Y } else { Vec3::new(1.0, 0.0, 0.0) };
    let right = cross(aim, helper).normalize_or_zero();
    let up = cross(right, aim);

    let max_tan = descriptor.spread_degrees.to_radians().tan();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..descriptor.pellet_count)
        .map(|_| {
            let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
            // sqrt for an even distribution over the cone's disc
            let radius = rng.gen::<f32>().sqrt() * max_tan;
            let (s, c) = angle.sin_cos();
            (aim + right * (c * radius) + up * (s * radius)).normalize_or_zero()
        })
        .collect()
}

/// Seed for a shot's spread: unique per player and command.
#[must_use]
pub fn shot_seed(player_id: u32, sequence_number: u32) -> u64 {
    (u64::from(player_id) << 32) | u64::from(sequence_number)
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_consumes_ammo_and_cools_down() {
        let rifle = WeaponDescriptor::rifle();
        let mut weapon = WeaponState::loaded(rifle.magazine_size);

        assert_eq!(try_fire(&mut weapon, &rifle, 0.0), FireOutcome::Fired);
        assert_eq!(weapon.ammo, 29);
        assert_eq!(try_fire(&mut weapon, &rifle, 0.05), FireOutcome::Cooldown);
        assert_eq!(try_fire(&mut weapon, &rifle, 0.1), FireOutcome::Fired);
        assert_eq!(weapon.ammo, 28);
    }

    #[test]
    fn test_empty_magazine_starts_reload() {
        let pistol = WeaponDescriptor::pistol();
        let mut weapon = WeaponState { ammo: 0, ..WeaponState::loaded(12) };

        assert_eq!(try_fire(&mut weapon, &pistol, 1.0), FireOutcome::Empty);
        assert!(weapon.reloading);
        assert_eq!(try_fire(&mut weapon, &pistol, 1.1), FireOutcome::Reloading);

        // Not yet: 1.0 + 1.5 = 2.5
        assert!(!advance_reload(&mut weapon, &pistol, 2.4));
        assert!(advance_reload(&mut weapon, &pistol, 2.5));
        assert_eq!(weapon.ammo, 12);
        assert!(!weapon.reloading);
    }

    #[test]
    fn test_reload_ignored_when_full() {
        let rifle = WeaponDescriptor::rifle();
        let mut weapon = WeaponState::loaded(rifle.magazine_size);
        assert!(!start_reload(&mut weapon, &rifle, 0.0));
        weapon.ammo = 3;
        assert!(start_reload(&mut weapon, &rifle, 0.0));
        assert!(!start_reload(&mut weapon, &rifle, 0.5));
    }

    #[test]
    fn test_pellets_are_deterministic_and_within_cone() {
        let shotgun = WeaponDescriptor::shotgun();
        let aim = Vec3::new(0.0, 0.0, -1.0);

        let a = pellet_directions(aim, &shotgun, shot_seed(7, 42));
        let b = pellet_directions(aim, &shotgun, shot_seed(7, 42));
        let c = pellet_directions(aim, &shotgun, shot_seed(7, 43));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);

        let min_cos = shotgun.spread_degrees.to_radians().cos() - 1e-4;
        for pellet in &a {
            assert!(pellet.dot(aim) >= min_cos);
        }
    }

    #[test]
    fn test_single_pellet_follows_aim() {
        let rifle = WeaponDescriptor::rifle();
        let aim = Vec3::new(0.0, 0.0, -2.0);
        let pellets = pellet_directions(aim, &rifle, 1);
        assert_eq!(pellets, vec![Vec3::new(0.0, 0.0, -1.0)]);
    }

    #[test]
    fn test_descriptor_validation() {
        assert!(WeaponDescriptor::shotgun().validate().is_ok());
        let broken = WeaponDescriptor { fire_rate: 0.0, ..WeaponDescriptor::rifle() };
        assert!(broken.validate().is_err());
    }
}
