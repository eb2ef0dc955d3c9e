//! Server-side player entities.

use tracer_shared::{Vec3, ViewAngles, EYE_HEIGHT, MAX_HEALTH, MAX_WEAPON_SLOTS};

use crate::anti_cheat::ViolationLedger;
use crate::simulation::weapons::{WeaponDescriptor, WeaponState};
use crate::PlayerId;

/// Simulated state of one player. This is everything a snapshot captures
/// and everything the predictor mirrors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerState {
    /// Feet position.
    pub position: Vec3,
    /// Velocity in units per second.
    pub velocity: Vec3,
    /// Aim orientation.
    pub view_angles: ViewAngles,
    /// Remaining health.
    pub health: f32,
    /// Dead players ignore input until respawn.
    pub is_dead: bool,
    /// Standing on something.
    pub is_grounded: bool,
    /// Crouch held.
    pub is_crouching: bool,
    /// Selected weapon slot.
    pub current_weapon: u8,
    /// Occupied weapon slots.
    pub weapon_count: u8,
    /// Per-slot weapon state; slots past `weapon_count` are unused.
    pub weapons: [WeaponState; MAX_WEAPON_SLOTS],
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::spawned(Vec3::ZERO, &WeaponDescriptor::default_loadout())
    }
}

impl PlayerState {
    /// Fresh state at `position` with full health and loaded weapons.
    #[must_use]
    pub fn spawned(position: Vec3, loadout: &[WeaponDescriptor]) -> Self {
        let mut weapons = [WeaponState::default(); MAX_WEAPON_SLOTS];
        for (slot, descriptor) in weapons.iter_mut().zip(loadout) {
            *slot = WeaponState::loaded(descriptor.magazine_size);
        }
        Self {
            position,
            velocity: Vec3::ZERO,
            view_angles: ViewAngles::default(),
            health: MAX_HEALTH,
            is_dead: false,
            is_grounded: true,
            is_crouching: false,
            current_weapon: 0,
            weapon_count: loadout.len().min(MAX_WEAPON_SLOTS) as u8,
            weapons,
        }
    }

    /// Where shots originate.
    #[inline]
    #[must_use]
    pub fn eye_position(&self) -> Vec3 {
        self.position + Vec3::Y * EYE_HEIGHT
    }

    /// Selected weapon's state.
    #[inline]
    #[must_use]
    pub fn current_weapon(&self) -> &WeaponState {
        &self.weapons[usize::from(self.current_weapon).min(MAX_WEAPON_SLOTS - 1)]
    }

    /// Applies damage; returns true if this killed the player.
    pub fn apply_damage(&mut self, amount: f32) -> bool {
        if self.is_dead {
            return false;
        }
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            self.is_dead = true;
            self.velocity = Vec3::ZERO;
            return true;
        }
        false
    }
}

/// A connected player as the server sees it.
#[derive(Clone, Debug)]
pub struct NetworkPlayer {
    /// Unique while connected.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Live simulated state.
    pub state: PlayerState,
    /// Round-trip latency measured by the transport.
    pub latency_ms: f64,
    /// Sequence of the last command applied.
    pub last_sequence: u32,
    /// Client tick of the last command applied.
    pub last_client_tick: u32,
    /// Violation counts.
    pub violations: ViolationLedger,
    /// Position at the end of the last displacement check.
    pub last_validated_position: Vec3,
    /// Server time of the last displacement check.
    pub last_validated_at: f64,
    /// Weapon clock of the last applied command, never ahead of server time.
    pub command_clock: f64,
    /// Server time the last command was applied.
    pub last_command_at: f64,
    /// Server time at which a dead player comes back.
    pub respawn_at: Option<f64>,
    /// No commands for longer than the stale timeout.
    pub stale: bool,
}

impl NetworkPlayer {
    /// Creates a player spawned at `position`.
    #[must_use]
    pub fn new(id: PlayerId, name: impl Into<String>, state: PlayerState, now: f64) -> Self {
        Self {
            id,
            name: name.into(),
            last_validated_position: state.position,
            last_validated_at: now,
            command_clock: now,
            state,
            latency_ms: 0.0,
            last_sequence: 0,
            last_client_tick: 0,
            violations: ViolationLedger::default(),
            last_command_at: now,
            respawn_at: None,
            stale: false,
        }
    }
}
