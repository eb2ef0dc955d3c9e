//! # Snapshot System
//!
//! Immutable per-tick captures of the world, kept in a bounded history.
//!
//! The server writes exactly one [`WorldSnapshot`] per tick after all
//! commands are applied. The same history serves two readers: the lag
//! compensator rewinds targets to it, and clients reconcile against the
//! broadcast copy.
//!
//! ```text
//! Ticks:     [t-63] ... [t-7] ... [t-1] [t]
//!                         ^                ^
//!            rewind target (100ms)     latest
//! Slot:      tick % capacity
//! ```

mod ring;

use std::collections::BTreeMap;

use tracer_shared::{Vec3, ViewAngles, MAX_WEAPON_SLOTS};

use crate::server::player::PlayerState;
use crate::simulation::weapons::WeaponState;
use crate::PlayerId;

pub use ring::TickRing;

/// One player's state at one tick. Never mutated after capture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerSnapshot {
    /// Tick the state belongs to.
    pub tick: u32,
    /// Feet position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Aim orientation.
    pub view_angles: ViewAngles,
    /// Health.
    pub health: f32,
    /// Dead flag.
    pub is_dead: bool,
    /// Grounded flag.
    pub is_grounded: bool,
    /// Crouch flag.
    pub is_crouching: bool,
    /// Selected weapon slot.
    pub current_weapon_index: u8,
    /// Occupied weapon slots.
    pub weapon_count: u8,
    /// Ammo and reload state per slot.
    pub weapons: [WeaponState; MAX_WEAPON_SLOTS],
    /// Sequence of the last command the server applied for this player.
    pub last_sequence: u32,
    /// Client tick of that command; the predictor reconciles against it.
    pub last_client_tick: u32,
}

impl PlayerSnapshot {
    /// Captures `state` at `tick`.
    #[must_use]
    pub fn capture(tick: u32, state: &PlayerState, last_sequence: u32, last_client_tick: u32) -> Self {
        Self {
            tick,
            position: state.position,
            velocity: state.velocity,
            view_angles: state.view_angles,
            health: state.health,
            is_dead: state.is_dead,
            is_grounded: state.is_grounded,
            is_crouching: state.is_crouching,
            current_weapon_index: state.current_weapon,
            weapon_count: state.weapon_count,
            weapons: state.weapons,
            last_sequence,
            last_client_tick,
        }
    }

    /// Rebuilds the simulated state this snapshot was captured from.
    #[must_use]
    pub fn to_state(&self) -> PlayerState {
        PlayerState {
            position: self.position,
            velocity: self.velocity,
            view_angles: self.view_angles,
            health: self.health,
            is_dead: self.is_dead,
            is_grounded: self.is_grounded,
            is_crouching: self.is_crouching,
            current_weapon: self.current_weapon_index,
            weapon_count: self.weapon_count,
            weapons: self.weapons,
        }
    }
}

/// The whole world at one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorldSnapshot {
    /// Tick number.
    pub tick: u32,
    /// `tick * interval`, in seconds.
    pub server_time: f64,
    /// Every live player, ordered by id.
    pub players: BTreeMap<PlayerId, PlayerSnapshot>,
}

impl WorldSnapshot {
    /// Empty snapshot.
    #[must_use]
    pub fn new(tick: u32, server_time: f64) -> Self {
        Self {
            tick,
            server_time,
            players: BTreeMap::new(),
        }
    }

    /// One player's entry.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSnapshot> {
        self.players.get(&id)
    }

    /// Number of players captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Returns true if no players were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Folds in players from another part of the same tick.
    ///
    /// Used by clients reassembling a snapshot split over several packets.
    /// Parts from a different tick are ignored; returns whether `other`
    /// was merged.
    pub fn merge(&mut self, other: Self) -> bool {
        if other.tick != self.tick {
            return false;
        }
        self.players.extend(other.players);
        true
    }
}

/// Bounded history of world snapshots.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    ring: TickRing<WorldSnapshot>,
    tick_interval_secs: f64,
}

impl SnapshotStore {
    /// Creates a store holding `capacity` ticks.
    #[must_use]
    pub fn new(capacity: usize, tick_interval_secs: f64) -> Self {
        Self {
            ring: TickRing::new(capacity),
            tick_interval_secs,
        }
    }

    /// Stores a snapshot, evicting the oldest beyond capacity.
    ///
    /// Returns false if the snapshot is older than the retained window.
    pub fn push(&mut self, snapshot: WorldSnapshot) -> bool {
        self.ring.insert(snapshot.tick, snapshot)
    }

    /// Snapshot for exactly `tick`.
    #[must_use]
    pub fn get(&self, tick: u32) -> Option<&WorldSnapshot> {
        self.ring.get(tick)
    }

    /// Snapshot closest in time to `tick`, within half a tick interval.
    #[must_use]
    pub fn nearest(&self, tick: u32) -> Option<&WorldSnapshot> {
        if let Some(exact) = self.ring.get(tick) {
            return Some(exact);
        }
        let target = f64::from(tick) * self.tick_interval_secs;
        let tolerance = self.tick_interval_secs * 0.5;
        self.ring
            .iter()
            .map(|(_, snapshot)| (snapshot, (snapshot.server_time - target).abs()))
            .filter(|(_, gap)| *gap <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(snapshot, _)| snapshot)
    }

    /// Most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<&WorldSnapshot> {
        self.ring.latest()
    }

    /// Oldest retained tick.
    #[must_use]
    pub fn oldest_tick(&self) -> Option<u32> {
        self.ring.oldest_tick()
    }

    /// Snapshots in ascending tick order.
    pub fn iter(&self) -> impl Iterator<Item = &WorldSnapshot> + '_ {
        self.ring.iter().map(|(_, snapshot)| snapshot)
    }

    /// Number of snapshots held.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Maximum snapshots held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}
