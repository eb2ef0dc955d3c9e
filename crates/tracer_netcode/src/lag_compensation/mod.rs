//! # Lag Compensation
//!
//! Resolves a shot against the world as the shooter saw it.
//!
//! ## Rewind
//!
//! ```text
//! current tick:      t
//! shooter latency:   100ms + interpolation delay
//! rewind:            ceil((latency + interp) / interval) ticks, clamped
//!
//!  t-7        t-6  ...  t
//!   │ targets moved here │
//!   └── hit-test here ───┘  then restore, then apply damage to live state
//! ```
//!
//! Targets are moved to their historical positions inside a
//! [`RewindGuard`]. The guard puts them back when it drops, so every exit
//! path (hit, miss, early return) restores live state.

pub mod hitbox;

use std::collections::BTreeMap;

use serde::Deserialize;
use tracer_shared::Vec3;
use tracing::{debug, trace};

use crate::config::{invalid, NetcodeConfig};
use crate::error::ConfigResult;
use crate::integration::CollisionWorld;
use crate::server::player::NetworkPlayer;
use crate::snapshot::{SnapshotStore, WorldSnapshot};
use crate::PlayerId;

use hitbox::Capsule;

/// Lag compensation tuning.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LagCompensationConfig {
    /// When false every shot is an immediate hit-test.
    pub enabled: bool,
    /// Client interpolation delay in milliseconds. Unset means half a tick.
    pub interpolation_delay_ms: Option<f64>,
    /// Shooters with more latency than this are not rewound at all.
    pub max_latency_ms: f64,
}

impl Default for LagCompensationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interpolation_delay_ms: None,
            max_latency_ms: 1000.0,
        }
    }
}

impl LagCompensationConfig {
    /// Checks every value is usable.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(delay) = self.interpolation_delay_ms {
            if !(delay.is_finite() && delay >= 0.0) {
                return Err(invalid("lag_compensation.interpolation_delay_ms", "must not be negative"));
            }
        }
        if !(self.max_latency_ms.is_finite() && self.max_latency_ms > 0.0) {
            return Err(invalid("lag_compensation.max_latency_ms", "must be positive"));
        }
        Ok(())
    }
}

/// A fired weapon waiting to be resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ShotRequest {
    /// Who fired.
    pub shooter: PlayerId,
    /// Eye position at the time of firing (current, not rewound).
    pub origin: Vec3,
    /// One unit direction per pellet.
    pub directions: Vec<Vec3>,
    /// Weapon range.
    pub range: f32,
    /// Damage per pellet.
    pub damage: f32,
    /// Shooter's observed latency.
    pub latency_ms: f64,
}

/// One pellet that found a player.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PelletHit {
    /// Player hit.
    pub target: PlayerId,
    /// Impact point.
    pub point: Vec3,
    /// Distance from the origin.
    pub distance: f32,
    /// Damage this pellet carries.
    pub damage: f32,
}

/// Outcome of resolving a shot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShotResolution {
    /// Tick the targets were rewound to, `None` for an immediate hit-test.
    pub rewound_to: Option<u32>,
    /// Pellet hits in pellet order.
    pub hits: Vec<PelletHit>,
}

/// Holds targets at their historical positions; restores them on drop.
pub struct RewindGuard<'a> {
    players: &'a mut BTreeMap<PlayerId, NetworkPlayer>,
    saved: Vec<(PlayerId, Vec3, bool)>,
    shooter: PlayerId,
}

impl<'a> RewindGuard<'a> {
    /// Moves every player except `shooter` to where `snapshot` recorded them.
    ///
    /// Players missing from the snapshot did not exist at that tick and are
    /// treated as dead for the duration of the rewind.
    pub fn rewind(players: &'a mut BTreeMap<PlayerId, NetworkPlayer>, snapshot: &WorldSnapshot, shooter: PlayerId) -> Self {
        let mut saved = Vec::with_capacity(players.len());
        for (&id, player) in players.iter_mut() {
            if id == shooter {
                continue;
            }
            saved.push((id, player.state.position, player.state.is_dead));
            match snapshot.player(id) {
                Some(historical) => {
                    player.state.position = historical.position;
                    player.state.is_dead = historical.is_dead;
                }
                None => player.state.is_dead = true,
            }
        }
        Self { players, saved, shooter }
    }

    /// Hittable targets at the rewound tick.
    #[must_use]
    pub fn targets(&self) -> Vec<(PlayerId, Vec3)> {
        live_targets(&*self.players, self.shooter)
    }

    /// Read access to the rewound table.
    #[must_use]
    pub fn players(&self) -> &BTreeMap<PlayerId, NetworkPlayer> {
        &*self.players
    }
}

impl Drop for RewindGuard<'_> {
    fn drop(&mut self) {
        for (id, position, is_dead) in self.saved.drain(..) {
            if let Some(player) = self.players.get_mut(&id) {
                player.state.position = position;
                player.state.is_dead = is_dead;
            }
        }
    }
}

/// Rewinds targets for fired shots and hit-tests them.
#[derive(Clone, Debug)]
pub struct LagCompensator {
    config: LagCompensationConfig,
    tick_interval_ms: f64,
    max_rollback_ticks: u32,
}

impl LagCompensator {
    /// Creates a compensator.
    #[must_use]
    pub fn new(config: LagCompensationConfig, tick_interval_ms: f64, max_rollback_ticks: u32) -> Self {
        Self {
            config,
            tick_interval_ms,
            max_rollback_ticks,
        }
    }

    /// Creates a compensator from the top-level config.
    #[must_use]
    pub fn from_config(config: &NetcodeConfig) -> Self {
        Self::new(
            config.lag_compensation.clone(),
            config.tick_interval_ms(),
            config.max_rollback_ticks(),
        )
    }

    /// Interpolation delay in effect.
    #[must_use]
    pub fn interpolation_delay_ms(&self) -> f64 {
        self.config
            .interpolation_delay_ms
            .unwrap_or(self.tick_interval_ms * 0.5)
    }

    /// Tick the world is rewound to for a shooter with `latency_ms`.
    ///
    /// Never earlier than `current_tick - max_rollback_ticks`, never later
    /// than `current_tick`.
    #[must_use]
    pub fn compensated_tick(&self, current_tick: u32, latency_ms: f64) -> u32 {
        let total = (latency_ms.max(0.0) + self.interpolation_delay_ms()) / self.tick_interval_ms;
        let ticks_back = (total.ceil() as u32).min(self.max_rollback_ticks);
        current_tick.saturating_sub(ticks_back)
    }

    /// Resolves a shot, rewinding targets when possible.
    ///
    /// Falls back to an immediate hit-test when compensation is disabled,
    /// the shooter's latency exceeds the window, or no snapshot exists near
    /// the compensated tick. Live state is unchanged on return.
    pub fn resolve(
        &self,
        shot: &ShotRequest,
        current_tick: u32,
        players: &mut BTreeMap<PlayerId, NetworkPlayer>,
        store: &SnapshotStore,
        world: &dyn CollisionWorld,
    ) -> ShotResolution {
        if !self.config.enabled || shot.latency_ms > self.config.max_latency_ms {
            return self.resolve_immediate(shot, players, world);
        }

        let tick = self.compensated_tick(current_tick, shot.latency_ms);
        let Some(snapshot) = store.nearest(tick) else {
            debug!(shooter = shot.shooter, tick, "no snapshot to rewind to, hit-testing live state");
            return self.resolve_immediate(shot, players, world);
        };

        let guard = RewindGuard::rewind(players, snapshot, shot.shooter);
        let hits = trace_pellets(shot, &guard.targets(), world);
        drop(guard);

        trace!(shooter = shot.shooter, rewound_to = snapshot.tick, hits = hits.len(), "shot resolved");
        ShotResolution {
            rewound_to: Some(snapshot.tick),
            hits,
        }
    }

    /// Hit-test against live positions.
    #[must_use]
    pub fn resolve_immediate(
        &self,
        shot: &ShotRequest,
        players: &BTreeMap<PlayerId, NetworkPlayer>,
        world: &dyn CollisionWorld,
    ) -> ShotResolution {
        ShotResolution {
            rewound_to: None,
            hits: trace_pellets(shot, &live_targets(players, shot.shooter), world),
        }
    }
}

fn live_targets(players: &BTreeMap<PlayerId, NetworkPlayer>, shooter: PlayerId) -> Vec<(PlayerId, Vec3)> {
    players
        .iter()
        .filter(|(&id, player)| id != shooter && !player.state.is_dead)
        .map(|(&id, player)| (id, player.state.position))
        .collect()
}

/// Closest player per pellet, stopped by world geometry. Ties go to the
/// lower id.
fn trace_pellets(shot: &ShotRequest, targets: &[(PlayerId, Vec3)], world: &dyn CollisionWorld) -> Vec<PelletHit> {
    let mut hits = Vec::new();
    for &direction in &shot.directions {
        let limit = world
            .raycast(shot.origin, direction, shot.range)
            .map_or(shot.range, |(_, point)| point.distance(shot.origin));

        let mut best: Option<(PlayerId, f32)> = None;
        for &(id, position) in targets {
            if let Some(t) = Capsule::player(position).ray_entry(shot.origin, direction, limit) {
                if best.map_or(true, |(_, b)| t < b) {
                    best = Some((id, t));
                }
            }
        }

        if let Some((target, distance)) = best {
            hits.push(PelletHit {
                target,
                point: shot.origin + direction * distance,
                distance,
                damage: shot.damage,
            });
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::{Aabb, FlatArena};
    use crate::server::player::PlayerState;
    use crate::snapshot::PlayerSnapshot;

    const DT_MS: f64 = 1000.0 / 64.0;

    fn compensator() -> LagCompensator {
        LagCompensator::new(LagCompensationConfig::default(), DT_MS, 64)
    }

    fn player_at(id: PlayerId, position: Vec3) -> NetworkPlayer {
        let state = PlayerState {
            position,
            ..PlayerState::default()
        };
        NetworkPlayer::new(id, format!("p{id}"), state, 0.0)
    }

    fn shot(latency_ms: f64) -> ShotRequest {
        ShotRequest {
            shooter: 1,
            origin: Vec3::new(0.0, 1.6, 0.0),
            directions: vec![Vec3::new(0.0, 0.0, -1.0)],
            range: 100.0,
            damage: 25.0,
            latency_ms,
        }
    }

    fn history_with_target_at(tick: u32, position: Vec3) -> SnapshotStore {
        let mut store = SnapshotStore::new(64, DT_MS / 1000.0);
        let mut snapshot = WorldSnapshot::new(tick, f64::from(tick) * DT_MS / 1000.0);
        let state = PlayerState {
            position,
            ..PlayerState::default()
        };
        snapshot.players.insert(2, PlayerSnapshot::capture(tick, &state, 0, 0));
        store.push(snapshot);
        store
    }

    #[test]
    fn test_compensated_tick_at_64hz_100ms() {
        let lc = compensator();
        assert!((lc.interpolation_delay_ms() - 7.8125).abs() < 1e-9);
        assert_eq!(lc.compensated_tick(100, 100.0), 93);
    }

    #[test]
    fn test_compensated_tick_is_clamped() {
        let lc = compensator();
        assert_eq!(lc.compensated_tick(100, 5000.0), 36);
        assert_eq!(lc.compensated_tick(3, 100.0), 0);
        assert_eq!(lc.compensated_tick(100, 0.0), 99);
    }

    #[test]
    fn test_rewound_hit_restores_live_positions() {
        let lc = compensator();
        let mut players = BTreeMap::new();
        players.insert(1, player_at(1, Vec3::ZERO));
        // Target has since moved out of the line of fire
        players.insert(2, player_at(2, Vec3::new(5.0, 0.0, -10.0)));

        let store = history_with_target_at(93, Vec3::new(0.0, 0.0, -10.0));
        let result = lc.resolve(&shot(100.0), 100, &mut players, &store, &FlatArena::new(0.0));

        assert_eq!(result.rewound_to, Some(93));
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].target, 2);
        assert_eq!(players[&2].state.position, Vec3::new(5.0, 0.0, -10.0));
    }

    #[test]
    fn test_missing_history_falls_back_to_live() {
        let lc = compensator();
        let mut players = BTreeMap::new();
        players.insert(1, player_at(1, Vec3::ZERO));
        players.insert(2, player_at(2, Vec3::new(0.0, 0.0, -10.0)));

        let empty = SnapshotStore::new(64, DT_MS / 1000.0);
        let result = lc.resolve(&shot(100.0), 100, &mut players, &empty, &FlatArena::new(0.0));
        assert_eq!(result.rewound_to, None);
        assert_eq!(result.hits.len(), 1);
    }

    #[test]
    fn test_disabled_or_excessive_latency_is_immediate() {
        let mut players = BTreeMap::new();
        players.insert(1, player_at(1, Vec3::ZERO));
        players.insert(2, player_at(2, Vec3::new(5.0, 0.0, -10.0)));
        let store = history_with_target_at(93, Vec3::new(0.0, 0.0, -10.0));
        let arena = FlatArena::new(0.0);

        let result = compensator().resolve(&shot(1500.0), 100, &mut players, &store, &arena);
        assert_eq!(result, ShotResolution::default());

        let disabled = LagCompensator::new(
            LagCompensationConfig { enabled: false, ..LagCompensationConfig::default() },
            DT_MS,
            64,
        );
        let result = disabled.resolve(&shot(100.0), 100, &mut players, &store, &arena);
        assert_eq!(result, ShotResolution::default());
    }

    #[test]
    fn test_wall_blocks_shot() {
        let arena = FlatArena::new(0.0).with_wall(Aabb::new(Vec3::new(-2.0, 0.0, -6.0), Vec3::new(2.0, 3.0, -5.0)));
        let mut players = BTreeMap::new();
        players.insert(1, player_at(1, Vec3::ZERO));
        players.insert(2, player_at(2, Vec3::new(0.0, 0.0, -10.0)));
        let result = compensator().resolve_immediate(&shot(0.0), &players, &arena);
        assert!(result.hits.is_empty());
    }

    #[test]
    fn test_nearest_target_wins() {
        let mut players = BTreeMap::new();
        players.insert(1, player_at(1, Vec3::ZERO));
        players.insert(2, player_at(2, Vec3::new(0.0, 0.0, -20.0)));
        players.insert(3, player_at(3, Vec3::new(0.0, 0.0, -8.0)));
        let result = compensator().resolve_immediate(&shot(0.0), &players, &FlatArena::new(0.0));
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].target, 3);
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let mut players = BTreeMap::new();
        players.insert(1, player_at(1, Vec3::ZERO));
        players.insert(2, player_at(2, Vec3::new(1.0, 0.0, 1.0)));
        players.insert(4, player_at(4, Vec3::new(2.0, 0.0, 2.0)));

        let mut snapshot = WorldSnapshot::new(5, 0.0);
        let old = PlayerState {
            position: Vec3::new(-3.0, 0.0, 0.0),
            ..PlayerState::default()
        };
        snapshot.players.insert(2, PlayerSnapshot::capture(5, &old, 0, 0));

        {
            let guard = RewindGuard::rewind(&mut players, &snapshot, 1);
            assert_eq!(guard.players()[&2].state.position, Vec3::new(-3.0, 0.0, 0.0));
            // Player 4 did not exist at tick 5
            assert!(guard.players()[&4].state.is_dead);
            assert_eq!(guard.targets(), vec![(2, Vec3::new(-3.0, 0.0, 0.0))]);
        }

        assert_eq!(players[&2].state.position, Vec3::new(1.0, 0.0, 1.0));
        assert!(!players[&4].state.is_dead);
    }
}
