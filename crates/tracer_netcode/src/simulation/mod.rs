//! # Authoritative Simulation
//!
//! Owns the player table and the snapshot history. Once per tick:
//!
//! ```text
//! 1. charge admission rejections to violation ledgers
//! 2. for each player (ascending id):
//!      drain up to N commands -> step_player each -> resolve shots
//!      displacement check over the server time since the last check
//! 3. respawn dead players whose timer ran out
//! 4. remove players over the violation threshold
//! 5. capture one WorldSnapshot
//! ```
//!
//! Players are kept in a `BTreeMap` so iteration order, and therefore the
//! resulting snapshots, depend only on the commands applied.

pub mod movement;
pub mod weapons;

use std::collections::BTreeMap;

use crossbeam_channel::Receiver;
use tracer_shared::Vec3;
use tracing::{debug, info, trace, warn};

use crate::anti_cheat::{AntiCheat, ViolationKind};
use crate::command::Command;
use crate::config::NetcodeConfig;
use crate::error::{NetcodeError, NetcodeResult};
use crate::integration::{CollisionWorld, DisconnectReason, EventQueue, SimEvent};
use crate::lag_compensation::{LagCompensator, ShotRequest, ShotResolution};
use crate::server::commands::CommandBuffer;
use crate::server::player::{NetworkPlayer, PlayerState};
use crate::server::tick::TickEvent;
use crate::snapshot::{PlayerSnapshot, SnapshotStore, WorldSnapshot};
use crate::PlayerId;

use self::movement::MovementConfig;
use self::weapons::{FireOutcome, WeaponDescriptor};

/// A round that left the barrel during [`step_player`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FiredShot {
    /// Eye position after the step's movement.
    pub origin: Vec3,
    /// Aim direction.
    pub aim: Vec3,
    /// Weapon slot that fired.
    pub slot: usize,
}

/// Applies one command to one player: weapon switch, movement, reload, fire.
///
/// Shared by the server and the client predictor. Dead players ignore
/// input. `now` drives weapon timers.
pub fn step_player(
    state: &mut PlayerState,
    command: &Command,
    now: f64,
    movement: &MovementConfig,
    loadout: &[WeaponDescriptor],
    world: &dyn CollisionWorld,
) -> Option<FiredShot> {
    if state.is_dead {
        return None;
    }

    if let Some(slot) = command.weapon_slot {
        if slot < state.weapon_count && slot != state.current_weapon {
            weapons::cancel_reload(&mut state.weapons[usize::from(state.current_weapon)]);
            state.current_weapon = slot;
        }
    }

    movement::integrate(state, command, movement, world);

    let slot = usize::from(state.current_weapon);
    let descriptor = loadout.get(slot)?;
    let weapon = &mut state.weapons[slot];
    weapons::advance_reload(weapon, descriptor, now);
    if command.wants_reload() {
        weapons::start_reload(weapon, descriptor, now);
    }
    let fired = command.is_firing() && weapons::try_fire(weapon, descriptor, now) == FireOutcome::Fired;

    fired.then(|| FiredShot {
        origin: state.eye_position(),
        aim: state.view_angles.forward(),
        slot,
    })
}

/// Server-side world state and per-tick processing.
pub struct Simulation {
    config: NetcodeConfig,
    players: BTreeMap<PlayerId, NetworkPlayer>,
    store: SnapshotStore,
    compensator: LagCompensator,
    anti_cheat: AntiCheat,
    events: EventQueue,
    next_spawn: usize,
    tick: u32,
    server_time: f64,
}

impl Simulation {
    /// Creates an empty world.
    #[must_use]
    pub fn new(config: NetcodeConfig) -> Self {
        Self {
            store: SnapshotStore::new(config.snapshot_capacity, config.tick_interval_secs()),
            compensator: LagCompensator::from_config(&config),
            anti_cheat: AntiCheat::new(config.anti_cheat.clone(), config.tick_interval_secs()),
            players: BTreeMap::new(),
            events: EventQueue::new(),
            next_spawn: 0,
            tick: 0,
            server_time: 0.0,
            config,
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Adds a player at the next spawn point.
    ///
    /// # Errors
    ///
    /// Fails if the id is live or the server is full.
    pub fn connect(&mut self, id: PlayerId, name: impl Into<String>) -> NetcodeResult<()> {
        if self.players.contains_key(&id) {
            return Err(NetcodeError::DuplicatePlayer(id));
        }
        if self.players.len() >= self.config.max_players {
            return Err(NetcodeError::ServerFull {
                capacity: self.config.max_players,
            });
        }

        let name = name.into();
        let spawn = self.next_spawn_point();
        let state = PlayerState::spawned(spawn, &self.config.weapons);
        self.players
            .insert(id, NetworkPlayer::new(id, name.clone(), state, self.server_time));

        info!(player = id, %name, "player connected");
        self.events.push(SimEvent::PlayerConnected { player: id, name });
        Ok(())
    }

    /// Removes a player.
    ///
    /// # Errors
    ///
    /// Fails if no such player is live.
    pub fn disconnect(&mut self, id: PlayerId) -> NetcodeResult<()> {
        self.players.remove(&id).ok_or(NetcodeError::UnknownPlayer(id))?;
        info!(player = id, "player disconnected");
        self.events.push(SimEvent::PlayerDisconnected {
            player: id,
            reason: DisconnectReason::Left,
        });
        Ok(())
    }

    /// Updates a player's measured latency.
    ///
    /// # Errors
    ///
    /// Fails if no such player is live.
    pub fn set_latency(&mut self, id: PlayerId, latency_ms: f64) -> NetcodeResult<()> {
        let player = self.players.get_mut(&id).ok_or(NetcodeError::UnknownPlayer(id))?;
        player.latency_ms = latency_ms.max(0.0);
        Ok(())
    }

    fn next_spawn_point(&mut self) -> Vec3 {
        let points = &self.config.spawn_points;
        let point = points.get(self.next_spawn % points.len().max(1)).copied().unwrap_or(Vec3::ZERO);
        self.next_spawn = self.next_spawn.wrapping_add(1);
        point
    }

    // ========================================================================
    // TICK
    // ========================================================================

    /// Runs one tick and writes its snapshot.
    pub fn run_tick(&mut self, event: TickEvent, commands: &CommandBuffer, world: &dyn CollisionWorld) {
        self.tick = event.tick;
        self.server_time = event.server_time;

        for (id, reason) in commands.take_rejections() {
            self.record_violation(id, reason.kind());
        }

        let ids: Vec<PlayerId> = self.players.keys().copied().collect();
        for id in ids {
            let batch = commands.drain_capped(id, self.config.max_commands_per_tick);
            self.apply_batch(id, &batch, world);
        }

        self.process_respawns();
        self.process_kicks(commands);

        let snapshot = self.capture();
        trace!(tick = snapshot.tick, players = snapshot.len(), "snapshot written");
        self.store.push(snapshot);
    }

    fn apply_batch(&mut self, id: PlayerId, batch: &[Command], world: &dyn CollisionWorld) {
        let now = self.server_time;
        let mut shots = Vec::new();
        let latency_ms;
        let plausible;
        {
            let Some(player) = self.players.get_mut(&id) else {
                return;
            };

            if batch.is_empty() {
                if !player.stale && now - player.last_command_at > self.config.stale_timeout_secs {
                    player.stale = true;
                    debug!(player = id, "player went stale");
                }
                return;
            }
            player.stale = false;
            player.last_command_at = now;

            let interval = self.config.tick_interval_secs();
            let window = interval * self.config.max_commands_per_tick as f64;
            let mut claimed = 0.0_f64;
            for command in batch {
                let gap = command.client_tick.saturating_sub(player.last_client_tick);
                let at = (player.command_clock.max(now - window) + f64::from(gap) * interval).min(now);
                player.command_clock = at;

                if let Some(shot) = step_player(
                    &mut player.state,
                    command,
                    at,
                    &self.config.movement,
                    &self.config.weapons,
                    world,
                ) {
                    shots.push((command.sequence_number, shot));
                }
                player.last_sequence = command.sequence_number;
                player.last_client_tick = command.client_tick;
                claimed += f64::from(command.delta_time);
            }

            // Client step lengths count only up to the server time that passed
            let elapsed = claimed.min(now - player.last_validated_at).max(0.0);
            plausible = self.anti_cheat.displacement_plausible(
                player.last_validated_position,
                player.state.position,
                elapsed as f32,
                self.config.movement.speed_budget(),
            );
            player.last_validated_position = player.state.position;
            player.last_validated_at = now;
            latency_ms = player.latency_ms;
        }

        if !plausible {
            self.record_violation(id, ViolationKind::Speed);
        }

        for (sequence, shot) in shots {
            let Some(descriptor) = self.config.weapons.get(shot.slot) else {
                continue;
            };
            let request = ShotRequest {
                shooter: id,
                origin: shot.origin,
                directions: weapons::pellet_directions(shot.aim, descriptor, weapons::shot_seed(id, sequence)),
                range: descriptor.range,
                damage: descriptor.damage,
                latency_ms,
            };
            let resolution =
                self.compensator
                    .resolve(&request, self.tick, &mut self.players, &self.store, world);
            self.apply_hits(id, &resolution);
        }
    }

    /// Applies damage from a resolved shot to live state.
    fn apply_hits(&mut self, shooter: PlayerId, resolution: &ShotResolution) {
        for hit in &resolution.hits {
            let Some(target) = self.players.get_mut(&hit.target) else {
                continue;
            };
            // Already dead in the present, even if alive in the past
            if target.state.is_dead {
                continue;
            }
            let killed = target.state.apply_damage(hit.damage);
            if killed {
                target.respawn_at = Some(self.server_time + self.config.respawn_delay_secs);
            }

            self.events.push(SimEvent::PlayerHit {
                tick: self.tick,
                shooter,
                target: hit.target,
                damage: hit.damage,
                point: hit.point,
                rewound_to: resolution.rewound_to,
            });
            if killed {
                info!(killer = shooter, victim = hit.target, "player killed");
                self.events.push(SimEvent::PlayerKilled {
                    tick: self.tick,
                    killer: shooter,
                    victim: hit.target,
                });
            }
        }
    }

    fn record_violation(&mut self, id: PlayerId, kind: ViolationKind) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        let reached = self.anti_cheat.record(&mut player.violations, kind);
        let total = player.violations.total();
        debug!(player = id, ?kind, total, "violation recorded");
        if reached {
            warn!(player = id, total, "violation threshold reached");
        }
        self.events.push(SimEvent::ViolationRecorded { player: id, kind, total });
    }

    fn process_respawns(&mut self) {
        let now = self.server_time;
        let due: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.state.is_dead && p.respawn_at.is_some_and(|at| now >= at))
            .map(|p| p.id)
            .collect();

        for id in due {
            let spawn = self.next_spawn_point();
            if let Some(player) = self.players.get_mut(&id) {
                player.state = PlayerState::spawned(spawn, &self.config.weapons);
                player.respawn_at = None;
                player.last_validated_position = spawn;
                player.last_validated_at = now;
                self.events.push(SimEvent::PlayerRespawned { player: id, position: spawn });
            }
        }
    }

    fn process_kicks(&mut self, commands: &CommandBuffer) {
        let offenders: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| self.anti_cheat.over_threshold(&p.violations))
            .map(|p| p.id)
            .collect();

        for id in offenders {
            let Some(player) = self.players.remove(&id) else {
                continue;
            };
            let dropped = commands.unregister(id);
            let violations = player.violations.total();
            info!(player = id, violations, dropped, "player kicked");
            self.events.push(SimEvent::PlayerKicked { player: id, violations });
            self.events.push(SimEvent::PlayerDisconnected {
                player: id,
                reason: DisconnectReason::Kicked,
            });
        }
    }

    fn capture(&self) -> WorldSnapshot {
        let mut snapshot = WorldSnapshot::new(self.tick, self.server_time);
        for (&id, player) in &self.players {
            snapshot.players.insert(
                id,
                PlayerSnapshot::capture(self.tick, &player.state, player.last_sequence, player.last_client_tick),
            );
        }
        snapshot
    }

    // ========================================================================
    // ACCESS
    // ========================================================================

    /// Live player table.
    #[must_use]
    pub fn players(&self) -> &BTreeMap<PlayerId, NetworkPlayer> {
        &self.players
    }

    /// One live player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&NetworkPlayer> {
        self.players.get(&id)
    }

    /// Snapshot history.
    #[must_use]
    pub const fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Most recent snapshot.
    #[must_use]
    pub fn latest_snapshot(&self) -> Option<&WorldSnapshot> {
        self.store.latest()
    }

    /// Lag compensator in use.
    #[must_use]
    pub const fn compensator(&self) -> &LagCompensator {
        &self.compensator
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &NetcodeConfig {
        &self.config
    }

    /// Last tick processed.
    #[must_use]
    pub const fn current_tick(&self) -> u32 {
        self.tick
    }

    /// Takes every pending event.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.events.drain()
    }

    /// Subscribes to events from now on.
    pub fn subscribe(&mut self) -> Receiver<SimEvent> {
        self.events.subscribe()
    }
}
