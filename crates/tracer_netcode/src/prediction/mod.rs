//! # Client-Side Prediction
//!
//! Predict the local player with the same step function the server runs,
//! then reconcile against authoritative snapshots.
//!
//! ## How It Works
//!
//! 1. Sample input into a [`Command`] and apply it locally at once
//! 2. Store the predicted state under the local tick
//! 3. Hand the command to the transport
//! 4. When a snapshot acknowledges tick `k`, compare prediction `k` with it
//!
//! ```text
//! Local ticks:  [1] [2] [3] [4] [5] [6]
//! Predictions:  [P1][P2][P3][P4][P5][P6]
//!                        │
//! Server ack:           [S3]
//!                        │
//! |P3 - S3| <= tol  -> keep predicting, blend the small offset visually
//! |P3 - S3| >  tol  -> adopt S3, replay [4, 5, 6]
//! ```
//!
//! Remote players are never predicted; see [`smoothing::RemoteInterpolator`].

pub mod smoothing;

use std::collections::BTreeMap;

use serde::Deserialize;
use tracer_shared::{Vec2, Vec3, ViewAngles};
use tracing::{debug, trace};

use crate::command::{Buttons, Command};
use crate::config::{invalid, NetcodeConfig};
use crate::error::ConfigResult;
use crate::integration::CollisionWorld;
use crate::server::player::PlayerState;
use crate::simulation::movement::MovementConfig;
use crate::simulation::step_player;
use crate::simulation::weapons::WeaponDescriptor;
use crate::snapshot::{PlayerSnapshot, TickRing, WorldSnapshot};
use crate::PlayerId;

use smoothing::{BlendMode, CorrectionSmoother, RemoteInterpolator};

/// Client prediction tuning.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictionConfig {
    /// Position error, in metres, accepted without a replay.
    pub error_tolerance: f32,
    /// How long a correction takes to blend out visually.
    pub blend_time_ms: f32,
    /// Blend curve.
    pub blend_mode: BlendMode,
    /// Exponential approach rate for remote players, per second.
    pub remote_approach_rate: f32,
    /// Remote players this close to their target are snapped onto it.
    pub remote_snap_epsilon: f32,
    /// Remote players further than this from their target jump to it.
    pub remote_teleport_distance: f32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            error_tolerance: 0.1,
            blend_time_ms: 100.0,
            blend_mode: BlendMode::EaseOut,
            remote_approach_rate: 15.0,
            remote_snap_epsilon: 0.01,
            remote_teleport_distance: 5.0,
        }
    }
}

impl PredictionConfig {
    /// Checks every value is usable.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.error_tolerance.is_finite() && self.error_tolerance >= 0.0) {
            return Err(invalid("prediction.error_tolerance", "must not be negative"));
        }
        if !(self.blend_time_ms.is_finite() && self.blend_time_ms > 0.0) {
            return Err(invalid("prediction.blend_time_ms", "must be positive"));
        }
        if !(self.remote_approach_rate.is_finite() && self.remote_approach_rate > 0.0) {
            return Err(invalid("prediction.remote_approach_rate", "must be positive"));
        }
        if !(self.remote_snap_epsilon.is_finite() && self.remote_snap_epsilon >= 0.0) {
            return Err(invalid("prediction.remote_snap_epsilon", "must not be negative"));
        }
        if self.remote_teleport_distance <= self.remote_snap_epsilon {
            return Err(invalid(
                "prediction.remote_teleport_distance",
                "must exceed remote_snap_epsilon",
            ));
        }
        Ok(())
    }
}

/// Input sampled by the client for one local tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputSample {
    /// Strafe (x) and forward (y).
    pub movement: Vec2,
    /// Positive jumps, negative crouches.
    pub vertical_input: f32,
    /// Aim.
    pub view_angles: ViewAngles,
    /// Held buttons.
    pub buttons: Buttons,
    /// Requested weapon slot.
    pub weapon_slot: Option<u8>,
}

/// Predictor lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PredictorState {
    /// No local command issued yet.
    #[default]
    Idle,
    /// Running ahead of the server.
    Predicting,
    /// Replaying after a correction; only seen inside [`ClientPredictor::reconcile`].
    Reconciling,
}

/// What a reconciliation did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// Acknowledgement older than one already processed, or nothing acked yet.
    Ignored,
    /// Prediction within tolerance; the offset is blended out visually.
    Accepted {
        /// Distance between prediction and authority.
        error: f32,
    },
    /// Prediction was off; authority adopted and later frames replayed.
    Replayed {
        /// Distance between prediction and authority.
        error: f32,
        /// Frames replayed on top of the authoritative state.
        replayed: usize,
    },
}

#[derive(Clone, Copy, Debug)]
struct PredictedFrame {
    command: Command,
    /// State after `command` was applied.
    state: PlayerState,
}

/// Local-player predictor.
///
/// One per client, owned by the client frame loop. Never blocks.
pub struct ClientPredictor {
    player_id: PlayerId,
    state: PlayerState,
    phase: PredictorState,
    history: TickRing<PredictedFrame>,
    tick: u32,
    sequence: u32,
    last_ack: Option<u32>,
    tick_interval_secs: f64,
    movement: MovementConfig,
    loadout: Vec<WeaponDescriptor>,
    config: PredictionConfig,
    smoother: CorrectionSmoother,
    remotes: BTreeMap<PlayerId, RemoteInterpolator>,
}

impl ClientPredictor {
    /// Creates a predictor starting from `initial`.
    ///
    /// History holds one rollback window of frames.
    #[must_use]
    pub fn new(player_id: PlayerId, initial: PlayerState, config: &NetcodeConfig) -> Self {
        Self {
            player_id,
            state: initial,
            phase: PredictorState::Idle,
            history: TickRing::new(config.snapshot_capacity),
            tick: 0,
            sequence: 0,
            last_ack: None,
            tick_interval_secs: config.tick_interval_secs(),
            movement: config.movement.clone(),
            loadout: config.weapons.clone(),
            smoother: CorrectionSmoother::new(config.prediction.blend_time_ms, config.prediction.blend_mode),
            config: config.prediction.clone(),
            remotes: BTreeMap::new(),
        }
    }

    fn local_time(&self, tick: u32) -> f64 {
        f64::from(tick) * self.tick_interval_secs
    }

    // ========================================================================
    // LOCAL PREDICTION
    // ========================================================================

    /// Runs one local tick and returns the command to send.
    pub fn step(&mut self, input: InputSample, world: &dyn CollisionWorld) -> Command {
        self.tick = self.tick.wrapping_add(1);
        self.sequence = self.sequence.wrapping_add(1);
        let dt = self.tick_interval_secs as f32;

        let mut command = Command::new(self.player_id, self.sequence, self.tick, dt)
            .with_movement(input.movement)
            .with_view(input.view_angles);
        command.vertical_input = input.vertical_input;
        command.buttons = input.buttons;
        command.weapon_slot = input.weapon_slot;

        // Shots are only for local effects; the server decides hits
        let now = self.local_time(self.tick);
        let _ = step_player(
            &mut self.state,
            &command,
            now,
            &self.movement,
            &self.loadout,
            world,
        );
        self.history.insert(
            self.tick,
            PredictedFrame {
                command,
                state: self.state,
            },
        );

        self.smoother.update(dt * 1000.0);
        self.phase = PredictorState::Predicting;
        command
    }

    // ========================================================================
    // RECONCILIATION
    // ========================================================================

    /// Reconciles against the server's view of the local player.
    ///
    /// The snapshot's `last_client_tick` names the local frame to compare.
    pub fn reconcile(&mut self, authoritative: &PlayerSnapshot, world: &dyn CollisionWorld) -> ReconcileOutcome {
        let ack = authoritative.last_client_tick;
        if ack == 0 || self.last_ack.is_some_and(|last| ack <= last) {
            return ReconcileOutcome::Ignored;
        }
        self.last_ack = Some(ack);

        let outcome = match self.history.get(ack).copied() {
            Some(frame) => {
                let error = frame.state.position.distance(authoritative.position);
                if error <= self.config.error_tolerance {
                    self.accept(authoritative, frame.state.position, error)
                } else {
                    self.replay(authoritative, Some(&frame), ack, error, world)
                }
            }
            // Frame fell out of history; trust the server
            None => {
                let error = self.state.position.distance(authoritative.position);
                self.replay(authoritative, None, ack, error, world)
            }
        };

        self.history.remove_before(ack.wrapping_add(1));
        self.phase = PredictorState::Predicting;
        outcome
    }

    /// Small error: shift the logical state onto the authoritative track and
    /// blend the difference out on screen.
    fn accept(&mut self, authoritative: &PlayerSnapshot, predicted: Vec3, error: f32) -> ReconcileOutcome {
        let correction = authoritative.position - predicted;
        let before = self.state.position;

        self.state.position += correction;
        self.state.health = authoritative.health;
        self.state.is_dead = authoritative.is_dead;
        let ack = authoritative.last_client_tick;
        let later: Vec<u32> = self.history.iter_after(ack).map(|(tick, _)| tick).collect();
        for tick in later {
            if let Some(frame) = self.history.get_mut(tick) {
                frame.state.position += correction;
            }
        }

        self.smoother.start_correction(before, self.state.position);
        trace!(ack, error, "prediction accepted");
        ReconcileOutcome::Accepted { error }
    }

    /// Large error: adopt the authoritative state and replay every later frame.
    ///
    /// Weapon timers run on the local clock, so the locally predicted weapon
    /// state at the acknowledged tick is kept when available.
    fn replay(
        &mut self,
        authoritative: &PlayerSnapshot,
        acked_frame: Option<&PredictedFrame>,
        ack: u32,
        error: f32,
        world: &dyn CollisionWorld,
    ) -> ReconcileOutcome {
        self.phase = PredictorState::Reconciling;
        let before = self.state.position;

        let mut state = authoritative.to_state();
        if let Some(frame) = acked_frame {
            state.weapons = frame.state.weapons;
        }
        self.state = state;

        let pending: Vec<(u32, Command)> = self
            .history
            .iter_after(ack)
            .map(|(tick, frame)| (tick, frame.command))
            .collect();
        for &(tick, command) in &pending {
            let now = self.local_time(tick);
            let _ = step_player(
                &mut self.state,
                &command,
                now,
                &self.movement,
                &self.loadout,
                world,
            );
            if let Some(frame) = self.history.get_mut(tick) {
                frame.state = self.state;
            }
        }

        self.smoother.start_correction(before, self.state.position);
        debug!(ack, error, replayed = pending.len(), "prediction corrected");
        ReconcileOutcome::Replayed {
            error,
            replayed: pending.len(),
        }
    }

    // ========================================================================
    // REMOTE PLAYERS
    // ========================================================================

    /// Reconciles the local player and retargets every remote one.
    ///
    /// Remote players missing from the snapshot are forgotten.
    pub fn ingest(&mut self, snapshot: &WorldSnapshot, world: &dyn CollisionWorld) -> Option<ReconcileOutcome> {
        let teleport = self.config.remote_teleport_distance;
        self.remotes
            .retain(|id, _| snapshot.players.contains_key(id));
        for (&id, player) in &snapshot.players {
            if id == self.player_id {
                continue;
            }
            self.remotes
                .entry(id)
                .or_insert_with(|| RemoteInterpolator::new(player.position))
                .set_target(player.position, teleport);
        }

        snapshot
            .player(self.player_id)
            .copied()
            .map(|own| self.reconcile(&own, world))
    }

    /// Moves every remote player toward its target.
    pub fn advance_remotes(&mut self, dt_secs: f32) {
        let rate = self.config.remote_approach_rate;
        let epsilon = self.config.remote_snap_epsilon;
        for remote in self.remotes.values_mut() {
            remote.advance(dt_secs, rate, epsilon);
        }
    }

    /// Where to draw a remote player.
    #[must_use]
    pub fn remote_position(&self, id: PlayerId) -> Option<Vec3> {
        self.remotes.get(&id).map(RemoteInterpolator::position)
    }

    // ========================================================================
    // ACCESS
    // ========================================================================

    /// Predicted logical state.
    #[must_use]
    pub const fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Where to draw the local player.
    #[must_use]
    pub fn visual_position(&self) -> Vec3 {
        self.smoother.visual_position(self.state.position)
    }

    /// Correction blending state.
    #[must_use]
    pub const fn smoother(&self) -> &CorrectionSmoother {
        &self.smoother
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn predictor_state(&self) -> PredictorState {
        self.phase
    }

    /// Last local tick run.
    #[must_use]
    pub const fn current_tick(&self) -> u32 {
        self.tick
    }

    /// Last sequence number issued.
    #[must_use]
    pub const fn last_sequence(&self) -> u32 {
        self.sequence
    }

    /// Last acknowledged local tick.
    #[must_use]
    pub const fn last_acknowledged_tick(&self) -> Option<u32> {
        self.last_ack
    }

    /// Predicted frames not yet acknowledged.
    #[must_use]
    pub const fn pending_frames(&self) -> usize {
        self.history.len()
    }
}
