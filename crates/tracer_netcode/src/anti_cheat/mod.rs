//! # Anti-Cheat Validation
//!
//! Best-effort plausibility checks. Nothing here proves a player is
//! cheating; it only refuses input that the simulation could never have
//! produced and counts how often a player sends it.
//!
//! ## Check Points
//!
//! - **Admission** (receive path): sequence replay, non-finite values,
//!   movement magnitude, step length, command cadence
//! - **Simulation** (tick thread): horizontal displacement since the last
//!   validated position against the movement speed budget
//!
//! Every failure lands in the player's [`ViolationLedger`]. Reaching
//! `violation_threshold` disconnects that player at the next tick boundary.

use serde::Deserialize;
use thiserror::Error;
use tracer_shared::Vec3;

use crate::command::Command;
use crate::config::invalid;
use crate::error::ConfigResult;

/// Slack added to the displacement budget to absorb float error.
const DISPLACEMENT_EPSILON: f32 = 0.01;

/// Anti-cheat thresholds.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AntiCheatConfig {
    /// Violations before a forced disconnect.
    pub violation_threshold: u32,
    /// Largest accepted movement input magnitude.
    pub max_movement_magnitude: f32,
    /// `delta_time` may not exceed this many tick intervals.
    pub max_delta_time_factor: f32,
    /// Consecutive commands may not be closer than this many tick intervals
    /// in client time.
    pub min_cadence_factor: f64,
    /// Multiplier on the movement speed budget for the displacement check.
    pub speed_tolerance: f32,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            violation_threshold: 5,
            max_movement_magnitude: 1.1,
            max_delta_time_factor: 2.0,
            min_cadence_factor: 0.5,
            speed_tolerance: 1.5,
        }
    }
}

impl AntiCheatConfig {
    /// Checks every threshold is usable.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.violation_threshold == 0 {
            return Err(invalid("anti_cheat.violation_threshold", "must be at least 1"));
        }
        if !(self.max_movement_magnitude.is_finite() && self.max_movement_magnitude >= 1.0) {
            return Err(invalid("anti_cheat.max_movement_magnitude", "must be at least 1.0"));
        }
        if !(self.max_delta_time_factor.is_finite() && self.max_delta_time_factor >= 1.0) {
            return Err(invalid("anti_cheat.max_delta_time_factor", "must be at least 1.0"));
        }
        if !(self.min_cadence_factor.is_finite() && (0.0..=1.0).contains(&self.min_cadence_factor)) {
            return Err(invalid("anti_cheat.min_cadence_factor", "must be within 0..=1"));
        }
        if !(self.speed_tolerance.is_finite() && self.speed_tolerance >= 1.0) {
            return Err(invalid("anti_cheat.speed_tolerance", "must be at least 1.0"));
        }
        Ok(())
    }
}

/// Why a command was refused at admission.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// Sequence number did not increase.
    #[error("sequence {received} is not after {last_accepted}")]
    StaleSequence {
        /// Sequence carried by the command.
        received: u32,
        /// Last sequence accepted from this player.
        last_accepted: u32,
    },

    /// Movement input longer than allowed.
    #[error("movement magnitude {0:.3} out of bounds")]
    MovementOutOfBounds(f32),

    /// Step length outside `(0, max_delta_time_factor * interval]`.
    #[error("delta time {0:.6}s out of bounds")]
    DeltaTimeOutOfBounds(f32),

    /// Commands sampled faster than the cadence floor.
    #[error("commands {interval:.6}s apart in client time")]
    CadenceTooFast {
        /// Client-time gap to the previous accepted command.
        interval: f64,
    },

    /// NaN or infinity in a float field.
    #[error("non-finite value in command")]
    NonFinite,

    /// The command names a player with no inbox.
    #[error("no such player")]
    UnknownPlayer,
}

impl RejectReason {
    /// Ledger bucket for this rejection.
    #[must_use]
    pub const fn kind(&self) -> ViolationKind {
        match self {
            Self::StaleSequence { .. } => ViolationKind::Replay,
            Self::MovementOutOfBounds(_) => ViolationKind::Movement,
            Self::DeltaTimeOutOfBounds(_) => ViolationKind::DeltaTime,
            Self::CadenceTooFast { .. } => ViolationKind::Cadence,
            Self::NonFinite | Self::UnknownPlayer => ViolationKind::Malformed,
        }
    }
}

/// Category of a recorded violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViolationKind {
    /// Replayed or reordered sequence number.
    Replay,
    /// Oversized movement input.
    Movement,
    /// Step length out of range.
    DeltaTime,
    /// Commands too close together.
    Cadence,
    /// Unparseable or non-finite values.
    Malformed,
    /// Moved further than the speed budget allows.
    Speed,
}

impl ViolationKind {
    /// Number of kinds.
    pub const COUNT: usize = 6;

    /// Every kind, in ledger order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Replay,
        Self::Movement,
        Self::DeltaTime,
        Self::Cadence,
        Self::Malformed,
        Self::Speed,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Replay => 0,
            Self::Movement => 1,
            Self::DeltaTime => 2,
            Self::Cadence => 3,
            Self::Malformed => 4,
            Self::Speed => 5,
        }
    }
}

/// Per-player violation counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViolationLedger {
    total: u32,
    by_kind: [u32; ViolationKind::COUNT],
}

impl ViolationLedger {
    /// Records one violation and returns the new total.
    pub fn record(&mut self, kind: ViolationKind) -> u32 {
        self.total = self.total.saturating_add(1);
        let slot = &mut self.by_kind[kind.index()];
        *slot = slot.saturating_add(1);
        self.total
    }

    /// Total violations of every kind.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Violations of one kind.
    #[must_use]
    pub const fn count(&self, kind: ViolationKind) -> u32 {
        self.by_kind[kind.index()]
    }
}

/// Cadence and sequence state the admission check compares against.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AdmissionHistory {
    /// Last accepted sequence number.
    pub last_sequence: Option<u32>,
    /// Client time of the last accepted command.
    pub last_client_time: Option<f64>,
}

/// Stateless validator; per-player state lives with the caller.
#[derive(Clone, Debug)]
pub struct AntiCheat {
    config: AntiCheatConfig,
    tick_interval_secs: f64,
}

impl AntiCheat {
    /// Creates a validator for the given tick interval.
    #[must_use]
    pub fn new(config: AntiCheatConfig, tick_interval_secs: f64) -> Self {
        Self {
            config,
            tick_interval_secs,
        }
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn config(&self) -> &AntiCheatConfig {
        &self.config
    }

    /// Admission checks, cheapest first.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn check_admission(&self, command: &Command, history: &AdmissionHistory) -> Result<(), RejectReason> {
        if !command.is_finite() {
            return Err(RejectReason::NonFinite);
        }

        if let Some(last_accepted) = history.last_sequence {
            if command.sequence_number <= last_accepted {
                return Err(RejectReason::StaleSequence {
                    received: command.sequence_number,
                    last_accepted,
                });
            }
        }

        let magnitude = command.movement.length();
        if magnitude > self.config.max_movement_magnitude {
            return Err(RejectReason::MovementOutOfBounds(magnitude));
        }

        let max_dt = self.tick_interval_secs * f64::from(self.config.max_delta_time_factor);
        if command.delta_time <= 0.0 || f64::from(command.delta_time) > max_dt + 1e-9 {
            return Err(RejectReason::DeltaTimeOutOfBounds(command.delta_time));
        }

        if let Some(previous) = history.last_client_time {
            let interval = command.client_time - previous;
            if interval < self.tick_interval_secs * self.config.min_cadence_factor - 1e-9 {
                return Err(RejectReason::CadenceTooFast { interval });
            }
        }

        Ok(())
    }

    /// Horizontal displacement check over `elapsed_secs` of applied input.
    ///
    /// Vertical motion is left to gravity and not checked.
    #[must_use]
    pub fn displacement_plausible(&self, from: Vec3, to: Vec3, elapsed_secs: f32, speed_budget: f32) -> bool {
        let moved = (to - from).horizontal().length();
        let allowed = speed_budget * elapsed_secs * self.config.speed_tolerance + DISPLACEMENT_EPSILON;
        moved <= allowed
    }

    /// Records a violation and returns true once the threshold is reached.
    pub fn record(&self, ledger: &mut ViolationLedger, kind: ViolationKind) -> bool {
        ledger.record(kind) >= self.config.violation_threshold
    }

    /// Returns true if the ledger has reached the kick threshold.
    #[must_use]
    pub const fn over_threshold(&self, ledger: &ViolationLedger) -> bool {
        ledger.total() >= self.config.violation_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracer_shared::Vec2;

    const DT: f32 = 1.0 / 64.0;

    fn validator() -> AntiCheat {
        AntiCheat::new(AntiCheatConfig::default(), f64::from(DT))
    }

    #[test]
    fn test_accepts_well_formed_command() {
        let cmd = Command::new(1, 1, 1, DT).with_movement(Vec2::new(0.0, 1.0));
        assert_eq!(validator().check_admission(&cmd, &AdmissionHistory::default()), Ok(()));
    }

    #[test]
    fn test_rejects_replayed_sequence() {
        let history = AdmissionHistory {
            last_sequence: Some(6),
            last_client_time: Some(6.0 * f64::from(DT)),
        };
        let cmd = Command::new(1, 5, 7, DT);
        assert_eq!(
            validator().check_admission(&cmd, &history),
            Err(RejectReason::StaleSequence { received: 5, last_accepted: 6 })
        );
    }

    #[test]
    fn test_rejects_oversized_movement() {
        let cmd = Command::new(1, 1, 1, DT).with_movement(Vec2::new(1.0, 1.0));
        assert!(matches!(
            validator().check_admission(&cmd, &AdmissionHistory::default()),
            Err(RejectReason::MovementOutOfBounds(_))
        ));

        // Small analog overshoot is tolerated
        let cmd = Command::new(1, 1, 1, DT).with_movement(Vec2::new(0.0, 1.05));
        assert!(validator().check_admission(&cmd, &AdmissionHistory::default()).is_ok());
    }

    #[test]
    fn test_delta_time_bounds() {
        let v = validator();
        let history = AdmissionHistory::default();
        assert!(v.check_admission(&Command::new(1, 1, 1, 0.0), &history).is_err());
        assert!(v.check_admission(&Command::new(1, 1, 1, 2.0 * DT), &history).is_ok());
        assert!(v.check_admission(&Command::new(1, 1, 1, 2.5 * DT), &history).is_err());
    }

    #[test]
    fn test_rejects_fast_cadence() {
        let history = AdmissionHistory {
            last_sequence: Some(1),
            last_client_time: Some(1.0),
        };
        let mut cmd = Command::new(1, 2, 2, DT);
        cmd.client_time = 1.0 + f64::from(DT) * 0.25;
        assert!(matches!(
            validator().check_admission(&cmd, &history),
            Err(RejectReason::CadenceTooFast { .. })
        ));

        cmd.client_time = 1.0 + f64::from(DT);
        assert!(validator().check_admission(&cmd, &history).is_ok());
    }

    #[test]
    fn test_displacement_budget() {
        let v = validator();
        let from = Vec3::ZERO;
        // 5 m/s for one tick, tolerance 1.5 => ~0.117 m allowed
        assert!(v.displacement_plausible(from, Vec3::new(0.1, 0.0, 0.0), DT, 5.0));
        assert!(!v.displacement_plausible(from, Vec3::new(1.0, 0.0, 0.0), DT, 5.0));
        // Falling does not count
        assert!(v.displacement_plausible(from, Vec3::new(0.0, -3.0, 0.0), DT, 5.0));
    }

    #[test]
    fn test_ledger_threshold() {
        let v = validator();
        let mut ledger = ViolationLedger::default();
        for _ in 0..4 {
            assert!(!v.record(&mut ledger, ViolationKind::Replay));
        }
        assert!(v.record(&mut ledger, ViolationKind::Speed));
        assert_eq!(ledger.total(), 5);
        assert_eq!(ledger.count(ViolationKind::Replay), 4);
        assert_eq!(ledger.count(ViolationKind::Speed), 1);
        assert!(v.over_threshold(&ledger));
    }
}
