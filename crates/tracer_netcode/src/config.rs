//! # Netcode Configuration
//!
//! Loaded once at startup from TOML and validated before the tick loop
//! starts. Every field has a default so a config file only needs to list
//! what it changes.
//!
//! ```toml
//! tick_rate = 64
//! snapshot_capacity = 64
//!
//! [lag_compensation]
//! interpolation_delay_ms = 7.8125
//!
//! [[weapons]]
//! name = "rifle"
//! damage = 25.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracer_shared::{Vec3, MAX_PLAYERS, MAX_WEAPON_SLOTS, TICK_RATE};

use crate::anti_cheat::AntiCheatConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::lag_compensation::LagCompensationConfig;
use crate::prediction::PredictionConfig;
use crate::simulation::movement::MovementConfig;
use crate::simulation::weapons::WeaponDescriptor;

/// Top-level configuration shared by server and client.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetcodeConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Maximum concurrent players.
    pub max_players: usize,
    /// Snapshot history length in ticks. This is also the maximum rollback
    /// window for lag compensation and reconciliation.
    pub snapshot_capacity: usize,
    /// Commands applied per player per tick; the rest wait for later ticks.
    pub max_commands_per_tick: usize,
    /// Commands a player may have queued; older ones are dropped beyond this.
    pub max_queued_commands: usize,
    /// Seconds of silence before a player is flagged stale.
    pub stale_timeout_secs: f64,
    /// Seconds a dead player waits before respawning.
    pub respawn_delay_secs: f64,
    /// Spawn points, used round-robin.
    pub spawn_points: Vec<Vec3>,
    /// Weapon table; slot index = position in this list.
    pub weapons: Vec<WeaponDescriptor>,
    /// Movement tuning shared by simulation and prediction.
    pub movement: MovementConfig,
    /// Lag compensation tuning.
    pub lag_compensation: LagCompensationConfig,
    /// Anti-cheat thresholds.
    pub anti_cheat: AntiCheatConfig,
    /// Client prediction tuning.
    pub prediction: PredictionConfig,
}

impl Default for NetcodeConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            max_players: MAX_PLAYERS,
            snapshot_capacity: 64,
            max_commands_per_tick: 3,
            max_queued_commands: 32,
            stale_timeout_secs: 5.0,
            respawn_delay_secs: 3.0,
            spawn_points: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(10.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 10.0),
                Vec3::new(-10.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, -10.0),
            ],
            weapons: WeaponDescriptor::default_loadout(),
            movement: MovementConfig::default(),
            lag_compensation: LagCompensationConfig::default(),
            anti_cheat: AntiCheatConfig::default(),
            prediction: PredictionConfig::default(),
        }
    }
}

impl NetcodeConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(1..=1000).contains(&self.tick_rate) {
            return Err(invalid("tick_rate", "must be within 1..=1000"));
        }
        if self.max_players == 0 {
            return Err(invalid("max_players", "must be at least 1"));
        }
        if !(2..=1024).contains(&self.snapshot_capacity) {
            return Err(invalid("snapshot_capacity", "must be within 2..=1024"));
        }
        if self.max_commands_per_tick == 0 {
            return Err(invalid("max_commands_per_tick", "must be at least 1"));
        }
        if self.max_queued_commands < self.max_commands_per_tick {
            return Err(invalid(
                "max_queued_commands",
                "must be at least max_commands_per_tick",
            ));
        }
        if !self.stale_timeout_secs.is_finite() || self.stale_timeout_secs <= 0.0 {
            return Err(invalid("stale_timeout_secs", "must be positive"));
        }
        if !self.respawn_delay_secs.is_finite() || self.respawn_delay_secs < 0.0 {
            return Err(invalid("respawn_delay_secs", "must not be negative"));
        }
        if self.spawn_points.is_empty() {
            return Err(invalid("spawn_points", "need at least one spawn point"));
        }
        if self.weapons.is_empty() || self.weapons.len() > MAX_WEAPON_SLOTS {
            return Err(invalid(
                "weapons",
                format!("need between 1 and {MAX_WEAPON_SLOTS} weapons"),
            ));
        }
        for weapon in &self.weapons {
            weapon.validate()?;
        }
        self.movement.validate()?;
        self.lag_compensation.validate()?;
        self.anti_cheat.validate()?;
        self.prediction.validate()?;
        Ok(())
    }

    /// Duration of one tick.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_secs())
    }

    /// Duration of one tick in seconds.
    #[must_use]
    pub fn tick_interval_secs(&self) -> f64 {
        1.0 / f64::from(self.tick_rate)
    }

    /// Duration of one tick in milliseconds.
    #[must_use]
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / f64::from(self.tick_rate)
    }

    /// Maximum number of ticks a rewind may reach back.
    #[must_use]
    pub fn max_rollback_ticks(&self) -> u32 {
        self.snapshot_capacity as u32
    }
}

/// Builds a [`ConfigError::Invalid`].
pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NetcodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_micros(15_625));
        assert_eq!(config.max_rollback_ticks(), 64);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NetcodeConfig::from_toml_str(
            r#"
            tick_rate = 128
            [anti_cheat]
            violation_threshold = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.tick_rate, 128);
        assert_eq!(config.anti_cheat.violation_threshold, 8);
        assert_eq!(config.snapshot_capacity, 64);
        assert_eq!(config.weapons.len(), 3);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let err = NetcodeConfig::from_toml_str("tick_rate = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "tick_rate", .. }));

        let err = NetcodeConfig::from_toml_str("snapshot_capacity = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "snapshot_capacity", .. }));

        let err = NetcodeConfig::from_toml_str("weapons = []").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "weapons", .. }));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = NetcodeConfig::from_toml_str("tick_rate = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = NetcodeConfig::from_toml_str("no_such_field = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_shipped_server_config_parses() {
        let text = include_str!("../../../config/server.toml");
        let config = NetcodeConfig::from_toml_str(text).unwrap();
        assert_eq!(config.tick_rate, 64);
        assert!(config.lag_compensation.enabled);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = NetcodeConfig::load("/definitely/not/here.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert!(path.contains("not/here.toml")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
