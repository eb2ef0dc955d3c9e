//! # Netcode Error Types
//!
//! Everything that can fail at the edges of the core. Inside the tick loop
//! nothing returns an error: bad input from one player is recorded as a
//! violation against that player and the tick carries on.

use thiserror::Error;

use crate::PlayerId;

/// Errors surfaced to the host process.
#[derive(Error, Debug)]
pub enum NetcodeError {
    /// No live player has this id.
    #[error("unknown player: {0}")]
    UnknownPlayer(PlayerId),

    /// A connect request reused an id that is still live.
    #[error("player id already in use: {0}")]
    DuplicatePlayer(PlayerId),

    /// Every player slot is taken.
    #[error("server full: {capacity} players")]
    ServerFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// The lifecycle channel was closed by the host.
    #[error("lifecycle channel closed")]
    LifecycleClosed,

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Wire format failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors raised while loading or validating [`crate::NetcodeConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML did not parse into a config.
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors raised by the wire codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Packet ended before the declared payload.
    #[error("truncated packet: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// Encoding would exceed the MTU-safe buffer.
    #[error("packet exceeds {limit} bytes")]
    Overflow {
        /// Buffer limit.
        limit: usize,
    },

    /// Unknown packet type tag.
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// A field held a value that cannot be represented in memory.
    #[error("invalid field `{0}`")]
    InvalidField(&'static str),

    /// Bytes left over after a complete packet.
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
}

/// Result type for host-facing operations.
pub type NetcodeResult<T> = Result<T, NetcodeError>;

/// Result type for config loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for the wire codec.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
