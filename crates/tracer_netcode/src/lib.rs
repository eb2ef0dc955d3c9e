//! # TRACER Netcode - Authoritative FPS Core
//!
//! Fixed-rate authoritative simulation for a first-person shooter, with
//! client-side prediction and server-side rollback hit detection.
//!
//! ## Architecture
//!
//! - **Tick Clock**: fixed-timestep accumulator driving everything else
//! - **Command Buffer**: the only structure touched by the receive path
//! - **Simulation**: applies commands, writes one snapshot per tick
//! - **Lag Compensation**: rewinds targets to what the shooter saw
//! - **Prediction**: client mirror of the simulation with reconciliation
//! - **Anti-Cheat**: plausibility checks and a per-player violation ledger
//!
//! ## Data Flow
//!
//! ```text
//! CLIENT                                SERVER
//!   | predict locally                     |
//!   |--- Command (seq, tick, input) ----->| CommandBuffer::submit
//!   |                                     | TickClock -> Simulation::run_tick
//!   |                                     |   drain -> move -> fire -> rewind
//!   |<-- WorldSnapshot (per tick) --------| SnapshotStore::push
//!   | reconcile against ack               |
//! ```
//!
//! The client never decides outcomes. Hits, damage and deaths are resolved
//! on the server against the world as the shooter saw it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tracer_netcode::{FlatArena, NetcodeConfig, NetcodeServer};
//!
//! let mut server = NetcodeServer::new(NetcodeConfig::default(), FlatArena::open(50.0));
//! server.connect(1, "alice")?;
//! server.update(std::time::Duration::from_millis(16));
//! let world = server.latest_world_state();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod anti_cheat;
pub mod command;
pub mod config;
pub mod error;
pub mod integration;
pub mod lag_compensation;
pub mod prediction;
pub mod protocol;
pub mod server;
pub mod simulation;
pub mod snapshot;

/// Stable identifier of a connected player.
pub type PlayerId = u32;

// Re-exports for convenience
pub use anti_cheat::{AntiCheat, AntiCheatConfig, RejectReason, ViolationKind, ViolationLedger};
pub use command::{Buttons, Command};
pub use config::NetcodeConfig;
pub use error::{ConfigError, NetcodeError, NetcodeResult, ProtocolError};
pub use integration::{Body, CollisionWorld, DisconnectReason, EntityId, EventQueue, FlatArena, SimEvent};
pub use lag_compensation::{LagCompensationConfig, LagCompensator, RewindGuard, ShotResolution};
pub use prediction::{ClientPredictor, InputSample, PredictionConfig, PredictorState, ReconcileOutcome};
pub use server::{
    CommandBuffer, LifecycleEvent, NetcodeServer, NetworkPlayer, PlayerState, TickClock, TickEvent,
    TickPacer, TickStats,
};
pub use simulation::Simulation;
pub use snapshot::{PlayerSnapshot, SnapshotStore, TickRing, WorldSnapshot};
