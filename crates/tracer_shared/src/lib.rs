//! # TRACER Shared
//!
//! Common types used by both the authoritative server and the predicting
//! client.
//!
//! ## CRITICAL RULE
//!
//! Nothing in here may hold simulation state. If a type needs to change per
//! tick it belongs in `tracer_netcode`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{
    EYE_HEIGHT, MAX_HEALTH, MAX_PACKET_SIZE, MAX_PLAYERS, MAX_WEAPON_SLOTS, PLAYER_HEIGHT,
    PLAYER_RADIUS, PROTOCOL_VERSION, SERVER_PORT, TICK_RATE,
};
pub use math::{Vec2, Vec3, ViewAngles};
