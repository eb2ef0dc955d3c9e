//! # Protocol-Wide Constants
//!
//! Values both peers must agree on. Changing any of these is a protocol
//! break and requires a client rebuild.

/// Default tick rate (updates per second).
///
/// At 64Hz each tick is exactly 15.625ms.
pub const TICK_RATE: u32 = 64;

/// Default server port for game traffic.
pub const SERVER_PORT: u16 = 27015;

/// Maximum packet size (MTU-safe).
pub const MAX_PACKET_SIZE: usize = 1200;

/// Wire protocol version, sent with every connect request.
pub const PROTOCOL_VERSION: u16 = 1;

/// Weapon slots a player can carry. Fixed so player records stay `Pod`.
pub const MAX_WEAPON_SLOTS: usize = 4;

/// Maximum players a single server instance hosts.
pub const MAX_PLAYERS: usize = 32;

/// Player capsule radius (world units).
pub const PLAYER_RADIUS: f32 = 0.4;

/// Player capsule height, feet to crown (world units).
pub const PLAYER_HEIGHT: f32 = 1.8;

/// Eye height above the feet; shots originate here.
pub const EYE_HEIGHT: f32 = 1.6;

/// Health a player spawns with.
pub const MAX_HEALTH: f32 = 100.0;
