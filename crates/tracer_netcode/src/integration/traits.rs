//! # Collaborator Traits
//!
//! The netcode core never resolves collision itself. The host engine
//! implements [`CollisionWorld`] and the simulation, the predictor and the
//! lag compensator call into it.
//!
//! ```text
//! Core calls:                     Engine implements:
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │ move_with_collision  │ ────▶  │ impl CollisionWorld  │
//! │ raycast              │        │                      │
//! └──────────────────────┘        └──────────────────────┘
//! ```
//!
//! Client and server must hand the core the same geometry, otherwise
//! prediction diverges and every step reconciles.

use tracer_shared::{Vec3, PLAYER_HEIGHT, PLAYER_RADIUS};

/// Identifier of a piece of world geometry.
pub type EntityId = u32;

/// Collision proxy for a moving player.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    /// Feet position.
    pub position: Vec3,
    /// Horizontal radius.
    pub radius: f32,
    /// Standing height.
    pub height: f32,
}

impl Body {
    /// Standard player body at `position`.
    #[must_use]
    pub const fn player(position: Vec3) -> Self {
        Self {
            position,
            radius: PLAYER_RADIUS,
            height: PLAYER_HEIGHT,
        }
    }
}

/// Static world geometry as seen by the netcode core.
///
/// Implementations must be deterministic: the same query on the same
/// geometry returns bit-identical results on every machine.
pub trait CollisionWorld: Send + Sync {
    /// First geometry hit along a ray.
    ///
    /// `direction` is unit length. Returns the entity and the hit point, or
    /// `None` if nothing lies within `max_distance`. Players are not part
    /// of the world; the core tests them itself.
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<(EntityId, Vec3)>;

    /// Moves `body` by up to `desired` and returns the displacement actually
    /// achieved after sliding against geometry.
    fn move_with_collision(&self, body: &Body, desired: Vec3) -> Vec3;
}

/// A world with no geometry at all: no floor, no walls.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyWorld;

impl CollisionWorld for EmptyWorld {
    fn raycast(&self, _origin: Vec3, _direction: Vec3, _max_distance: f32) -> Option<(EntityId, Vec3)> {
        None
    }

    fn move_with_collision(&self, _body: &Body, desired: Vec3) -> Vec3 {
        desired
    }
}
