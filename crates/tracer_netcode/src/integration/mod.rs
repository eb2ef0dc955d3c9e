//! # Integration Layer
//!
//! Boundary between the netcode core and the host engine: the collision
//! collaborator it calls into, a reference arena implementation, and the
//! events it emits.

pub mod arena;
pub mod events;
pub mod traits;

pub use arena::{Aabb, FlatArena, GROUND_ENTITY};
pub use events::{DisconnectReason, EventQueue, SimEvent};
pub use traits::{Body, CollisionWorld, EmptyWorld, EntityId};
