//! # Wire Protocol
//!
//! Fixed-layout little-endian packets, one per datagram.
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Type (1) │ Version (2) │ Reserved (2) │ Sequence (4)         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Command:    CommandRecord (56)                               │
//! │ Snapshot:   tick (4) │ time (8) │ chunk (1) │ of (1) │ n (2) │
//! │             n x PlayerStateRecord (160)                      │
//! │ Connect:    name length (1) │ UTF-8 name (<= 32)             │
//! │ Disconnect: -                                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A world snapshot that does not fit in [`tracer_shared::MAX_PACKET_SIZE`]
//! is split into chunks and put back together by [`SnapshotAssembler`].
//!
//! The player id in a command is never read from the wire; the receive path
//! supplies it from the connection.

mod packets;
mod serialization;

pub use packets::{
    CommandRecord, Packet, PacketHeader, PacketType, PlayerStateRecord, SnapshotAssembler, SnapshotChunk,
    WeaponRecord, MAX_NAME_LEN,
};
pub use serialization::{decode, PacketDeserializer, PacketSerializer};
