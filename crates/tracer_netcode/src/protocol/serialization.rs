//! # Packet Serialization
//!
//! Little-endian framing over a fixed MTU-sized buffer.
//!
//! ## Design
//!
//! - The serializer owns one pre-allocated buffer and is reused per packet
//! - `Pod` records are copied directly
//! - Every read is bounds-checked; a short or oversized packet is an error,
//!   never a panic

use bytemuck::{bytes_of, Pod};
use tracer_shared::{MAX_PACKET_SIZE, PROTOCOL_VERSION};

use super::packets::{
    CommandRecord, Packet, PacketHeader, PacketType, PlayerStateRecord, SnapshotChunk, MAX_NAME_LEN,
};
use crate::error::{ProtocolError, ProtocolResult};

/// Packet serializer - writes packets to a pre-allocated buffer.
pub struct PacketSerializer {
    buffer: [u8; MAX_PACKET_SIZE],
    position: usize,
}

impl PacketSerializer {
    /// Creates a new serializer with a fresh buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; MAX_PACKET_SIZE],
            position: 0,
        }
    }

    /// Resets the serializer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.position
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    /// Writes raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Overflow`] if the bytes do not fit.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        let end = self.position + bytes.len();
        if end > MAX_PACKET_SIZE {
            return Err(ProtocolError::Overflow { limit: MAX_PACKET_SIZE });
        }
        self.buffer[self.position..end].copy_from_slice(bytes);
        self.position = end;
        Ok(())
    }

    /// Writes a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Overflow`] when full.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> ProtocolResult<()> {
        self.write_bytes(&[value])
    }

    /// Writes a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Overflow`] when full.
    #[inline]
    pub fn write_u16(&mut self, value: u16) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Overflow`] when full.
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a f64 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Overflow`] when full.
    #[inline]
    pub fn write_f64(&mut self, value: f64) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a Pod type directly.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Overflow`] when full.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> ProtocolResult<()> {
        self.write_bytes(bytes_of(value))
    }

    fn begin(&mut self, packet_type: PacketType, header: &PacketHeader) -> ProtocolResult<()> {
        self.reset();
        self.write_u8(packet_type as u8)?;
        self.write_pod(header)
    }

    /// Serializes a command packet.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the record is far below the MTU.
    pub fn serialize_command(&mut self, header: &PacketHeader, command: &CommandRecord) -> ProtocolResult<()> {
        self.begin(PacketType::Command, header)?;
        self.write_pod(command)
    }

    /// Serializes one snapshot chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Overflow`] if the chunk holds more players
    /// than fit in one packet.
    pub fn serialize_snapshot(&mut self, header: &PacketHeader, chunk: &SnapshotChunk) -> ProtocolResult<()> {
        let count = u16::try_from(chunk.players.len()).map_err(|_| ProtocolError::Overflow { limit: MAX_PACKET_SIZE })?;
        self.begin(PacketType::Snapshot, header)?;
        self.write_u32(chunk.tick)?;
        self.write_f64(chunk.server_time)?;
        self.write_u8(chunk.chunk_index)?;
        self.write_u8(chunk.chunk_count)?;
        self.write_u16(count)?;
        for record in &chunk.players {
            self.write_pod(record)?;
        }
        Ok(())
    }

    /// Serializes a connect packet.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidField`] if the name is longer than
    /// [`MAX_NAME_LEN`] bytes.
    pub fn serialize_connect(&mut self, header: &PacketHeader, name: &str) -> ProtocolResult<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(ProtocolError::InvalidField("name"));
        }
        self.begin(PacketType::Connect, header)?;
        self.write_u8(name.len() as u8)?;
        self.write_bytes(name.as_bytes())
    }

    /// Serializes a disconnect packet.
    ///
    /// # Errors
    ///
    /// Never fails in practice.
    pub fn serialize_disconnect(&mut self, header: &PacketHeader) -> ProtocolResult<()> {
        self.begin(PacketType::Disconnect, header)
    }

    /// Serializes any packet.
    ///
    /// # Errors
    ///
    /// Same as the per-type methods.
    pub fn serialize(&mut self, packet: &Packet) -> ProtocolResult<()> {
        match packet {
            Packet::Command(header, command) => self.serialize_command(header, command),
            Packet::Snapshot(header, chunk) => self.serialize_snapshot(header, chunk),
            Packet::Connect(header, name) => self.serialize_connect(header, name),
            Packet::Disconnect(header) => self.serialize_disconnect(header),
        }
    }
}

impl Default for PacketSerializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Packet deserializer - reads one packet from a buffer.
pub struct PacketDeserializer<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketDeserializer<'a> {
    /// Creates a new deserializer from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn take(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::Truncated {
                needed: self.position + len,
                available: self.buffer.len(),
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Truncated`] at the end of the buffer.
    #[inline]
    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Truncated`] at the end of the buffer.
    #[inline]
    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Truncated`] at the end of the buffer.
    #[inline]
    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        self.read_pod::<[u8; 4]>().map(u32::from_le_bytes)
    }

    /// Reads a f64 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Truncated`] at the end of the buffer.
    #[inline]
    pub fn read_f64(&mut self) -> ProtocolResult<f64> {
        self.read_pod::<[u8; 8]>().map(f64::from_le_bytes)
    }

    /// Reads a Pod type directly. The buffer need not be aligned.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Truncated`] at the end of the buffer.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> ProtocolResult<T> {
        let slice = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(slice))
    }

    /// Deserializes one packet and checks nothing follows it.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] for truncated, trailing, unknown-type,
    /// wrong-version or otherwise invalid packets.
    pub fn deserialize(&mut self) -> ProtocolResult<Packet> {
        let packet_type = PacketType::try_from(self.read_u8()?)?;
        let header: PacketHeader = self.read_pod()?;
        if header.protocol_version != PROTOCOL_VERSION {
            return Err(ProtocolError::InvalidField("protocol_version"));
        }

        let packet = match packet_type {
            PacketType::Command => Packet::Command(header, self.read_pod()?),
            PacketType::Snapshot => {
                let tick = self.read_u32()?;
                let server_time = self.read_f64()?;
                let chunk_index = self.read_u8()?;
                let chunk_count = self.read_u8()?;
                let count = usize::from(self.read_u16()?);
                if count > SnapshotChunk::MAX_PLAYERS {
                    return Err(ProtocolError::InvalidField("player_count"));
                }
                let players = (0..count)
                    .map(|_| self.read_pod::<PlayerStateRecord>())
                    .collect::<ProtocolResult<Vec<_>>>()?;
                Packet::Snapshot(
                    header,
                    SnapshotChunk {
                        tick,
                        server_time,
                        chunk_index,
                        chunk_count,
                        players,
                    },
                )
            }
            PacketType::Connect => {
                let len = usize::from(self.read_u8()?);
                if len > MAX_NAME_LEN {
                    return Err(ProtocolError::InvalidField("name"));
                }
                let bytes = self.take(len)?;
                let name = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidField("name"))?;
                Packet::Connect(header, name.to_owned())
            }
            PacketType::Disconnect => Packet::Disconnect(header),
        };

        match self.remaining() {
            0 => Ok(packet),
            extra => Err(ProtocolError::TrailingBytes(extra)),
        }
    }
}

/// Decodes a whole datagram.
///
/// # Errors
///
/// Same as [`PacketDeserializer::deserialize`].
pub fn decode(datagram: &[u8]) -> ProtocolResult<Packet> {
    PacketDeserializer::new(datagram).deserialize()
}
