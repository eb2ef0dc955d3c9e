//! # Packet Definitions
//!
//! Every record that crosses the wire.
//!
//! ## Fixed-Size Records
//!
//! [`CommandRecord`] and [`PlayerStateRecord`] are `Pod` so they can be
//! copied straight in and out of packet buffers. Padding is explicit; the
//! compiler never inserts any.

use bytemuck::{Pod, Zeroable};
use tracer_shared::{Vec2, Vec3, ViewAngles, MAX_PACKET_SIZE, MAX_WEAPON_SLOTS, PROTOCOL_VERSION};

use crate::command::{Buttons, Command};
use crate::error::{ProtocolError, ProtocolResult};
use crate::simulation::weapons::WeaponState;
use crate::snapshot::{PlayerSnapshot, WorldSnapshot};
use crate::PlayerId;

/// Packet header - present in every packet.
///
/// Total size: 8 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PacketHeader {
    /// Wire protocol version of the sender.
    pub protocol_version: u16,
    /// Reserved, always zero.
    pub _reserved: u16,
    /// Sender's packet sequence number.
    pub sequence: u32,
}

impl PacketHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 8;

    /// Creates a header for the current protocol version.
    #[inline]
    #[must_use]
    pub const fn new(sequence: u32) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            _reserved: 0,
            sequence,
        }
    }
}

/// Types of packets in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Client -> Server: one command (unreliable).
    Command = 0,
    /// Server -> Client: one chunk of a world snapshot (unreliable).
    Snapshot = 1,
    /// Client -> Server: join request (reliable).
    Connect = 2,
    /// Bidirectional: leave notification (reliable).
    Disconnect = 3,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> ProtocolResult<Self> {
        match value {
            0 => Ok(Self::Command),
            1 => Ok(Self::Snapshot),
            2 => Ok(Self::Connect),
            3 => Ok(Self::Disconnect),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// Command as sent by the client.
///
/// Size: 56 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CommandRecord {
    /// Per-player sequence number.
    pub sequence_number: u32,
    /// Client tick the command was sampled on.
    pub client_tick: u32,
    /// Client clock at sampling, seconds.
    pub client_time: f64,
    /// Step length, seconds.
    pub delta_time: f32,
    /// Pitch, yaw, roll.
    pub view_angles: [f32; 3],
    /// Strafe, forward.
    pub movement: [f32; 2],
    /// Jump (positive) or crouch (negative).
    pub up_movement: f32,
    /// Button bitmask.
    pub buttons: u32,
    /// Requested slot, `-1` for no change.
    pub weapon_slot: i32,
    /// Padding for alignment.
    pub _padding: u32,
}

impl CommandRecord {
    /// Size in bytes.
    pub const SIZE: usize = 56;

    /// Weapon slot value meaning "keep the current weapon".
    pub const NO_WEAPON_CHANGE: i32 = -1;

    /// Encodes a command. The player id is not sent.
    #[must_use]
    pub fn from_command(command: &Command) -> Self {
        Self {
            sequence_number: command.sequence_number,
            client_tick: command.client_tick,
            client_time: command.client_time,
            delta_time: command.delta_time,
            view_angles: command.view_angles.to_array(),
            movement: command.movement.to_array(),
            up_movement: command.vertical_input,
            buttons: command.buttons.bits(),
            weapon_slot: command.weapon_slot.map_or(Self::NO_WEAPON_CHANGE, i32::from),
            _padding: 0,
        }
    }

    /// Decodes into a command owned by `player_id`.
    ///
    /// Undefined button bits are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidField`] for a weapon slot outside
    /// `-1..=255`.
    pub fn to_command(&self, player_id: PlayerId) -> ProtocolResult<Command> {
        let weapon_slot = match self.weapon_slot {
            Self::NO_WEAPON_CHANGE => None,
            slot => Some(u8::try_from(slot).map_err(|_| ProtocolError::InvalidField("weapon_slot"))?),
        };
        Ok(Command {
            sequence_number: self.sequence_number,
            client_tick: self.client_tick,
            client_time: self.client_time,
            delta_time: self.delta_time,
            movement: Vec2::new(self.movement[0], self.movement[1]),
            vertical_input: self.up_movement,
            view_angles: ViewAngles::from_array(self.view_angles),
            buttons: Buttons::from_bits_truncate(self.buttons),
            weapon_slot,
            player_id,
        })
    }
}

/// Ammo and reload state of one weapon slot.
///
/// Size: 24 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct WeaponRecord {
    /// Rounds in the magazine.
    pub ammo: u32,
    /// Non-zero while reloading.
    pub reloading: u32,
    /// Server time the reload started.
    pub reload_started_at: f64,
    /// Earliest server time of the next shot.
    pub next_fire_at: f64,
}

impl From<WeaponState> for WeaponRecord {
    fn from(state: WeaponState) -> Self {
        Self {
            ammo: state.ammo,
            reloading: u32::from(state.reloading),
            reload_started_at: state.reload_started_at,
            next_fire_at: state.next_fire_at,
        }
    }
}

impl From<WeaponRecord> for WeaponState {
    fn from(record: WeaponRecord) -> Self {
        Self {
            ammo: record.ammo,
            reloading: record.reloading != 0,
            reload_started_at: record.reload_started_at,
            next_fire_at: record.next_fire_at,
        }
    }
}

/// One player inside a snapshot packet.
///
/// Size: 160 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PlayerStateRecord {
    /// Player id.
    pub player_id: u32,
    /// Tick the state belongs to.
    pub tick: u32,
    /// Feet position.
    pub position: [f32; 3],
    /// Velocity.
    pub velocity: [f32; 3],
    /// Pitch, yaw, roll.
    pub view_angles: [f32; 3],
    /// Health.
    pub health: f32,
    /// State flags.
    pub flags: u8,
    /// Selected slot.
    pub current_weapon: u8,
    /// Occupied slots.
    pub weapon_count: u8,
    /// Padding.
    pub _pad0: u8,
    /// Last applied command sequence.
    pub last_sequence: u32,
    /// Client tick of that command.
    pub last_client_tick: u32,
    /// Padding for alignment.
    pub _pad1: u32,
    /// Per-slot weapon state.
    pub weapons: [WeaponRecord; MAX_WEAPON_SLOTS],
}

impl PlayerStateRecord {
    /// Size in bytes.
    pub const SIZE: usize = 160;

    /// Flag: dead.
    pub const FLAG_DEAD: u8 = 1 << 0;
    /// Flag: standing on ground.
    pub const FLAG_GROUNDED: u8 = 1 << 1;
    /// Flag: crouching.
    pub const FLAG_CROUCHING: u8 = 1 << 2;

    /// Encodes one player.
    #[must_use]
    pub fn from_snapshot(player_id: PlayerId, snapshot: &PlayerSnapshot) -> Self {
        let mut flags = 0;
        if snapshot.is_dead {
            flags |= Self::FLAG_DEAD;
        }
        if snapshot.is_grounded {
            flags |= Self::FLAG_GROUNDED;
        }
        if snapshot.is_crouching {
            flags |= Self::FLAG_CROUCHING;
        }
        Self {
            player_id,
            tick: snapshot.tick,
            position: snapshot.position.to_array(),
            velocity: snapshot.velocity.to_array(),
            view_angles: snapshot.view_angles.to_array(),
            health: snapshot.health,
            flags,
            current_weapon: snapshot.current_weapon_index,
            weapon_count: snapshot.weapon_count,
            _pad0: 0,
            last_sequence: snapshot.last_sequence,
            last_client_tick: snapshot.last_client_tick,
            _pad1: 0,
            weapons: snapshot.weapons.map(WeaponRecord::from),
        }
    }

    /// Decodes one player.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidField`] for an out-of-range weapon
    /// index or count.
    pub fn to_snapshot(&self) -> ProtocolResult<(PlayerId, PlayerSnapshot)> {
        if usize::from(self.weapon_count) > MAX_WEAPON_SLOTS {
            return Err(ProtocolError::InvalidField("weapon_count"));
        }
        if self.weapon_count > 0 && self.current_weapon >= self.weapon_count {
            return Err(ProtocolError::InvalidField("current_weapon"));
        }
        let snapshot = PlayerSnapshot {
            tick: self.tick,
            position: Vec3::from_array(self.position),
            velocity: Vec3::from_array(self.velocity),
            view_angles: ViewAngles::from_array(self.view_angles),
            health: self.health,
            is_dead: self.flags & Self::FLAG_DEAD != 0,
            is_grounded: self.flags & Self::FLAG_GROUNDED != 0,
            is_crouching: self.flags & Self::FLAG_CROUCHING != 0,
            current_weapon_index: self.current_weapon,
            weapon_count: self.weapon_count,
            weapons: self.weapons.map(WeaponState::from),
            last_sequence: self.last_sequence,
            last_client_tick: self.last_client_tick,
        };
        Ok((self.player_id, snapshot))
    }
}

/// One packet's share of a world snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotChunk {
    /// Server tick.
    pub tick: u32,
    /// Server time, seconds.
    pub server_time: f64,
    /// Index of this chunk.
    pub chunk_index: u8,
    /// Chunks making up the tick.
    pub chunk_count: u8,
    /// Players carried by this chunk.
    pub players: Vec<PlayerStateRecord>,
}

impl SnapshotChunk {
    /// Bytes before the first player record: type, header, tick, time,
    /// chunk index and count, player count.
    pub const OVERHEAD: usize = 1 + PacketHeader::SIZE + 4 + 8 + 1 + 1 + 2;

    /// Players that fit in one MTU-sized packet.
    pub const MAX_PLAYERS: usize = (MAX_PACKET_SIZE - Self::OVERHEAD) / PlayerStateRecord::SIZE;

    /// Splits a snapshot into MTU-sized chunks. An empty world still yields
    /// one chunk so clients see the tick.
    #[must_use]
    pub fn split(snapshot: &WorldSnapshot) -> Vec<Self> {
        let records: Vec<PlayerStateRecord> = snapshot
            .players
            .iter()
            .map(|(&id, player)| PlayerStateRecord::from_snapshot(id, player))
            .collect();
        let groups: Vec<&[PlayerStateRecord]> = if records.is_empty() {
            vec![&records[..]]
        } else {
            records.chunks(Self::MAX_PLAYERS).collect()
        };
        let chunk_count = groups.len() as u8;
        groups
            .into_iter()
            .enumerate()
            .map(|(index, players)| Self {
                tick: snapshot.tick,
                server_time: snapshot.server_time,
                chunk_index: index as u8,
                chunk_count,
                players: players.to_vec(),
            })
            .collect()
    }

    /// Decodes this chunk's players into a partial world snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first invalid player record.
    pub fn to_world(&self) -> ProtocolResult<WorldSnapshot> {
        let mut world = WorldSnapshot::new(self.tick, self.server_time);
        for record in &self.players {
            let (id, player) = record.to_snapshot()?;
            world.players.insert(id, player);
        }
        Ok(world)
    }
}

/// Reassembles chunked snapshots on the client.
///
/// Holds at most one tick in progress; a chunk from a newer tick discards
/// the partial one, chunks from older ticks are ignored.
#[derive(Debug, Default)]
pub struct SnapshotAssembler {
    partial: Option<WorldSnapshot>,
    received: u64,
    expected: u8,
    completed_tick: Option<u32>,
}

impl SnapshotAssembler {
    /// Empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk. Returns the whole snapshot once every chunk arrived.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk is malformed or disagrees with earlier
    /// chunks of the same tick about how many chunks there are.
    pub fn push(&mut self, chunk: &SnapshotChunk) -> ProtocolResult<Option<WorldSnapshot>> {
        if chunk.chunk_count == 0 || chunk.chunk_index >= chunk.chunk_count || chunk.chunk_count > 64 {
            return Err(ProtocolError::InvalidField("chunk_index"));
        }
        if self.completed_tick.is_some_and(|done| chunk.tick <= done) {
            return Ok(None);
        }

        let part = chunk.to_world()?;
        match &mut self.partial {
            Some(partial) if partial.tick == chunk.tick => {
                if chunk.chunk_count != self.expected {
                    return Err(ProtocolError::InvalidField("chunk_count"));
                }
                if self.received & (1 << chunk.chunk_index) != 0 {
                    return Ok(None);
                }
                partial.merge(part);
            }
            Some(partial) if partial.tick > chunk.tick => return Ok(None),
            _ => {
                self.partial = Some(part);
                self.received = 0;
                self.expected = chunk.chunk_count;
            }
        }
        self.received |= 1 << chunk.chunk_index;

        if self.received.count_ones() == u32::from(self.expected) {
            self.completed_tick = Some(chunk.tick);
            return Ok(self.partial.take());
        }
        Ok(None)
    }
}

/// Longest display name accepted in a connect packet, in bytes.
pub const MAX_NAME_LEN: usize = 32;

/// Generic packet container.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    /// Player command.
    Command(PacketHeader, CommandRecord),
    /// Snapshot chunk.
    Snapshot(PacketHeader, SnapshotChunk),
    /// Join request with display name.
    Connect(PacketHeader, String),
    /// Leave notification.
    Disconnect(PacketHeader),
}

impl Packet {
    /// Returns the packet type.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        match self {
            Self::Command(..) => PacketType::Command,
            Self::Snapshot(..) => PacketType::Snapshot,
            Self::Connect(..) => PacketType::Connect,
            Self::Disconnect(..) => PacketType::Disconnect,
        }
    }

    /// Returns the header.
    #[must_use]
    pub const fn header(&self) -> &PacketHeader {
        match self {
            Self::Command(h, _) | Self::Snapshot(h, _) | Self::Connect(h, _) | Self::Disconnect(h) => h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::player::PlayerState;
    use crate::simulation::weapons::WeaponDescriptor;

    fn world_with(players: u32) -> WorldSnapshot {
        let mut world = WorldSnapshot::new(9, 9.0 / 64.0);
        let state = PlayerState::spawned(Vec3::new(1.0, 2.0, 3.0), &WeaponDescriptor::default_loadout());
        for id in 0..players {
            world.players.insert(id, PlayerSnapshot::capture(9, &state, id, id + 100));
        }
        world
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(std::mem::size_of::<PacketHeader>(), PacketHeader::SIZE);
        assert_eq!(std::mem::size_of::<CommandRecord>(), CommandRecord::SIZE);
        assert_eq!(std::mem::size_of::<WeaponRecord>(), 24);
        assert_eq!(std::mem::size_of::<PlayerStateRecord>(), PlayerStateRecord::SIZE);
    }

    #[test]
    fn test_command_weapon_slot_encoding() {
        let command = Command::new(3, 1, 1, 1.0 / 64.0);
        assert_eq!(CommandRecord::from_command(&command).weapon_slot, -1);

        let switched = command.with_weapon_slot(2);
        let record = CommandRecord::from_command(&switched);
        assert_eq!(record.weapon_slot, 2);
        assert_eq!(record.to_command(3).unwrap().weapon_slot, Some(2));

        let bad = CommandRecord {
            weapon_slot: 300,
            ..record
        };
        assert_eq!(bad.to_command(3), Err(ProtocolError::InvalidField("weapon_slot")));
    }

    #[test]
    fn test_owner_comes_from_caller() {
        let command = Command::new(3, 1, 1, 1.0 / 64.0);
        let decoded = CommandRecord::from_command(&command).to_command(8).unwrap();
        assert_eq!(decoded.player_id, 8);
    }

    #[test]
    fn test_player_record_preserves_snapshot() {
        let world = world_with(1);
        let original = world.players[&0];
        let (id, decoded) = PlayerStateRecord::from_snapshot(0, &original).to_snapshot().unwrap();
        assert_eq!(id, 0);
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_split_respects_mtu() {
        assert!(SnapshotChunk::OVERHEAD + SnapshotChunk::MAX_PLAYERS * PlayerStateRecord::SIZE <= MAX_PACKET_SIZE);

        let chunks = SnapshotChunk::split(&world_with(32));
        assert_eq!(chunks.len(), 32_usize.div_ceil(SnapshotChunk::MAX_PLAYERS));
        assert!(chunks.iter().all(|c| c.players.len() <= SnapshotChunk::MAX_PLAYERS));
        assert_eq!(SnapshotChunk::split(&WorldSnapshot::new(1, 0.0)).len(), 1);
    }

    #[test]
    fn test_assembler_reorders_and_completes() {
        let world = world_with(20);
        let mut chunks = SnapshotChunk::split(&world);
        chunks.reverse();

        let mut assembler = SnapshotAssembler::new();
        let last = chunks.pop().unwrap();
        for chunk in &chunks {
            assert_eq!(assembler.push(chunk).unwrap(), None);
        }
        // Duplicate ignored
        assert_eq!(assembler.push(&chunks[0]).unwrap(), None);
        let assembled = assembler.push(&last).unwrap().unwrap();
        assert_eq!(assembled, world);

        // Late chunk for a finished tick
        assert_eq!(assembler.push(&last).unwrap(), None);
    }

    #[test]
    fn test_assembler_rejects_mismatched_chunk_count() {
        let world = world_with(20);
        let chunks = SnapshotChunk::split(&world);
        assert_eq!(chunks.len(), 3);

        let mut assembler = SnapshotAssembler::new();
        assert_eq!(assembler.push(&chunks[0]).unwrap(), None);
        let short = SnapshotChunk {
            chunk_count: 2,
            ..chunks[1].clone()
        };
        assert_eq!(assembler.push(&short), Err(ProtocolError::InvalidField("chunk_count")));

        // The rejected chunk left no mark; the real ones still complete the tick
        assert_eq!(assembler.push(&chunks[1]).unwrap(), None);
        assert_eq!(assembler.push(&chunks[2]).unwrap(), Some(world));
    }

    #[test]
    fn test_newer_tick_discards_partial() {
        let mut assembler = SnapshotAssembler::new();
        let old = SnapshotChunk::split(&world_with(20));
        let mut newer_world = world_with(1);
        newer_world.tick = 10;
        let newer = SnapshotChunk::split(&newer_world);

        assert_eq!(assembler.push(&old[0]).unwrap(), None);
        assert_eq!(assembler.push(&newer[0]).unwrap().map(|w| w.tick), Some(10));
        assert_eq!(assembler.push(&old[1]).unwrap(), None);
    }
}
