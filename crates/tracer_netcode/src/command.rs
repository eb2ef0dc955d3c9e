//! # Player Commands
//!
//! One player's sampled input for one simulation step. Commands are produced
//! by the client every tick, consumed exactly once by the authoritative
//! simulation, and replayed by the predictor during reconciliation.

use tracer_shared::{Vec2, ViewAngles};

use crate::PlayerId;

/// Button bitmask carried by every command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Buttons(pub u32);

impl Buttons {
    /// Primary fire.
    pub const FIRE: u32 = 1 << 0;
    /// Secondary fire / aim.
    pub const ALT_FIRE: u32 = 1 << 1;
    /// Reload current weapon.
    pub const RELOAD: u32 = 1 << 2;
    /// Jump.
    pub const JUMP: u32 = 1 << 3;
    /// Crouch.
    pub const CROUCH: u32 = 1 << 4;
    /// Use / interact.
    pub const USE: u32 = 1 << 5;

    /// Every defined button.
    pub const ALL: u32 = Self::FIRE
        | Self::ALT_FIRE
        | Self::RELOAD
        | Self::JUMP
        | Self::CROUCH
        | Self::USE;

    /// No buttons held.
    pub const NONE: Self = Self(0);

    /// Creates a mask from raw bits, dropping undefined ones.
    #[inline]
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    /// Returns true if every bit in `flag` is held.
    #[inline]
    #[must_use]
    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Returns the mask with `flag` held.
    #[inline]
    #[must_use]
    pub const fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// One player's input for one simulation step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Command {
    /// Strictly increasing per player. Non-increasing values are replays.
    pub sequence_number: u32,
    /// Client's local tick when the command was sampled.
    pub client_tick: u32,
    /// Client's simulated time (seconds) when the command was sampled.
    pub client_time: f64,
    /// Step length in seconds; must lie in `(0, 2 * tick interval]`.
    pub delta_time: f32,
    /// Analog movement, x = strafe right, y = forward. Expected unit-ish.
    pub movement: Vec2,
    /// Positive jumps, negative crouches.
    pub vertical_input: f32,
    /// Aim orientation.
    pub view_angles: ViewAngles,
    /// Held buttons.
    pub buttons: Buttons,
    /// Requested weapon slot, `None` = keep current.
    pub weapon_slot: Option<u8>,
    /// Owning player. Assigned by the server from the connection, never
    /// trusted from the wire.
    pub player_id: PlayerId,
}

impl Command {
    /// Creates an idle command.
    #[must_use]
    pub fn new(player_id: PlayerId, sequence_number: u32, client_tick: u32, delta_time: f32) -> Self {
        Self {
            sequence_number,
            client_tick,
            client_time: f64::from(client_tick) * f64::from(delta_time),
            delta_time,
            player_id,
            ..Self::default()
        }
    }

    /// Returns the command with movement input set.
    #[must_use]
    pub fn with_movement(mut self, movement: Vec2) -> Self {
        self.movement = movement;
        self
    }

    /// Returns the command with view angles set.
    #[must_use]
    pub fn with_view(mut self, view_angles: ViewAngles) -> Self {
        self.view_angles = view_angles;
        self
    }

    /// Returns the command with `flag` held.
    #[must_use]
    pub fn with_button(mut self, flag: u32) -> Self {
        self.buttons = self.buttons.with(flag);
        self
    }

    /// Returns the command requesting a weapon slot.
    #[must_use]
    pub fn with_weapon_slot(mut self, slot: u8) -> Self {
        self.weapon_slot = Some(slot);
        self
    }

    /// Returns true if the command fires the current weapon.
    #[inline]
    #[must_use]
    pub const fn is_firing(&self) -> bool {
        self.buttons.contains(Buttons::FIRE)
    }

    /// Returns true if the command requests a jump.
    #[inline]
    #[must_use]
    pub fn wants_jump(&self) -> bool {
        self.buttons.contains(Buttons::JUMP) || self.vertical_input > 0.5
    }

    /// Returns true if the command requests a crouch.
    #[inline]
    #[must_use]
    pub fn wants_crouch(&self) -> bool {
        self.buttons.contains(Buttons::CROUCH) || self.vertical_input < -0.5
    }

    /// Returns true if the command requests a reload.
    #[inline]
    #[must_use]
    pub const fn wants_reload(&self) -> bool {
        self.buttons.contains(Buttons::RELOAD)
    }

    /// Returns true if every float field is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.client_time.is_finite()
            && self.delta_time.is_finite()
            && self.movement.x.is_finite()
            && self.movement.y.is_finite()
            && self.vertical_input.is_finite()
            && self.view_angles.is_finite()
    }
}
