//! # Movement Integration
//!
//! One function, [`integrate`], moves a player for one command. Server and
//! client both call it, so it must stay a pure function of its inputs.
//!
//! Order per step:
//! 1. accelerate horizontal velocity toward the wish velocity
//! 2. friction when grounded with no input
//! 3. jump (only from the ground)
//! 4. gravity, capped at terminal speed
//! 5. `move_with_collision`; blocked downward motion means grounded

use serde::Deserialize;
use tracer_shared::{Vec3, ViewAngles};

use crate::command::Command;
use crate::config::invalid;
use crate::error::ConfigResult;
use crate::integration::{Body, CollisionWorld};
use crate::server::player::PlayerState;

/// Pitch limit, just short of straight up/down.
const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.001;

/// Movement tuning shared by simulation and prediction.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MovementConfig {
    /// Top ground speed, units per second.
    pub walk_speed: f32,
    /// Top speed while crouched.
    pub crouch_speed: f32,
    /// Fraction of the wish velocity gap closed per second on the ground.
    pub ground_acceleration: f32,
    /// Same, in the air.
    pub air_acceleration: f32,
    /// Velocity decay per second on the ground without input.
    pub friction: f32,
    /// Downward acceleration.
    pub gravity: f32,
    /// Initial upward speed of a jump.
    pub jump_velocity: f32,
    /// Terminal fall speed.
    pub max_fall_speed: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: 5.0,
            crouch_speed: 2.5,
            ground_acceleration: 10.0,
            air_acceleration: 2.0,
            friction: 6.0,
            gravity: 9.8,
            jump_velocity: 4.5,
            max_fall_speed: 50.0,
        }
    }
}

impl MovementConfig {
    /// Highest horizontal speed input can produce.
    #[must_use]
    pub fn speed_budget(&self) -> f32 {
        self.walk_speed.max(self.crouch_speed)
    }

    /// Checks every value is usable.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("movement.walk_speed", self.walk_speed),
            ("movement.crouch_speed", self.crouch_speed),
            ("movement.ground_acceleration", self.ground_acceleration),
            ("movement.air_acceleration", self.air_acceleration),
            ("movement.max_fall_speed", self.max_fall_speed),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, "must be positive"));
            }
        }
        let non_negative = [
            ("movement.friction", self.friction),
            ("movement.gravity", self.gravity),
            ("movement.jump_velocity", self.jump_velocity),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(field, "must not be negative"));
            }
        }
        Ok(())
    }
}

/// Applies one command's movement to `state`.
pub fn integrate(state: &mut PlayerState, command: &Command, config: &MovementConfig, world: &dyn CollisionWorld) {
    let dt = command.delta_time;

    state.view_angles = ViewAngles::new(
        command.view_angles.pitch.clamp(-MAX_PITCH, MAX_PITCH),
        command.view_angles.yaw,
        command.view_angles.roll,
    );
    state.is_crouching = command.wants_crouch();

    // Analog input above unit length is accepted at admission but not rewarded
    let mut input = command.movement;
    let input_len = input.length();
    if input_len > 1.0 {
        input = tracer_shared::Vec2::new(input.x / input_len, input.y / input_len);
    }

    let (forward, right) = state.view_angles.movement_basis();
    let max_speed = if state.is_crouching { config.crouch_speed } else { config.walk_speed };
    let wish = (forward * input.y + right * input.x) * max_speed;

    let mut horizontal = state.velocity.horizontal();
    if state.is_grounded && input_len <= f32::EPSILON {
        horizontal = horizontal * (1.0 - config.friction * dt).max(0.0);
    } else {
        let accel = if state.is_grounded { config.ground_acceleration } else { config.air_acceleration };
        horizontal = horizontal.lerp(wish, (accel * dt).min(1.0));
    }

    let mut vertical = state.velocity.y;
    if state.is_grounded && command.wants_jump() && !state.is_crouching {
        vertical = config.jump_velocity;
        state.is_grounded = false;
    }
    vertical = (vertical - config.gravity * dt).max(-config.max_fall_speed);

    let velocity = Vec3::new(horizontal.x, vertical, horizontal.z);
    let desired = velocity * dt;
    let actual = world.move_with_collision(&Body::player(state.position), desired);

    state.position += actual;
    state.velocity = velocity;

    // Blocked downward motion means something is underfoot
    state.is_grounded = desired.y < 0.0 && actual.y > desired.y;
    if state.is_grounded || (desired.y > 0.0 && actual.y < desired.y) {
        state.velocity.y = 0.0;
    }
    if desired.x != 0.0 && actual.x == 0.0 {
        state.velocity.x = 0.0;
    }
    if desired.z != 0.0 && actual.z == 0.0 {
        state.velocity.z = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Buttons;
    use crate::integration::{EmptyWorld, FlatArena};
    use tracer_shared::Vec2;

    const DT: f32 = 1.0 / 64.0;

    fn forward_command(seq: u32) -> Command {
        Command::new(1, seq, seq, DT).with_movement(Vec2::new(0.0, 1.0))
    }

    #[test]
    fn test_walk_accelerates_toward_top_speed() {
        let arena = FlatArena::new(0.0);
        let config = MovementConfig::default();
        let mut state = PlayerState::default();

        for seq in 1..=256 {
            integrate(&mut state, &forward_command(seq), &config, &arena);
        }

        // Yaw zero looks down -Z
        assert!(state.position.z < -10.0);
        assert!(state.velocity.horizontal().length() <= config.walk_speed + 1e-4);
        assert!(state.is_grounded);
        assert_eq!(state.position.y, 0.0);
    }

    #[test]
    fn test_friction_stops_idle_player() {
        let arena = FlatArena::new(0.0);
        let config = MovementConfig::default();
        let mut state = PlayerState {
            velocity: Vec3::new(4.0, 0.0, 0.0),
            ..PlayerState::default()
        };
        for seq in 1..=128 {
            integrate(&mut state, &Command::new(1, seq, seq, DT), &config, &arena);
        }
        assert!(state.velocity.horizontal().length() < 0.01);
    }

    #[test]
    fn test_jump_requires_ground() {
        let arena = FlatArena::new(0.0);
        let config = MovementConfig::default();
        let mut state = PlayerState::default();

        let jump = Command::new(1, 1, 1, DT).with_button(Buttons::JUMP);
        integrate(&mut state, &jump, &config, &arena);
        assert!(!state.is_grounded);
        assert!(state.position.y > 0.0);

        // Holding jump mid-air does not add height
        let vy = state.velocity.y;
        integrate(&mut state, &Command::new(1, 2, 2, DT).with_button(Buttons::JUMP), &config, &arena);
        assert!(state.velocity.y < vy);

        for seq in 3..200 {
            integrate(&mut state, &Command::new(1, seq, seq, DT), &config, &arena);
        }
        assert!(state.is_grounded);
        assert_eq!(state.position.y, 0.0);
    }

    #[test]
    fn test_free_fall_is_capped() {
        let config = MovementConfig::default();
        let mut state = PlayerState {
            is_grounded: false,
            ..PlayerState::default()
        };
        for seq in 1..2000 {
            integrate(&mut state, &Command::new(1, seq, seq, DT), &config, &EmptyWorld);
        }
        assert!((state.velocity.y + config.max_fall_speed).abs() < 1e-3);
    }

    #[test]
    fn test_integration_is_deterministic() {
        let arena = FlatArena::open(20.0);
        let config = MovementConfig::default();
        let run = || {
            let mut state = PlayerState::default();
            for seq in 1..300 {
                let cmd = forward_command(seq).with_view(ViewAngles::new(0.0, seq as f32 * 0.01, 0.0));
                integrate(&mut state, &cmd, &config, &arena);
            }
            state
        };
        assert_eq!(run(), run());
    }
}
