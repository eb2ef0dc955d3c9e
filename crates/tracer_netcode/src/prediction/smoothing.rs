//! # Visual Smoothing
//!
//! Two kinds of motion smoothing for the client:
//!
//! - **Logical position**: where the entity IS according to the simulation
//!   (collision, replay, what gets sent)
//! - **Visual position**: where the entity APPEARS on screen
//!
//! [`CorrectionSmoother`] blends away a reconciliation correction on the
//! local player, so a small error glides instead of teleporting.
//! [`RemoteInterpolator`] moves a remote player toward its latest
//! authoritative position. Remote players are never predicted.
//!
//! ```text
//! correction:  visual = logical + offset * (1 - curve(progress))
//! remote:      shown += (target - shown) * (1 - e^(-rate * dt))
//! ```

use serde::Deserialize;
use tracer_shared::Vec3;

/// Offsets smaller than this are not worth blending.
const MIN_CORRECTION: f32 = 0.001;

/// Blend curve for corrections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Instant snap.
    Snap,
    /// Linear blend.
    Linear,
    /// Fast start, slow finish: `1 - (1-t)^2`.
    #[default]
    EaseOut,
    /// S-curve: `3t^2 - 2t^3`.
    SmoothStep,
}

impl BlendMode {
    fn curve(self, t: f32) -> f32 {
        match self {
            Self::Snap => 1.0,
            Self::Linear => t,
            Self::EaseOut => {
                let inv = 1.0 - t;
                1.0 - inv * inv
            }
            Self::SmoothStep => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Blends a local correction over a fixed time.
#[derive(Clone, Debug)]
pub struct CorrectionSmoother {
    blend_time_ms: f32,
    mode: BlendMode,
    /// 0.0 = correction just started, 1.0 = done.
    progress: f32,
    /// Old logical minus new logical.
    offset: Vec3,
    total_corrections: u32,
}

impl CorrectionSmoother {
    /// Creates an idle smoother.
    #[must_use]
    pub fn new(blend_time_ms: f32, mode: BlendMode) -> Self {
        Self {
            blend_time_ms: blend_time_ms.max(f32::EPSILON),
            mode,
            progress: 1.0,
            offset: Vec3::ZERO,
            total_corrections: 0,
        }
    }

    /// Starts blending from `old_logical` to `new_logical`.
    ///
    /// Any offset still being blended is carried into the new one, so two
    /// corrections in quick succession do not jump.
    pub fn start_correction(&mut self, old_logical: Vec3, new_logical: Vec3) {
        let offset = self.remaining_offset() + (old_logical - new_logical);
        if offset.length() > MIN_CORRECTION {
            self.offset = offset;
            self.progress = 0.0;
            self.total_corrections += 1;
        } else {
            self.cancel();
        }
    }

    /// Advances the blend. Call once per frame.
    pub fn update(&mut self, dt_ms: f32) {
        if self.progress < 1.0 {
            self.progress += dt_ms / self.blend_time_ms;
            if self.progress >= 1.0 {
                self.cancel();
            }
        }
    }

    fn remaining_offset(&self) -> Vec3 {
        if self.progress >= 1.0 {
            return Vec3::ZERO;
        }
        self.offset * (1.0 - self.mode.curve(self.progress))
    }

    /// Where to draw an entity whose logical position is `logical`.
    #[must_use]
    pub fn visual_position(&self, logical: Vec3) -> Vec3 {
        logical + self.remaining_offset()
    }

    /// Returns true while a correction is being blended.
    #[must_use]
    pub fn is_correcting(&self) -> bool {
        self.progress < 1.0
    }

    /// Blend progress in `[0, 1]`.
    #[must_use]
    pub const fn progress(&self) -> f32 {
        self.progress
    }

    /// Corrections started so far.
    #[must_use]
    pub const fn total_corrections(&self) -> u32 {
        self.total_corrections
    }

    /// Drops any blend in progress.
    pub fn cancel(&mut self) {
        self.progress = 1.0;
        self.offset = Vec3::ZERO;
    }
}

/// Exponential approach toward the latest authoritative position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemoteInterpolator {
    shown: Vec3,
    target: Vec3,
}

impl RemoteInterpolator {
    /// Starts at `position` with nothing to approach.
    #[must_use]
    pub const fn new(position: Vec3) -> Self {
        Self {
            shown: position,
            target: position,
        }
    }

    /// Sets a new authoritative target.
    ///
    /// Jumps straight there when the gap exceeds `teleport_distance`
    /// (respawns, teleports).
    pub fn set_target(&mut self, target: Vec3, teleport_distance: f32) {
        self.target = target;
        if self.shown.distance(target) > teleport_distance {
            self.shown = target;
        }
    }

    /// Moves toward the target. Never overshoots.
    pub fn advance(&mut self, dt_secs: f32, rate: f32, snap_epsilon: f32) {
        let factor = (1.0 - (-rate * dt_secs.max(0.0)).exp()).clamp(0.0, 1.0);
        self.shown = self.shown.lerp(self.target, factor);
        if self.shown.distance(self.target) <= snap_epsilon {
            self.shown = self.target;
        }
    }

    /// Position to draw.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.shown
    }

    /// Latest authoritative position.
    #[must_use]
    pub const fn target(&self) -> Vec3 {
        self.target
    }
}
