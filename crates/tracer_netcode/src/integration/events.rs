//! # Outbound Events
//!
//! Everything the simulation wants the outside world to know about. Events
//! are queued during a tick and can be polled with [`EventQueue::drain`]
//! or pushed to subscribers over crossbeam channels.

use crossbeam_channel::{Receiver, Sender};
use tracer_shared::Vec3;

use crate::anti_cheat::ViolationKind;
use crate::PlayerId;

/// Why a player left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The host reported the connection closed.
    Left,
    /// Removed for reaching the violation threshold.
    Kicked,
}

/// Events emitted by the simulation.
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    /// A player joined.
    PlayerConnected {
        /// Who.
        player: PlayerId,
        /// Display name.
        name: String,
    },

    /// A player left or was removed.
    PlayerDisconnected {
        /// Who.
        player: PlayerId,
        /// Why.
        reason: DisconnectReason,
    },

    /// A pellet hit a player.
    PlayerHit {
        /// Tick the shot was processed.
        tick: u32,
        /// Who fired.
        shooter: PlayerId,
        /// Who was hit.
        target: PlayerId,
        /// Damage dealt.
        damage: f32,
        /// Impact point in the rewound world.
        point: Vec3,
        /// Tick the world was rewound to, `None` for an immediate hit-test.
        rewound_to: Option<u32>,
    },

    /// A player's health reached zero.
    PlayerKilled {
        /// Tick of the kill.
        tick: u32,
        /// Who fired the killing shot.
        killer: PlayerId,
        /// Who died.
        victim: PlayerId,
    },

    /// A dead player came back.
    PlayerRespawned {
        /// Who.
        player: PlayerId,
        /// Spawn position.
        position: Vec3,
    },

    /// An anti-cheat check failed.
    ViolationRecorded {
        /// Offender.
        player: PlayerId,
        /// Which check.
        kind: ViolationKind,
        /// Total violations so far.
        total: u32,
    },

    /// A player reached the violation threshold and is being removed.
    PlayerKicked {
        /// Offender.
        player: PlayerId,
        /// Violations at the time of the kick.
        violations: u32,
    },
}

/// Outbound events, either polled or pushed to channel subscribers.
///
/// While any subscriber is live, events go only to subscribers and nothing
/// accumulates for polling. With none, events wait in the queue until
/// drained.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Vec<SimEvent>,
    subscribers: Vec<Sender<SimEvent>>,
}

impl EventQueue {
    /// Empty queue with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwards an event to live subscribers, or queues it if there are none.
    ///
    /// Subscribers whose receiver was dropped are forgotten.
    pub fn push(&mut self, event: SimEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if self.subscribers.is_empty() {
            self.pending.push(event);
        }
    }

    /// Takes every pending event in emission order.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Opens a subscription that receives every event pushed from now on.
    ///
    /// Events already pending stay queued for [`EventQueue::drain`].
    pub fn subscribe(&mut self) -> Receiver<SimEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
