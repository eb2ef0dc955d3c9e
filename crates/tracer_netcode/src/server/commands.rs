//! # Command Buffer
//!
//! Per-player inbound command queues. This is the only structure written
//! from the receive path and read from the tick thread, so everything sits
//! behind one short-lived lock.
//!
//! Admission runs the anti-cheat checks before a command is queued.
//! Rejected commands are dropped and remembered so the tick thread can
//! charge them to the sender's violation ledger.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::anti_cheat::{AdmissionHistory, AntiCheat, RejectReason};
use crate::command::Command;
use crate::config::NetcodeConfig;
use crate::PlayerId;

#[derive(Debug, Default)]
struct Inbox {
    queue: VecDeque<Command>,
    history: AdmissionHistory,
    overflowed: u64,
}

#[derive(Debug, Default)]
struct BufferState {
    inboxes: HashMap<PlayerId, Inbox>,
    rejections: Vec<(PlayerId, RejectReason)>,
}

/// Bounded per-player command queues with admission control.
#[derive(Debug)]
pub struct CommandBuffer {
    state: Mutex<BufferState>,
    validator: AntiCheat,
    max_queued: usize,
}

impl CommandBuffer {
    /// Creates a buffer holding at most `max_queued` commands per player.
    #[must_use]
    pub fn new(validator: AntiCheat, max_queued: usize) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            validator,
            max_queued: max_queued.max(1),
        }
    }

    /// Creates a buffer from the top-level config.
    #[must_use]
    pub fn from_config(config: &NetcodeConfig) -> Self {
        Self::new(
            AntiCheat::new(config.anti_cheat.clone(), config.tick_interval_secs()),
            config.max_queued_commands,
        )
    }

    /// Opens an inbox for a player. Re-registering resets it.
    pub fn register(&self, player_id: PlayerId) {
        self.state.lock().inboxes.insert(player_id, Inbox::default());
    }

    /// Closes a player's inbox and drops anything still queued.
    ///
    /// Returns the number of commands dropped.
    pub fn unregister(&self, player_id: PlayerId) -> usize {
        let mut state = self.state.lock();
        state.rejections.retain(|(id, _)| *id != player_id);
        state.inboxes.remove(&player_id).map_or(0, |inbox| inbox.queue.len())
    }

    /// Validates and enqueues a command from `player_id`.
    ///
    /// The owner is taken from the connection, never from the command. If
    /// the inbox is full the oldest queued command is dropped.
    ///
    /// # Errors
    ///
    /// Returns why the command was refused. Refusals from registered
    /// players are also recorded for [`Self::take_rejections`].
    pub fn submit(&self, player_id: PlayerId, mut command: Command) -> Result<(), RejectReason> {
        command.player_id = player_id;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(inbox) = state.inboxes.get_mut(&player_id) else {
            return Err(RejectReason::UnknownPlayer);
        };

        if let Err(reason) = self.validator.check_admission(&command, &inbox.history) {
            debug!(player = player_id, seq = command.sequence_number, %reason, "command rejected");
            state.rejections.push((player_id, reason));
            return Err(reason);
        }

        inbox.history = AdmissionHistory {
            last_sequence: Some(command.sequence_number),
            last_client_time: Some(command.client_time),
        };
        if inbox.queue.len() >= self.max_queued {
            inbox.queue.pop_front();
            inbox.overflowed += 1;
            trace!(player = player_id, "inbox full, dropped oldest command");
        }
        inbox.queue.push_back(command);
        Ok(())
    }

    /// Removes and returns everything queued for a player, in arrival order.
    pub fn drain(&self, player_id: PlayerId) -> Vec<Command> {
        self.state
            .lock()
            .inboxes
            .get_mut(&player_id)
            .map(|inbox| inbox.queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Removes and returns at most `max` of the oldest queued commands.
    pub fn drain_capped(&self, player_id: PlayerId, max: usize) -> Vec<Command> {
        self.state
            .lock()
            .inboxes
            .get_mut(&player_id)
            .map(|inbox| {
                let n = inbox.queue.len().min(max);
                inbox.queue.drain(..n).collect()
            })
            .unwrap_or_default()
    }

    /// Takes the admission rejections recorded since the last call.
    pub fn take_rejections(&self) -> Vec<(PlayerId, RejectReason)> {
        std::mem::take(&mut self.state.lock().rejections)
    }

    /// Commands waiting for a player.
    #[must_use]
    pub fn pending(&self, player_id: PlayerId) -> usize {
        self.state
            .lock()
            .inboxes
            .get(&player_id)
            .map_or(0, |inbox| inbox.queue.len())
    }

    /// Commands dropped because a player's inbox was full.
    #[must_use]
    pub fn overflowed(&self, player_id: PlayerId) -> u64 {
        self.state
            .lock()
            .inboxes
            .get(&player_id)
            .map_or(0, |inbox| inbox.overflowed)
    }

    /// Returns true if the player has an inbox.
    #[must_use]
    pub fn is_registered(&self, player_id: PlayerId) -> bool {
        self.state.lock().inboxes.contains_key(&player_id)
    }
}
