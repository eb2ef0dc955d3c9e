//! # TRACER Server
//!
//! Host-facing facade over the authoritative core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      NETCODE SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Receive path │  │ Tick Clock   │  │ on_tick      │       │
//! │  │ (any thread) │  │ (64Hz)       │  │ callbacks    │       │
//! │  └──────┬───────┘  └──────┬───────┘  └──────▲───────┘       │
//! │         │ submit          │ TickEvent       │ &WorldSnapshot│
//! │  ┌──────▼───────┐  ┌──────▼───────────────────────┐         │
//! │  │CommandBuffer │──│ Simulation (player table,     │         │
//! │  └──────────────┘  │ snapshot store, compensator) │         │
//! │  lifecycle chan ──▶└──────────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the [`CommandBuffer`] and the lifecycle channel are shared with other
//! threads. Everything else is owned by whoever calls [`NetcodeServer::update`].

pub mod commands;
pub mod player;
pub mod tick;

pub use commands::CommandBuffer;
pub use player::{NetworkPlayer, PlayerState};
pub use tick::{TickClock, TickEvent, TickPacer, TickStats};

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{trace, warn};

use crate::anti_cheat::RejectReason;
use crate::command::Command;
use crate::config::NetcodeConfig;
use crate::error::NetcodeResult;
use crate::integration::{CollisionWorld, SimEvent};
use crate::simulation::Simulation;
use crate::snapshot::WorldSnapshot;
use crate::PlayerId;

/// Connection lifecycle request from the reliable channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A player joined.
    Connect {
        /// Player id assigned by the transport.
        id: PlayerId,
        /// Display name.
        name: String,
    },
    /// A player left.
    Disconnect {
        /// Player id.
        id: PlayerId,
    },
}

type TickCallback = Box<dyn FnMut(&WorldSnapshot) + Send>;

/// The authoritative server.
///
/// One instance per match. The host owns it and drives it with
/// [`Self::update`]; nothing here is global.
pub struct NetcodeServer {
    clock: TickClock,
    simulation: Simulation,
    commands: Arc<CommandBuffer>,
    world: Box<dyn CollisionWorld>,
    lifecycle_tx: Sender<LifecycleEvent>,
    lifecycle_rx: Receiver<LifecycleEvent>,
    callbacks: Vec<TickCallback>,
}

impl NetcodeServer {
    /// Creates a server over `world`.
    #[must_use]
    pub fn new(config: NetcodeConfig, world: impl CollisionWorld + 'static) -> Self {
        let (lifecycle_tx, lifecycle_rx) = unbounded();
        Self {
            clock: TickClock::new(config.tick_rate),
            commands: Arc::new(CommandBuffer::from_config(&config)),
            simulation: Simulation::new(config),
            world: Box::new(world),
            lifecycle_tx,
            lifecycle_rx,
            callbacks: Vec::new(),
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Adds a player immediately.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate id or a full server.
    pub fn connect(&mut self, id: PlayerId, name: impl Into<String>) -> NetcodeResult<()> {
        self.simulation.connect(id, name)?;
        self.commands.register(id);
        Ok(())
    }

    /// Removes a player immediately and drops their queued commands.
    ///
    /// # Errors
    ///
    /// Fails if no such player is live.
    pub fn disconnect(&mut self, id: PlayerId) -> NetcodeResult<()> {
        self.commands.unregister(id);
        self.simulation.disconnect(id)
    }

    /// Sender for lifecycle requests; applied at the start of the next tick.
    #[must_use]
    pub fn lifecycle_sender(&self) -> Sender<LifecycleEvent> {
        self.lifecycle_tx.clone()
    }

    fn apply_lifecycle(&mut self) {
        while let Ok(event) = self.lifecycle_rx.try_recv() {
            let result = match event {
                LifecycleEvent::Connect { id, name } => self.connect(id, name),
                LifecycleEvent::Disconnect { id } => self.disconnect(id),
            };
            if let Err(err) = result {
                warn!(%err, "lifecycle request ignored");
            }
        }
    }

    /// Updates a player's measured round-trip latency.
    ///
    /// # Errors
    ///
    /// Fails if no such player is live.
    pub fn set_player_latency(&mut self, id: PlayerId, latency_ms: f64) -> NetcodeResult<()> {
        self.simulation.set_latency(id, latency_ms)
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Queues a command from `player_id`.
    ///
    /// # Errors
    ///
    /// Returns why the command was refused; the refusal also counts against
    /// the player at the next tick.
    pub fn submit_command(&self, player_id: PlayerId, command: Command) -> Result<(), RejectReason> {
        self.commands.submit(player_id, command)
    }

    /// Shared handle to the command buffer for the receive thread.
    #[must_use]
    pub fn command_sink(&self) -> Arc<CommandBuffer> {
        Arc::clone(&self.commands)
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Registers a callback run with each new snapshot.
    pub fn on_tick(&mut self, callback: impl FnMut(&WorldSnapshot) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Advances real time by `elapsed` and runs every tick that falls due.
    ///
    /// Returns the number of ticks run.
    pub fn update(&mut self, elapsed: Duration) -> u32 {
        let mut due = Vec::new();
        let fired = self.clock.advance(elapsed, |event| due.push(event));
        for event in due {
            self.step(event);
        }
        fired
    }

    fn step(&mut self, event: TickEvent) {
        self.apply_lifecycle();
        self.simulation.run_tick(event, &self.commands, self.world.as_ref());

        if let Some(snapshot) = self.simulation.latest_snapshot() {
            for callback in &mut self.callbacks {
                callback(snapshot);
            }
        }
        trace!(tick = event.tick, "tick complete");
    }

    /// Copy of the most recent snapshot, or an empty one before the first tick.
    #[must_use]
    pub fn latest_world_state(&self) -> WorldSnapshot {
        self.simulation
            .latest_snapshot()
            .cloned()
            .unwrap_or_else(|| WorldSnapshot::new(self.clock.current_tick(), self.clock.server_time()))
    }

    // =========================================================================
    // EVENTS AND ACCESS
    // =========================================================================

    /// Takes every pending outbound event.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.simulation.drain_events()
    }

    /// Subscribes to outbound events. While subscribed, events are no
    /// longer queued for [`NetcodeServer::drain_events`].
    pub fn subscribe(&mut self) -> Receiver<SimEvent> {
        self.simulation.subscribe()
    }

    /// The tick clock.
    #[must_use]
    pub const fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// The simulation.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// The collision world.
    #[must_use]
    pub fn world(&self) -> &dyn CollisionWorld {
        self.world.as_ref()
    }
}
