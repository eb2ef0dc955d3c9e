//! # TRACER Headless Server
//!
//! Runs the authoritative tick loop against a flat arena with scripted
//! bots. Bot commands go through the wire codec exactly as a real client's
//! would, and every snapshot is chunked and encoded for broadcast.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --features server --bin tracer_server -- \
//!     --config config/server.toml --bots 8 --duration 30
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracer_netcode::protocol::{
    decode, CommandRecord, Packet, PacketHeader, PacketSerializer, SnapshotChunk,
};
use tracer_netcode::{
    Buttons, Command, CommandBuffer, FlatArena, NetcodeConfig, NetcodeError, NetcodeServer, PlayerId, SimEvent,
    TickPacer,
};
use tracer_shared::{Vec2, ViewAngles};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

struct Options {
    config: Option<String>,
    bots: u32,
    duration_secs: Option<u64>,
}

fn parse_args() -> Option<Options> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut options = Options {
        config: None,
        bots: 8,
        duration_secs: None,
    };

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--config" | "-c" => {
                options.config = value.cloned();
                i += 1;
            }
            "--bots" | "-b" => {
                options.bots = value.and_then(|v| v.parse().ok()).unwrap_or(options.bots);
                i += 1;
            }
            "--duration" | "-d" => {
                options.duration_secs = value.and_then(|v| v.parse().ok());
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: tracer_server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>     TOML config file (default: built-in)");
                println!("  -b, --bots <NUM>        Scripted bots to connect (default: 8)");
                println!("  -d, --duration <SECS>   Run for N seconds then exit");
                println!("  -h, --help              Show this help");
                return None;
            }
            other => warn!(argument = other, "ignoring unknown argument"),
        }
        i += 1;
    }
    Some(options)
}

fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

// =============================================================================
// SCRIPTED BOTS
// =============================================================================

/// A fake client: circles, turns and fires in bursts.
struct Bot {
    id: PlayerId,
    sequence: u32,
    serializer: PacketSerializer,
}

impl Bot {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            sequence: 0,
            serializer: PacketSerializer::new(),
        }
    }

    /// Encodes the bot's next command. The bot samples one command per
    /// local tick, so its tick counter is its sequence number.
    fn next_datagram(&mut self, dt: f32) -> Result<Vec<u8>, NetcodeError> {
        self.sequence += 1;
        let phase = (self.sequence as f32 * 0.05) + self.id as f32;
        let mut command = Command::new(self.id, self.sequence, self.sequence, dt)
            .with_movement(Vec2::new(phase.cos(), phase.sin()))
            .with_view(ViewAngles::new(0.0, phase * 0.5, 0.0));
        if self.sequence % 32 < 6 {
            command = command.with_button(Buttons::FIRE);
        }
        if self.sequence % 400 == 0 {
            command = command.with_button(Buttons::RELOAD);
        }

        self.serializer
            .serialize_command(&PacketHeader::new(self.sequence), &CommandRecord::from_command(&command))?;
        Ok(self.serializer.as_slice().to_vec())
    }
}

/// Receive path: decode a datagram and queue it for its connection.
fn receive(sink: &CommandBuffer, from: PlayerId, datagram: &[u8]) -> Result<(), NetcodeError> {
    match decode(datagram)? {
        Packet::Command(_, record) => {
            let command = record.to_command(from)?;
            if let Err(reason) = sink.submit(from, command) {
                warn!(player = from, %reason, "command refused");
            }
        }
        other => warn!(player = from, packet = ?other.packet_type(), "unexpected packet"),
    }
    Ok(())
}

// =============================================================================
// MAIN
// =============================================================================

fn run(options: &Options) -> Result<(), NetcodeError> {
    let config = match &options.config {
        Some(path) => NetcodeConfig::load(path)?,
        None => NetcodeConfig::default(),
    };
    let tick_rate = config.tick_rate;
    let dt = config.tick_interval_secs() as f32;

    info!(
        tick_rate,
        max_players = config.max_players,
        snapshot_capacity = config.snapshot_capacity,
        bots = options.bots,
        "starting server"
    );

    let mut server = NetcodeServer::new(config, FlatArena::open(50.0));

    let bytes_out = Arc::new(AtomicU64::new(0));
    let packets_out = Arc::new(AtomicU64::new(0));
    {
        let bytes_out = Arc::clone(&bytes_out);
        let packets_out = Arc::clone(&packets_out);
        let mut serializer = PacketSerializer::new();
        let mut sequence = 0u32;
        server.on_tick(move |snapshot| {
            for chunk in SnapshotChunk::split(snapshot) {
                sequence = sequence.wrapping_add(1);
                match serializer.serialize_snapshot(&PacketHeader::new(sequence), &chunk) {
                    Ok(()) => {
                        bytes_out.fetch_add(serializer.len() as u64, Ordering::Relaxed);
                        packets_out.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => error!(%err, tick = snapshot.tick, "snapshot encode failed"),
                }
            }
        });
    }

    let mut bots = Vec::new();
    for id in 1..=options.bots {
        server.connect(id, format!("bot{id}"))?;
        server.set_player_latency(id, f64::from(id % 4) * 40.0)?;
        bots.push(Bot::new(id));
    }

    let sink = server.command_sink();
    let mut pacer = TickPacer::new(server.clock().interval());
    let stats_interval = u64::from(tick_rate) * 5;
    let mut last_stats_tick = 0u64;
    let mut kills = 0u64;
    let mut kicks = 0u64;
    let start = Instant::now();

    loop {
        if options
            .duration_secs
            .is_some_and(|limit| start.elapsed().as_secs() >= limit)
        {
            break;
        }

        pacer.wait_for_next_tick();
        let elapsed = pacer.take_elapsed();

        for bot in &mut bots {
            let datagram = bot.next_datagram(dt)?;
            if let Err(err) = receive(&sink, bot.id, &datagram) {
                warn!(player = bot.id, %err, "dropped malformed datagram");
            }
        }

        pacer.measure(|| server.update(elapsed));

        for event in server.drain_events() {
            match event {
                SimEvent::PlayerKilled { .. } => kills += 1,
                SimEvent::PlayerKicked { .. } => kicks += 1,
                _ => {}
            }
        }

        let current_tick = u64::from(server.clock().current_tick());
        if current_tick - last_stats_tick >= stats_interval {
            last_stats_tick = current_tick;
            let stats = pacer.stats();
            info!(
                tick = current_tick,
                uptime_secs = start.elapsed().as_secs_f64(),
                players = server.simulation().players().len(),
                avg_tick_us = stats.avg_tick_us,
                late_ticks = stats.late_ticks,
                snapshot_bytes = bytes_out.load(Ordering::Relaxed),
                snapshot_packets = packets_out.load(Ordering::Relaxed),
                kills,
                kicks,
                "server status"
            );
        }
    }

    let stats = pacer.stats();
    info!(
        total_ticks = stats.total_ticks,
        avg_tick_us = stats.avg_tick_us,
        min_tick_us = stats.min_tick_us,
        max_tick_us = stats.max_tick_us,
        late_ticks = stats.late_ticks,
        "server shutdown"
    );
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let Some(options) = parse_args() else {
        return ExitCode::SUCCESS;
    };
    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "server failed");
            ExitCode::FAILURE
        }
    }
}
