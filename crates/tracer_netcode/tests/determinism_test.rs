//! # Determinism Integration Test
//!
//! Two servers fed the same commands must write bit-identical snapshots,
//! hits and deaths included, and the history must stay bounded.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracer_netcode::{
    Buttons, Command, CommandBuffer, FlatArena, NetcodeConfig, PlayerId, SimEvent, Simulation, TickEvent,
    WorldSnapshot,
};
use tracer_shared::{Vec2, ViewAngles};

const DT: f32 = 1.0 / 64.0;
const PLAYERS: [PlayerId; 4] = [3, 7, 11, 19];
const TICKS: u32 = 300;

/// Random but valid input for every player on every tick.
fn scripted_commands(seed: u64) -> Vec<Vec<Command>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (1..=TICKS)
        .map(|n| {
            PLAYERS
                .iter()
                .map(|&id| {
                    let mut command = Command::new(id, n, n, DT)
                        .with_movement(Vec2::new(rng.gen_range(-0.7..0.7), rng.gen_range(-0.7..0.7)))
                        .with_view(ViewAngles::new(rng.gen_range(-0.3..0.3), rng.gen_range(-3.0..3.0), 0.0));
                    if rng.gen_bool(0.4) {
                        command = command.with_button(Buttons::FIRE);
                    }
                    if rng.gen_bool(0.05) {
                        command = command.with_button(Buttons::JUMP);
                    }
                    if rng.gen_bool(0.02) {
                        command = command.with_weapon_slot(rng.gen_range(0..3));
                    }
                    command
                })
                .collect()
        })
        .collect()
}

struct Run {
    snapshots: Vec<WorldSnapshot>,
    events: Vec<SimEvent>,
    sim: Simulation,
}

fn run(commands: &[Vec<Command>]) -> Run {
    let mut config = NetcodeConfig::default();
    config.spawn_points = vec![
        tracer_shared::Vec3::new(0.0, 0.0, 0.0),
        tracer_shared::Vec3::new(4.0, 0.0, -4.0),
        tracer_shared::Vec3::new(-4.0, 0.0, -4.0),
        tracer_shared::Vec3::new(0.0, 0.0, -8.0),
    ];
    let buffer = CommandBuffer::from_config(&config);
    let mut sim = Simulation::new(config);
    for id in PLAYERS {
        sim.connect(id, format!("p{id}")).unwrap();
        buffer.register(id);
        sim.set_latency(id, f64::from(id) * 10.0).unwrap();
    }
    let arena = FlatArena::open(20.0);

    let mut snapshots = Vec::new();
    let mut events = Vec::new();
    for (n, batch) in (1..=TICKS).zip(commands) {
        for command in batch {
            buffer.submit(command.player_id, *command).unwrap();
        }
        sim.run_tick(
            TickEvent {
                tick: n,
                server_time: f64::from(n) * f64::from(DT),
            },
            &buffer,
            &arena,
        );
        snapshots.push(sim.latest_snapshot().cloned().unwrap());
        events.extend(sim.drain_events());
    }
    Run { snapshots, events, sim }
}

fn position_bits(snapshot: &WorldSnapshot) -> Vec<[u32; 3]> {
    snapshot
        .players
        .values()
        .map(|p| [p.position.x.to_bits(), p.position.y.to_bits(), p.position.z.to_bits()])
        .collect()
}

#[test]
fn test_identical_inputs_identical_worlds() {
    let commands = scripted_commands(0xC0FFEE);
    let a = run(&commands);
    let b = run(&commands);

    assert_eq!(a.snapshots.len(), TICKS as usize);
    for (left, right) in a.snapshots.iter().zip(&b.snapshots) {
        assert_eq!(left, right, "snapshots differ at tick {}", left.tick);
        assert_eq!(position_bits(left), position_bits(right));
    }
    assert_eq!(a.events, b.events);

    // The script is violent enough to exercise the hit path
    assert!(a.events.iter().any(|e| matches!(e, SimEvent::PlayerHit { .. })));
}

#[test]
fn test_different_inputs_diverge() {
    let a = run(&scripted_commands(1));
    let b = run(&scripted_commands(2));
    assert_ne!(a.snapshots.last(), b.snapshots.last());
}

#[test]
fn test_history_stays_within_window() {
    let a = run(&scripted_commands(9));
    let store = a.sim.store();
    let capacity = a.sim.config().snapshot_capacity;

    assert_eq!(store.len(), capacity);
    assert_eq!(store.oldest_tick(), Some(TICKS - capacity as u32 + 1));
    assert!(store.get(TICKS - capacity as u32).is_none());
    assert_eq!(store.get(TICKS).map(|s| s.tick), Some(TICKS));
    // Every player appears in every snapshot
    assert!(store.iter().all(|s| s.len() == PLAYERS.len()));
}
