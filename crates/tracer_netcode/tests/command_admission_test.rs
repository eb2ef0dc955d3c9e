//! # Command Admission Integration Test
//!
//! Whatever order commands arrive in, a player's queue only ever holds
//! strictly increasing sequence numbers, and the queue stays bounded.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracer_netcode::{
    Command, CommandBuffer, FlatArena, NetcodeConfig, RejectReason, SimEvent, Simulation, TickEvent, TickRing,
    ViolationKind,
};

const DT: f32 = 1.0 / 64.0;

fn buffer() -> CommandBuffer {
    let buffer = CommandBuffer::from_config(&NetcodeConfig::default());
    buffer.register(1);
    buffer
}

fn command(sequence: u32) -> Command {
    Command::new(1, sequence, sequence, DT)
}

#[test]
fn test_sequence_five_after_six_is_rejected() {
    let buffer = buffer();
    buffer.submit(1, command(6)).unwrap();
    assert_eq!(
        buffer.submit(1, command(5)),
        Err(RejectReason::StaleSequence {
            received: 5,
            last_accepted: 6,
        })
    );
    assert_eq!(buffer.submit(1, command(6)).unwrap_err().kind(), ViolationKind::Replay);
    assert_eq!(buffer.pending(1), 1);
    assert_eq!(buffer.take_rejections().len(), 2);
}

#[test]
fn test_any_arrival_order_keeps_queue_increasing() {
    for seed in 0..50 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut order: Vec<u32> = (1..=30).collect();
        order.shuffle(&mut rng);

        let buffer = buffer();
        let mut best = 0;
        let mut expected = Vec::new();
        for &sequence in &order {
            let accepted = buffer.submit(1, command(sequence)).is_ok();
            // Accepted exactly when it beats everything before it
            assert_eq!(accepted, sequence > best, "seed {seed}, order {order:?}");
            if accepted {
                best = sequence;
                expected.push(sequence);
            }
        }

        let drained: Vec<u32> = buffer.drain(1).iter().map(|c| c.sequence_number).collect();
        assert_eq!(drained, expected);
        assert!(drained.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_flood_keeps_newest_commands() {
    let config = NetcodeConfig::default();
    let buffer = buffer();
    for sequence in 1..=40 {
        buffer.submit(1, command(sequence)).unwrap();
    }
    assert_eq!(buffer.pending(1), config.max_queued_commands);
    assert_eq!(buffer.overflowed(1), 8);

    let drained = buffer.drain_capped(1, config.max_commands_per_tick);
    let sequences: Vec<u32> = drained.iter().map(|c| c.sequence_number).collect();
    assert_eq!(sequences, vec![9, 10, 11]);
}

#[test]
fn test_rejections_are_charged_at_the_next_tick() {
    let config = NetcodeConfig::default();
    let buffer = CommandBuffer::from_config(&config);
    let mut sim = Simulation::new(config);
    sim.connect(1, "replayer").unwrap();
    buffer.register(1);

    buffer.submit(1, command(6)).unwrap();
    assert!(buffer.submit(1, command(5)).is_err());
    sim.drain_events();
    sim.run_tick(
        TickEvent {
            tick: 1,
            server_time: f64::from(DT),
        },
        &buffer,
        &FlatArena::open(50.0),
    );

    let events = sim.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        SimEvent::ViolationRecorded {
            player: 1,
            kind: ViolationKind::Replay,
            total: 1,
        }
    )));
    assert_eq!(sim.player(1).map(|p| p.last_sequence), Some(6));
    assert_eq!(sim.player(1).map(|p| p.violations.count(ViolationKind::Replay)), Some(1));
}

#[test]
fn test_tick_ring_never_exceeds_capacity() {
    let mut ring = TickRing::new(16);
    for tick in 1..=100u32 {
        ring.insert(tick, tick * 2);
        assert!(ring.len() <= 16);
    }
    assert_eq!(ring.len(), 16);
    assert_eq!(ring.oldest_tick(), Some(85));
    assert_eq!(ring.get(84), None);
    assert_eq!(ring.get(100), Some(&200));

    // Skipping ahead clears the skipped slots
    ring.insert(110, 220);
    assert_eq!(ring.get(94), None);
    assert_eq!(ring.get(95), Some(&190));
    assert!(ring.len() <= 16);
}
