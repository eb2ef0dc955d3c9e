//! # Reconciliation Integration Test
//!
//! A predicting client and the authoritative simulation run the same
//! inputs. The client must agree with the server when its start state was
//! right, and converge onto the server's track when it was wrong.

use tracer_netcode::simulation::weapons::WeaponDescriptor;
use tracer_netcode::{
    Buttons, ClientPredictor, Command, CommandBuffer, FlatArena, InputSample, NetcodeConfig, PlayerId, PlayerState,
    PredictorState, ReconcileOutcome, Simulation, TickEvent,
};
use tracer_shared::{Vec2, Vec3, ViewAngles};

const LOCAL: PlayerId = 1;

fn tick(n: u32, config: &NetcodeConfig) -> TickEvent {
    TickEvent {
        tick: n,
        server_time: f64::from(n) * config.tick_interval_secs(),
    }
}

fn inputs() -> Vec<InputSample> {
    (0..10u8)
        .map(|i| InputSample {
            movement: Vec2::new(0.3, 1.0 - f32::from(i) * 0.05),
            view_angles: ViewAngles::new(0.0, 0.2 + f32::from(i) * 0.03, 0.0),
            buttons: if i == 4 { Buttons(Buttons::JUMP) } else { Buttons::NONE },
            ..InputSample::default()
        })
        .collect()
}

fn spawned_at(position: Vec3) -> PlayerState {
    PlayerState::spawned(position, &WeaponDescriptor::default_loadout())
}

/// Server with the local player spawned at the origin.
fn server(config: &NetcodeConfig) -> (Simulation, CommandBuffer) {
    let mut config = config.clone();
    config.spawn_points = vec![Vec3::ZERO];
    let buffer = CommandBuffer::from_config(&config);
    let mut sim = Simulation::new(config);
    sim.connect(LOCAL, "local").unwrap();
    buffer.register(LOCAL);
    (sim, buffer)
}

fn predict_all(predictor: &mut ClientPredictor, arena: &FlatArena) -> Vec<Command> {
    inputs().into_iter().map(|input| predictor.step(input, arena)).collect()
}

#[test]
fn test_matching_prediction_is_accepted() {
    let config = NetcodeConfig::default();
    let arena = FlatArena::open(50.0);
    let (mut sim, buffer) = server(&config);
    let mut client = ClientPredictor::new(LOCAL, spawned_at(Vec3::ZERO), &config);

    for command in predict_all(&mut client, &arena) {
        buffer.submit(LOCAL, command).unwrap();
    }
    assert_eq!(client.pending_frames(), 10);

    // Three commands per tick: the first snapshot acknowledges client tick 3
    sim.run_tick(tick(1, &config), &buffer, &arena);
    let snapshot = sim.latest_snapshot().cloned().unwrap();
    assert_eq!(snapshot.player(LOCAL).map(|p| p.last_client_tick), Some(3));

    let outcome = client.ingest(&snapshot, &arena);
    assert_eq!(outcome, Some(ReconcileOutcome::Accepted { error: 0.0 }));
    assert_eq!(client.last_acknowledged_tick(), Some(3));
    assert_eq!(client.pending_frames(), 7);
    assert!(!client.smoother().is_correcting());
    assert_eq!(client.predictor_state(), PredictorState::Predicting);
}

#[test]
fn test_wrong_start_converges_to_fresh_prediction() {
    let config = NetcodeConfig::default();
    let arena = FlatArena::open(50.0);
    let (mut sim, buffer) = server(&config);

    // Client believes it spawned a metre off
    let mut client = ClientPredictor::new(LOCAL, spawned_at(Vec3::new(1.0, 0.0, 0.0)), &config);
    let mut reference = ClientPredictor::new(LOCAL, spawned_at(Vec3::ZERO), &config);

    for command in predict_all(&mut client, &arena) {
        buffer.submit(LOCAL, command).unwrap();
    }
    predict_all(&mut reference, &arena);

    sim.run_tick(tick(1, &config), &buffer, &arena);
    let snapshot = sim.latest_snapshot().cloned().unwrap();
    match client.ingest(&snapshot, &arena) {
        Some(ReconcileOutcome::Replayed { error, replayed }) => {
            assert!((error - 1.0).abs() < 1e-3, "error {error}");
            assert_eq!(replayed, 7);
        }
        other => panic!("expected a replay, got {other:?}"),
    }

    assert_eq!(client.state(), reference.state());
    // The correction is blended on screen, not snapped
    assert!(client.smoother().is_correcting());
    assert!(client.visual_position().distance(client.state().position) > 0.5);
}

#[test]
fn test_client_tracks_server_over_many_ticks() {
    let config = NetcodeConfig::default();
    let arena = FlatArena::open(50.0);
    let (mut sim, buffer) = server(&config);
    let mut client = ClientPredictor::new(LOCAL, spawned_at(Vec3::new(0.0, 0.0, 2.0)), &config);

    let mut replays = 0;
    for n in 1..=120u32 {
        let input = InputSample {
            movement: Vec2::new((n as f32 * 0.1).sin() * 0.5, 0.8),
            view_angles: ViewAngles::new(0.0, n as f32 * 0.01, 0.0),
            ..InputSample::default()
        };
        let command = client.step(input, &arena);
        buffer.submit(LOCAL, command).unwrap();
        sim.run_tick(tick(n, &config), &buffer, &arena);

        let snapshot = sim.latest_snapshot().cloned().unwrap();
        if let Some(ReconcileOutcome::Replayed { .. }) = client.ingest(&snapshot, &arena) {
            replays += 1;
        }
        let server_position = sim.player(LOCAL).unwrap().state.position;
        assert_eq!(client.state().position, server_position, "diverged at tick {n}");
    }

    // Only the initial offset needed a replay
    assert_eq!(replays, 1);
    assert_eq!(client.pending_frames(), 0);
}

#[test]
fn test_out_of_order_snapshots_are_ignored() {
    let config = NetcodeConfig::default();
    let arena = FlatArena::open(50.0);
    let (mut sim, buffer) = server(&config);
    let mut client = ClientPredictor::new(LOCAL, spawned_at(Vec3::ZERO), &config);

    for command in predict_all(&mut client, &arena) {
        buffer.submit(LOCAL, command).unwrap();
    }
    sim.run_tick(tick(1, &config), &buffer, &arena);
    let older = sim.latest_snapshot().cloned().unwrap();
    sim.run_tick(tick(2, &config), &buffer, &arena);
    let newer = sim.latest_snapshot().cloned().unwrap();

    assert!(matches!(client.ingest(&newer, &arena), Some(ReconcileOutcome::Accepted { .. })));
    assert_eq!(client.ingest(&older, &arena), Some(ReconcileOutcome::Ignored));
    assert_eq!(client.last_acknowledged_tick(), Some(6));
}
