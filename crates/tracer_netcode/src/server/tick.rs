//! # Server Tick Loop
//!
//! Fixed-timestep clock and real-time pacing.
//!
//! ## Design
//!
//! [`TickClock`] is pure bookkeeping: feed it elapsed time, it emits one
//! [`TickEvent`] per whole interval. It never reads the wall clock, so tests
//! and replays drive it with synthetic durations.
//!
//! [`TickPacer`] is the wall-clock half used by the headless server: it
//! sleeps until the next tick is due and records how long each tick took.

use std::time::{Duration, Instant};

use tracing::warn;

/// One authoritative step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickEvent {
    /// Tick number, starting at 1.
    pub tick: u32,
    /// `tick * interval`, in seconds.
    pub server_time: f64,
}

/// Fixed-timestep accumulator.
#[derive(Clone, Debug)]
pub struct TickClock {
    interval: Duration,
    accumulator: Duration,
    tick: u32,
}

impl TickClock {
    /// Creates a clock running at `tick_rate` Hz.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        Self {
            interval: Duration::from_nanos(1_000_000_000 / u64::from(tick_rate.max(1))),
            accumulator: Duration::ZERO,
            tick: 0,
        }
    }

    /// Adds `elapsed` and emits one event per whole interval accumulated.
    ///
    /// Catch-up ticks are full independent steps. Returns the number of
    /// ticks emitted.
    pub fn advance(&mut self, elapsed: Duration, mut on_tick: impl FnMut(TickEvent)) -> u32 {
        self.accumulator += elapsed;
        let mut fired = 0;
        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            self.tick = self.tick.wrapping_add(1);
            fired += 1;
            on_tick(TickEvent {
                tick: self.tick,
                server_time: self.server_time(),
            });
        }
        fired
    }

    /// Last tick emitted.
    #[must_use]
    pub const fn current_tick(&self) -> u32 {
        self.tick
    }

    /// `current_tick * interval`, in seconds.
    #[must_use]
    pub fn server_time(&self) -> f64 {
        f64::from(self.tick) * self.interval.as_secs_f64()
    }

    /// Tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick interval in milliseconds.
    #[must_use]
    pub fn interval_ms(&self) -> f64 {
        self.interval.as_secs_f64() * 1000.0
    }

    /// Whole ticks covering `latency_ms`, rounded up.
    #[must_use]
    pub fn latency_to_ticks(&self, latency_ms: f64) -> u32 {
        (latency_ms.max(0.0) / self.interval_ms()).ceil() as u32
    }

    /// Fraction of the next tick already accumulated, in `[0, 1)`.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.accumulator.as_secs_f64() / self.interval.as_secs_f64()
    }
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug)]
pub struct TickStats {
    /// Minimum tick duration observed.
    pub min_tick_us: u64,
    /// Maximum tick duration observed.
    pub max_tick_us: u64,
    /// Average tick duration (rolling).
    pub avg_tick_us: u64,
    /// Ticks that took longer than the budget.
    pub late_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn new(budget: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: budget.as_micros() as u64,
            late_ticks: 0,
            total_ticks: 0,
        }
    }

    fn record(&mut self, duration: Duration, budget: Duration) {
        let duration_us = duration.as_micros() as u64;
        self.total_ticks += 1;
        self.min_tick_us = self.min_tick_us.min(duration_us);
        self.max_tick_us = self.max_tick_us.max(duration_us);
        // Rolling average
        self.avg_tick_us = (self.avg_tick_us * 15 + duration_us) / 16;
        if duration > budget {
            self.late_ticks += 1;
        }
    }
}

/// Wall-clock pacing for a [`TickClock`].
pub struct TickPacer {
    tick_duration: Duration,
    last_wake: Instant,
    stats: TickStats,
}

impl TickPacer {
    /// Creates a pacer for ticks of `tick_duration`.
    #[must_use]
    pub fn new(tick_duration: Duration) -> Self {
        Self {
            tick_duration,
            last_wake: Instant::now(),
            stats: TickStats::new(tick_duration),
        }
    }

    /// Wall time since the previous call; feed this to [`TickClock::advance`].
    pub fn take_elapsed(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_wake);
        self.last_wake = now;
        elapsed
    }

    /// Runs `work` and records how long it took.
    pub fn measure<R>(&mut self, work: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = work();
        let elapsed = start.elapsed();
        if elapsed > self.tick_duration {
            warn!(
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = self.tick_duration.as_micros() as u64,
                "tick over budget"
            );
        }
        self.stats.record(elapsed, self.tick_duration);
        result
    }

    /// Waits until one tick duration has passed since the last wake.
    ///
    /// Uses spin-wait for the final microseconds to ensure accuracy.
    pub fn wait_for_next_tick(&self) {
        let elapsed = self.last_wake.elapsed();
        if elapsed >= self.tick_duration {
            return;
        }
        let remaining = self.tick_duration - elapsed;

        // Sleep for most of the time
        if remaining > Duration::from_micros(1000) {
            std::thread::sleep(remaining - Duration::from_micros(500));
        }

        // Spin-wait for precision
        while self.last_wake.elapsed() < self.tick_duration {
            std::hint::spin_loop();
        }
    }

    /// Returns tick statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Target tick duration.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::new(self.tick_duration);
    }
}
