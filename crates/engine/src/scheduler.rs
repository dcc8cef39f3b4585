//! Fixed-timestep scheduling
//!
//! Wall time is accumulated and paid out in whole intervals, at most
//! `max_ticks_per_iteration` per call. Backlog beyond the cap is dropped rather
//! than replayed, so a stalled thread resumes at normal speed.

use std::time::{Duration, Instant};

use tracing::warn;

/// Work owed for one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    pub ticks: u32,
    pub remaining_accumulator: Duration,
    pub dropped_backlog: Duration,
}

/// Pay out whole intervals from `accumulator`, up to `cap`.
pub fn plan_ticks(mut accumulator: Duration, interval: Duration, cap: u32) -> TickPlan {
    let mut ticks = 0u32;

    while accumulator >= interval && ticks < cap {
        accumulator = accumulator.saturating_sub(interval);
        ticks = ticks.saturating_add(1);
    }

    if accumulator >= interval {
        TickPlan {
            ticks,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        TickPlan {
            ticks,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TickScheduler {
    name: &'static str,
    interval: Duration,
    max_ticks_per_iteration: u32,
    accumulator: Duration,
    last: Option<Instant>,
}

impl TickScheduler {
    pub fn new(name: &'static str, interval: Duration, max_ticks_per_iteration: u32) -> Self {
        Self {
            name,
            interval: interval.max(Duration::from_nanos(1)),
            max_ticks_per_iteration: max_ticks_per_iteration.max(1),
            accumulator: Duration::ZERO,
            last: None,
        }
    }

    /// Scheduler running at `rate_hz` ticks per second.
    pub fn with_rate(name: &'static str, rate_hz: u32, max_ticks_per_iteration: u32) -> Self {
        let interval = Duration::from_nanos(1_000_000_000 / u64::from(rate_hz.max(1)));
        Self::new(name, interval, max_ticks_per_iteration)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn accumulator(&self) -> Duration {
        self.accumulator
    }

    /// Account for the wall time elapsed up to `now`
    ///
    /// The first call only starts the clock.
    pub fn advance(&mut self, now: Instant) -> TickPlan {
        let elapsed = match self.last.replace(now) {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        let plan = plan_ticks(
            self.accumulator.saturating_add(elapsed),
            self.interval,
            self.max_ticks_per_iteration,
        );
        self.accumulator = plan.remaining_accumulator;

        if plan.dropped_backlog > Duration::ZERO {
            warn!(
                scheduler = self.name,
                dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_iteration = self.max_ticks_per_iteration,
                "tick_clamp_triggered"
            );
        }
        plan
    }

    /// How long to sleep before the next tick is owed.
    pub fn time_until_next_tick(&self) -> Duration {
        self.interval.saturating_sub(self.accumulator)
    }

    /// Forget accumulated time; the next `advance` restarts the clock.
    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
        self.last = None;
    }
}
