use std::time::Duration;

/// Counters of one loop thread, published after every iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopMetrics {
    pub iterations: u64,
    pub ticks: u64,
    /// Iterations that had to drop backlog.
    pub clamps: u64,
    pub dropped_backlog: Duration,
    pub actions: u64,
    pub restarts: u64,
    pub longest_iteration: Duration,
}

impl LoopMetrics {
    pub fn record_iteration(&mut self, took: Duration) {
        self.iterations += 1;
        self.longest_iteration = self.longest_iteration.max(took);
    }

    pub fn record_ticks(&mut self, ticks: u32) {
        self.ticks += u64::from(ticks);
    }

    pub fn record_clamp(&mut self, dropped: Duration) {
        self.clamps += 1;
        self.dropped_backlog = self.dropped_backlog.saturating_add(dropped);
    }

    pub fn record_actions(&mut self, count: usize) {
        self.actions += count as u64;
    }

    pub fn record_restart(&mut self) {
        self.restarts += 1;
    }
}
