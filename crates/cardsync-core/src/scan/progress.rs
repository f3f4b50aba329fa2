//! Time-based progress throttling shared by scans and pattern runs.

use std::time::{Duration, Instant};

/// Lets a progress callback through at most once per interval, and always
/// exactly once when the work completes.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    finished: bool,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            finished: false,
        }
    }

    /// Whether to report `processed` of `total` now.
    pub fn tick(&mut self, processed: usize, total: usize) -> bool {
        self.tick_at(processed, total, Instant::now())
    }

    pub fn tick_at(&mut self, processed: usize, total: usize, now: Instant) -> bool {
        if self.finished {
            return false;
        }
        if processed >= total {
            self.finished = true;
            self.last_emit = Some(now);
            return true;
        }
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}
