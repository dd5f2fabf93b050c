//! Per-worker counters (spec.md §9 "Global state" says only SIGPIPE is
//! touched process-wide; these are local to one worker and never
//! cross-thread except via the relaxed loads the supervisor polls for a
//! periodic summary).
//!
//! Grounded in the teacher's `crates/chopin-core/src/metrics.rs`
//! (`WorkerMetrics`), cache-line padded the same way.

use std::sync::atomic::{AtomicUsize, Ordering};

#[repr(C, align(64))]
pub struct WorkerMetrics {
    pub requests_served: AtomicUsize,
    pub active_connections: AtomicUsize,
    pub bytes_written: AtomicUsize,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self {
            requests_served: AtomicUsize::new(0),
            active_connections: AtomicUsize::new(0),
            bytes_written: AtomicUsize::new(0),
        }
    }

    pub fn inc_requests(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: usize) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_move_independently() {
        let m = WorkerMetrics::new();
        assert_eq!(m.requests_served.load(Ordering::Relaxed), 0);
        m.inc_requests();
        m.inc_connections();
        m.inc_connections();
        m.dec_connections();
        m.add_bytes(128);
        assert_eq!(m.requests_served.load(Ordering::Relaxed), 1);
        assert_eq!(m.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(m.bytes_written.load(Ordering::Relaxed), 128);
    }
}
