//! Negotiation statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use keyneg_session::MetricsSink;

/// Monotonic negotiation counters. All fields are atomics; no external
/// locking is needed.
#[derive(Default)]
pub struct StatsSink {
    total: AtomicU64,
    successes: AtomicU64,
    success_latency_ms: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total: u64,
    pub successes: u64,
    pub success_latency_ms: u64,
}

impl StatsSnapshot {
    /// Mean latency over successful negotiations, if there were any.
    pub fn mean_latency_ms(&self) -> Option<f64> {
        (self.successes > 0).then(|| self.success_latency_ms as f64 / self.successes as f64)
    }
}

impl StatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            success_latency_ms: self.success_latency_ms.load(Ordering::Relaxed),
        }
    }

    /// Log the one-line summary the emitter thread prints every second.
    pub fn emit(&self) {
        let snapshot = self.snapshot();
        match snapshot.mean_latency_ms() {
            Some(mean) => tracing::info!(
                total = snapshot.total,
                successes = snapshot.successes,
                mean_latency_ms = mean,
                "negotiation stats"
            ),
            None => tracing::info!(
                total = snapshot.total,
                "negotiation stats, no successes yet"
            ),
        }
    }
}

impl MetricsSink for StatsSink {
    fn record_negotiation(&self, duration_ms: u32, success: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
            self.success_latency_ms
                .fetch_add(duration_ms as u64, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = StatsSink::new();
        stats.record_negotiation(10, true);
        stats.record_negotiation(30, true);
        stats.record_negotiation(500, false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.successes, 2);
        assert_eq!(snapshot.success_latency_ms, 40);
        assert_eq!(snapshot.mean_latency_ms(), Some(20.0));
    }

    #[test]
    fn test_no_successes_has_no_mean() {
        let stats = StatsSink::new();
        stats.record_negotiation(100, false);
        assert_eq!(stats.snapshot().mean_latency_ms(), None);
    }
}
