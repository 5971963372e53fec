//! Observability sink for admission decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Fire-and-forget sink for decision counters and backend latency.
///
/// Implementations must not panic and must tolerate concurrent calls.
pub trait MetricsSink: Send + Sync {
    /// A decision admitted the request.
    fn increment_success(&self);
    /// A decision rejected the request.
    fn increment_failure(&self);
    /// Duration of one shared backend attempt, successful or not.
    fn record_latency(&self, duration: Duration);
}

/// Lock-free in-process counters.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    success: AtomicU64,
    failure: AtomicU64,
    latency_count: AtomicU64,
    latency_total_micros: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    /// Number of recorded backend attempts.
    pub fn latency_count(&self) -> u64 {
        self.latency_count.load(Ordering::Relaxed)
    }

    /// Mean backend attempt latency, if any attempt was recorded.
    pub fn mean_latency(&self) -> Option<Duration> {
        let count = self.latency_count();
        if count == 0 {
            return None;
        }
        let total = self.latency_total_micros.load(Ordering::Relaxed);
        Some(Duration::from_micros(total / count))
    }
}

impl MetricsSink for AtomicMetrics {
    fn increment_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_total_micros.fetch_add(micros, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters() {
        let metrics = AtomicMetrics::new();
        metrics.increment_success();
        metrics.increment_success();
        metrics.increment_failure();

        assert_eq!(metrics.success_count(), 2);
        assert_eq!(metrics.failure_count(), 1);
        assert_eq!(metrics.mean_latency(), None);
    }

    #[test]
    fn test_mean_latency() {
        let metrics = AtomicMetrics::new();
        metrics.record_latency(Duration::from_millis(10));
        metrics.record_latency(Duration::from_millis(30));

        assert_eq!(metrics.latency_count(), 2);
        assert_eq!(metrics.mean_latency(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(AtomicMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.increment_success();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.success_count(), 8000);
    }
}
