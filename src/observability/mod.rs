//! Delivery metrics and timing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Delivery metrics collector.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    /// Messages accepted into the outbox.
    pub messages_queued: AtomicU64,
    /// Messages accepted by the server.
    pub messages_delivered: AtomicU64,
    /// Messages dropped after a permanent rejection.
    pub messages_rejected: AtomicU64,
    /// Messages put back at the head of the outbox.
    pub messages_requeued: AtomicU64,
    /// Drain cycles started.
    pub cycles_started: AtomicU64,
    /// Drain cycles that ended with messages still queued.
    pub cycles_aborted: AtomicU64,
    /// Failed connection attempts.
    pub connection_failures: AtomicU64,
    /// Failed logins.
    pub auth_failures: AtomicU64,
    /// Successful STARTTLS upgrades.
    pub tls_upgrades: AtomicU64,
    /// Failed STARTTLS upgrades.
    pub tls_upgrade_failures: AtomicU64,
}

impl DeliveryMetrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message entering the outbox.
    pub fn record_queued(&self) {
        self.messages_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a delivered message.
    pub fn record_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a permanently rejected message.
    pub fn record_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a requeued message.
    pub fn record_requeued(&self) {
        self.messages_requeued.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the start of a drain cycle.
    pub fn record_cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a drain cycle that left work behind.
    pub fn record_cycle_aborted(&self) {
        self.cycles_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed connection attempt.
    pub fn record_connection_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed login.
    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a STARTTLS attempt.
    pub fn record_tls_upgrade(&self, success: bool) {
        if success {
            self.tls_upgrades.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tls_upgrade_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            messages_requeued: self.messages_requeued.load(Ordering::Relaxed),
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            tls_upgrades: self.tls_upgrades.load(Ordering::Relaxed),
            tls_upgrade_failures: self.tls_upgrade_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages accepted into the outbox.
    pub messages_queued: u64,
    /// Messages accepted by the server.
    pub messages_delivered: u64,
    /// Messages dropped after a permanent rejection.
    pub messages_rejected: u64,
    /// Messages put back at the head of the outbox.
    pub messages_requeued: u64,
    /// Drain cycles started.
    pub cycles_started: u64,
    /// Drain cycles that ended with messages still queued.
    pub cycles_aborted: u64,
    /// Failed connection attempts.
    pub connection_failures: u64,
    /// Failed logins.
    pub auth_failures: u64,
    /// Successful STARTTLS upgrades.
    pub tls_upgrades: u64,
    /// Failed STARTTLS upgrades.
    pub tls_upgrade_failures: u64,
}

impl MetricsSnapshot {
    /// Returns the share of finished messages that were delivered.
    pub fn delivery_rate(&self) -> f64 {
        let total = self.messages_delivered + self.messages_rejected;
        if total == 0 {
            1.0
        } else {
            self.messages_delivered as f64 / total as f64
        }
    }
}

/// Timer for measuring operation duration.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    /// Creates and starts a new timer.
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Returns the elapsed time.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stops the timer and returns the duration.
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();

        tracing::debug!(
            timer = self.name,
            duration_ms = elapsed.as_millis() as u64,
            "Timer stopped"
        );

        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let metrics = DeliveryMetrics::new();

        metrics.record_queued();
        metrics.record_queued();
        metrics.record_queued();
        metrics.record_delivered();
        metrics.record_delivered();
        metrics.record_rejected();
        metrics.record_tls_upgrade(true);
        metrics.record_tls_upgrade(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_queued, 3);
        assert_eq!(snapshot.messages_delivered, 2);
        assert_eq!(snapshot.messages_rejected, 1);
        assert_eq!(snapshot.tls_upgrades, 1);
        assert_eq!(snapshot.tls_upgrade_failures, 1);
        assert!((snapshot.delivery_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_empty_delivery_rate() {
        assert_eq!(MetricsSnapshot::default().delivery_rate(), 1.0);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start("test");
        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.stop();
        assert!(duration >= Duration::from_millis(10));
    }
}
