//! Keyspace metrics collection.
//!
//! [`KeyspaceMetrics`] counts how reads are routed between the replica and
//! the primary, how many writes were issued, and how many operations failed.
//! The fallback counters make the cost of the configured
//! [`ReadFallback`](crate::ReadFallback) policy visible: under
//! `OnEmptyOrError` every miss shows up in `empty_fallbacks`.
//!
//! # Memory Ordering
//!
//! All counters are independent and use `Ordering::Relaxed`. A snapshot may
//! observe counters slightly out of step with each other, which is fine for
//! telemetry.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use keyspace_common::KeyspaceMetrics;
//!
//! let metrics = KeyspaceMetrics::new();
//! metrics.record_replica_read(Duration::from_micros(120));
//! metrics.record_empty_fallback();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.replica_reads, 1);
//! assert_eq!(snapshot.primary_fallbacks(), 1);
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::error::KeyspaceError;

/// Point-in-time copy of the keyspace counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, bon::Builder)]
pub struct KeyspaceMetricsSnapshot {
    /// Reads answered by the replica.
    #[builder(default)]
    pub replica_reads: u64,
    /// Reads answered by the primary (directly or after a fallback).
    #[builder(default)]
    pub primary_reads: u64,
    /// Write commands issued to the primary.
    #[builder(default)]
    pub writes: u64,

    /// Fallbacks triggered by an empty replica reply.
    #[builder(default)]
    pub empty_fallbacks: u64,
    /// Fallbacks triggered by a replica error.
    #[builder(default)]
    pub error_fallbacks: u64,

    /// Cumulative read latency in microseconds.
    #[builder(default)]
    pub read_latency_us: u64,
    /// Cumulative write latency in microseconds.
    #[builder(default)]
    pub write_latency_us: u64,

    /// Operations that returned an error to the caller.
    #[builder(default)]
    pub error_count: u64,
    /// Errors classified as connectivity failures.
    #[builder(default)]
    pub connection_error_count: u64,
    /// Health checks performed.
    #[builder(default)]
    pub health_check_count: u64,
}

impl KeyspaceMetricsSnapshot {
    /// Total reads that were retried on the primary.
    #[must_use]
    pub fn primary_fallbacks(&self) -> u64 {
        self.empty_fallbacks + self.error_fallbacks
    }

    /// Total read commands issued against either connection.
    #[must_use]
    pub fn total_reads(&self) -> u64 {
        self.replica_reads + self.primary_reads
    }

    /// Share of replica attempts that ended on the primary, in `[0, 1]`.
    #[must_use]
    pub fn fallback_rate(&self) -> f64 {
        let attempts = self.replica_reads + self.error_fallbacks;
        if attempts == 0 {
            return 0.0;
        }
        self.primary_fallbacks() as f64 / attempts as f64
    }
}

/// Lock-free counters shared by all clones of a client.
#[derive(Clone, Default)]
pub struct KeyspaceMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    replica_reads: AtomicU64,
    primary_reads: AtomicU64,
    writes: AtomicU64,
    empty_fallbacks: AtomicU64,
    error_fallbacks: AtomicU64,
    read_latency_us: AtomicU64,
    write_latency_us: AtomicU64,
    error_count: AtomicU64,
    connection_error_count: AtomicU64,
    health_check_count: AtomicU64,
}

impl KeyspaceMetrics {
    /// Creates a new, zeroed metrics collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a read answered by the replica.
    pub fn record_replica_read(&self, duration: Duration) {
        self.inner.replica_reads.fetch_add(1, Ordering::Relaxed);
        self.add_latency(&self.inner.read_latency_us, duration);
    }

    /// Records a read answered by the primary.
    pub fn record_primary_read(&self, duration: Duration) {
        self.inner.primary_reads.fetch_add(1, Ordering::Relaxed);
        self.add_latency(&self.inner.read_latency_us, duration);
    }

    /// Records a write issued to the primary.
    pub fn record_write(&self, duration: Duration) {
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        self.add_latency(&self.inner.write_latency_us, duration);
    }

    /// Records a fallback caused by an empty replica reply.
    pub fn record_empty_fallback(&self) {
        self.inner.empty_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a fallback caused by a replica error.
    pub fn record_error_fallback(&self) {
        self.inner.error_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an error surfaced to the caller.
    pub fn record_error(&self, error: &KeyspaceError) {
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
        if error.is_connection() {
            self.inner.connection_error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a health check.
    pub fn record_health_check(&self) {
        self.inner.health_check_count.fetch_add(1, Ordering::Relaxed);
    }

    fn add_latency(&self, counter: &AtomicU64, duration: Duration) {
        let us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        counter.fetch_add(us, Ordering::Relaxed);
    }

    /// Returns a copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> KeyspaceMetricsSnapshot {
        let inner = &self.inner;
        KeyspaceMetricsSnapshot::builder()
            .replica_reads(inner.replica_reads.load(Ordering::Relaxed))
            .primary_reads(inner.primary_reads.load(Ordering::Relaxed))
            .writes(inner.writes.load(Ordering::Relaxed))
            .empty_fallbacks(inner.empty_fallbacks.load(Ordering::Relaxed))
            .error_fallbacks(inner.error_fallbacks.load(Ordering::Relaxed))
            .read_latency_us(inner.read_latency_us.load(Ordering::Relaxed))
            .write_latency_us(inner.write_latency_us.load(Ordering::Relaxed))
            .error_count(inner.error_count.load(Ordering::Relaxed))
            .connection_error_count(inner.connection_error_count.load(Ordering::Relaxed))
            .health_check_count(inner.health_check_count.load(Ordering::Relaxed))
            .build()
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.replica_reads,
            &inner.primary_reads,
            &inner.writes,
            &inner.empty_fallbacks,
            &inner.error_fallbacks,
            &inner.read_latency_us,
            &inner.write_latency_us,
            &inner.error_count,
            &inner.connection_error_count,
            &inner.health_check_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for KeyspaceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyspaceMetrics").field("snapshot", &self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        assert_eq!(KeyspaceMetrics::new().snapshot(), KeyspaceMetricsSnapshot::default());
    }

    #[test]
    fn test_read_routing_counters() {
        let metrics = KeyspaceMetrics::new();
        metrics.record_replica_read(Duration::from_micros(10));
        metrics.record_replica_read(Duration::from_micros(10));
        metrics.record_empty_fallback();
        metrics.record_primary_read(Duration::from_micros(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.replica_reads, 2);
        assert_eq!(snapshot.primary_reads, 1);
        assert_eq!(snapshot.total_reads(), 3);
        assert_eq!(snapshot.read_latency_us, 50);
        assert_eq!(snapshot.primary_fallbacks(), 1);
    }

    #[test]
    fn test_fallback_rate() {
        let snapshot =
            KeyspaceMetricsSnapshot::builder().replica_reads(3).error_fallbacks(1).build();
        assert!((snapshot.fallback_rate() - 0.25).abs() < f64::EPSILON);

        assert!(KeyspaceMetricsSnapshot::default().fallback_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_connection_errors_counted_separately() {
        let metrics = KeyspaceMetrics::new();
        metrics.record_error(&KeyspaceError::connection("down"));
        metrics.record_error(&KeyspaceError::command("ERR"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.error_count, 2);
        assert_eq!(snapshot.connection_error_count, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = KeyspaceMetrics::new();
        let clone = metrics.clone();
        clone.record_write(Duration::from_micros(5));

        assert_eq!(metrics.snapshot().writes, 1);
    }

    #[test]
    fn test_reset() {
        let metrics = KeyspaceMetrics::new();
        metrics.record_write(Duration::from_micros(5));
        metrics.record_health_check();
        metrics.reset();

        assert_eq!(metrics.snapshot(), KeyspaceMetricsSnapshot::default());
    }
}
