//! Delivery engine metrics
//!
//! Tracks the notification pipeline:
//! - Jobs enqueued, succeeded, skipped, exhausted
//! - Delivery attempts by outcome kind
//! - Rate-limit denials by action
//! - Queue sizes by status

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};

fn meter() -> Meter {
    opentelemetry::global::meter("cadence")
}

/// Engine metrics collector
#[derive(Debug)]
pub struct EngineMetrics {
    /// Total number of jobs accepted by the queue
    jobs_enqueued: Counter<u64>,

    /// Total number of delivery attempts, labeled by outcome kind
    attempts_total: Counter<u64>,

    /// Total number of jobs that reached `Succeeded`
    jobs_succeeded: Counter<u64>,

    /// Total number of jobs short-circuited by the pre-delivery gate
    jobs_skipped: Counter<u64>,

    /// Total number of jobs that exhausted their attempts or failed
    /// permanently
    jobs_exhausted: Counter<u64>,

    /// Total number of sends denied by the local rate limiter
    rate_limit_denied: Counter<u64>,

    // Queue size gauges, shared with the observable gauge callbacks
    queue_pending: Arc<AtomicU64>,
    queue_in_flight: Arc<AtomicU64>,
    queue_retry: Arc<AtomicU64>,
}

impl EngineMetrics {
    /// Create a new engine metrics collector
    #[must_use]
    pub fn new() -> Self {
        let meter = meter();

        let jobs_enqueued = meter
            .u64_counter("cadence.jobs.enqueued.total")
            .with_description("Total number of jobs accepted by the queue")
            .build();

        let attempts_total = meter
            .u64_counter("cadence.delivery.attempts.total")
            .with_description("Total number of delivery attempts by outcome kind")
            .build();

        let jobs_succeeded = meter
            .u64_counter("cadence.jobs.succeeded.total")
            .with_description("Total number of jobs delivered successfully")
            .build();

        let jobs_skipped = meter
            .u64_counter("cadence.jobs.skipped.total")
            .with_description("Total number of jobs short-circuited by the pre-delivery gate")
            .build();

        let jobs_exhausted = meter
            .u64_counter("cadence.jobs.exhausted.total")
            .with_description("Total number of jobs that failed terminally")
            .build();

        let rate_limit_denied = meter
            .u64_counter("cadence.rate_limit.denied.total")
            .with_description("Total number of sends denied by the local rate limiter")
            .build();

        let queue_pending = Arc::new(AtomicU64::new(0));
        let queue_in_flight = Arc::new(AtomicU64::new(0));
        let queue_retry = Arc::new(AtomicU64::new(0));

        for (name, description, value) in [
            (
                "cadence.queue.pending",
                "Jobs waiting to become due",
                Arc::clone(&queue_pending),
            ),
            (
                "cadence.queue.in_flight",
                "Jobs currently claimed by workers",
                Arc::clone(&queue_in_flight),
            ),
            (
                "cadence.queue.retry",
                "Jobs waiting out a retry backoff",
                Arc::clone(&queue_retry),
            ),
        ] {
            meter
                .u64_observable_gauge(name)
                .with_description(description)
                .with_callback(move |observer| {
                    observer.observe(value.load(Ordering::Relaxed), &[]);
                })
                .build();
        }

        Self {
            jobs_enqueued,
            attempts_total,
            jobs_succeeded,
            jobs_skipped,
            jobs_exhausted,
            rate_limit_denied,
            queue_pending,
            queue_in_flight,
            queue_retry,
        }
    }

    pub fn record_enqueued(&self, lane: &str) {
        self.jobs_enqueued.add(1, &[KeyValue::new("lane", lane.to_string())]);
    }

    pub fn record_attempt(&self, kind: &str) {
        self.attempts_total
            .add(1, &[KeyValue::new("kind", kind.to_string())]);
    }

    pub fn record_succeeded(&self) {
        self.jobs_succeeded.add(1, &[]);
    }

    pub fn record_skipped(&self) {
        self.jobs_skipped.add(1, &[]);
    }

    pub fn record_exhausted(&self, kind: &str) {
        self.jobs_exhausted
            .add(1, &[KeyValue::new("kind", kind.to_string())]);
    }

    pub fn record_rate_limit_denied(&self, action: &str) {
        self.rate_limit_denied
            .add(1, &[KeyValue::new("action", action.to_string())]);
    }

    /// Update the queue size gauges from a status census.
    pub fn update_queue_sizes(&self, pending: u64, in_flight: u64, retry: u64) {
        self.queue_pending.store(pending, Ordering::Relaxed);
        self.queue_in_flight.store(in_flight, Ordering::Relaxed);
        self.queue_retry.store(retry, Ordering::Relaxed);
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
