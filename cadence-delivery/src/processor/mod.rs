//! Delivery processor orchestration.

pub mod dispatch;

use std::{sync::Arc, time::Duration};

use cadence_common::{Signal, internal, transport::ChatTransport};
use cadence_store::{CounterStore, JobStore};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    error::EngineError,
    queue::{JobEvent, JobQueue, retry::RetryPolicy},
    rate_limiter::{RateLimitConfig, RateLimiter},
    worker::{DeliveryWorker, SequenceGate},
};

const fn default_process_interval() -> u64 {
    5
}

const fn default_housekeeping_interval() -> u64 {
    60
}

fn default_max_concurrent_deliveries() -> usize {
    num_cpus::get().clamp(2, 8)
}

const fn default_attempt_timeout() -> u64 {
    30
}

const fn default_claim_timeout() -> u64 {
    300
}

const fn default_completed_retention() -> u64 {
    86400 // 24 hours
}

/// Processor for dispatching due jobs to the delivery worker pool
///
/// Runs continuously, draining due jobs at `process_interval_secs` and
/// performing housekeeping (stalled-claim recovery, terminal-job garbage
/// collection, queue gauges) at `housekeeping_interval_secs`.
#[derive(Debug, Deserialize)]
pub struct DeliveryProcessor {
    /// How often to drain due jobs (in seconds)
    #[serde(default = "default_process_interval")]
    pub process_interval_secs: u64,

    /// How often to run housekeeping (in seconds)
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_secs: u64,

    /// Maximum concurrent delivery attempts
    ///
    /// Delivery is I/O-bound; the pool size bounds open transport calls,
    /// not CPU work.
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,

    /// Wall-clock timeout for a single delivery attempt (in seconds)
    ///
    /// An attempt exceeding this is treated as a transient network failure.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Age after which an in-flight claim is considered stalled and
    /// returned to pending (in seconds)
    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_secs: u64,

    /// How long terminal jobs are retained before garbage collection
    /// (in seconds)
    #[serde(default = "default_completed_retention")]
    pub completed_retention_secs: u64,

    /// Retry policy applied by the queue
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Rate limits applied before each send
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// The job queue (initialized in `init()`)
    #[serde(skip)]
    pub(crate) queue: Option<JobQueue>,

    /// The shared delivery worker (initialized in `init()`)
    #[serde(skip)]
    pub(crate) worker: Option<Arc<DeliveryWorker>>,
}

impl Default for DeliveryProcessor {
    fn default() -> Self {
        Self {
            process_interval_secs: default_process_interval(),
            housekeeping_interval_secs: default_housekeeping_interval(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            attempt_timeout_secs: default_attempt_timeout(),
            claim_timeout_secs: default_claim_timeout(),
            completed_retention_secs: default_completed_retention(),
            retry: RetryPolicy::default(),
            rate_limits: RateLimitConfig::default(),
            queue: None,
            worker: None,
        }
    }
}

impl DeliveryProcessor {
    /// Initialize the processor's queue and worker pool.
    ///
    /// `events` receives a [`JobEvent`] for every terminal transition; the
    /// sequence scheduler consumes the other end. `gate` is the scheduler's
    /// pre-delivery check.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn init(
        &mut self,
        jobs: Arc<dyn JobStore>,
        counters: Arc<dyn CounterStore>,
        transport: Arc<dyn ChatTransport>,
        gate: Option<Arc<dyn SequenceGate>>,
        events: mpsc::UnboundedSender<JobEvent>,
    ) -> Result<(), EngineError> {
        internal!("Initialising Delivery Processor ...");

        if self.max_concurrent_deliveries == 0 {
            return Err(EngineError::Configuration(
                "max_concurrent_deliveries must be at least 1".to_string(),
            ));
        }

        let queue = JobQueue::new(jobs, self.retry.clone()).with_events(events);
        let limiter = Arc::new(RateLimiter::new(self.rate_limits.clone(), counters));
        let worker = Arc::new(DeliveryWorker::new(
            transport,
            limiter,
            gate,
            Duration::from_secs(self.attempt_timeout_secs),
        ));

        self.queue = Some(queue);
        self.worker = Some(worker);

        Ok(())
    }

    /// Get a reference to the job queue.
    ///
    /// # Panics
    /// Panics if called before `init()`.
    #[must_use]
    #[allow(clippy::expect_used, reason = "init() is a documented precondition")]
    pub fn queue(&self) -> &JobQueue {
        self.queue
            .as_ref()
            .expect("Delivery processor not initialized. Call init() first.")
    }

    /// Run the delivery processor until shutdown.
    ///
    /// ## Graceful Shutdown
    ///
    /// When a shutdown signal is received:
    /// 1. Stop accepting new work (process/housekeeping ticks)
    /// 2. Wait for the in-flight dispatch round to complete (30s timeout)
    /// 3. Exit cleanly
    ///
    /// Deliveries that do not finish within the shutdown timeout stay
    /// in-flight and are reclaimed as stalled after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor was not initialized.
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), EngineError> {
        internal!("Delivery processor starting");

        let Some(queue) = &self.queue else {
            return Err(EngineError::NotInitialized(
                "Delivery processor not initialized. Call init() first.".to_string(),
            ));
        };
        let Some(worker) = &self.worker else {
            return Err(EngineError::NotInitialized(
                "Delivery processor not initialized. Call init() first.".to_string(),
            ));
        };

        let mut process_timer =
            tokio::time::interval(Duration::from_secs(self.process_interval_secs));
        let mut housekeeping_timer =
            tokio::time::interval(Duration::from_secs(self.housekeeping_interval_secs));

        // Skip the first tick to avoid immediate execution
        process_timer.tick().await;
        housekeeping_timer.tick().await;

        // Track whether a dispatch round is currently running
        let processing = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let processing_clone = processing.clone();

        loop {
            tokio::select! {
                _ = process_timer.tick() => {
                    processing.store(true, std::sync::atomic::Ordering::SeqCst);

                    match dispatch::process_due_internal(
                        queue,
                        worker,
                        self.max_concurrent_deliveries,
                    )
                    .await
                    {
                        Ok(count) if count > 0 => {
                            tracing::debug!(dispatched = count, "Processed delivery queue");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!("Error processing delivery queue: {e}");
                        }
                    }

                    processing.store(false, std::sync::atomic::Ordering::SeqCst);
                }
                _ = housekeeping_timer.tick() => {
                    if let Err(e) = dispatch::housekeeping_internal(
                        queue,
                        self.claim_timeout_secs,
                        self.completed_retention_secs,
                    )
                    .await
                    {
                        tracing::error!("Error during queue housekeeping: {e}");
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Delivery processor received shutdown signal");

                            // Wait for the in-flight dispatch round (30s timeout)
                            let shutdown_timeout = Duration::from_secs(30);
                            let start = std::time::Instant::now();

                            while processing_clone.load(std::sync::atomic::Ordering::SeqCst) {
                                if start.elapsed() >= shutdown_timeout {
                                    tracing::warn!(
                                        "Shutdown timeout exceeded, in-flight deliveries will be reclaimed on restart"
                                    );
                                    break;
                                }
                                tokio::time::sleep(Duration::from_millis(100)).await;
                            }

                            internal!("Delivery processor shutdown complete");
                            break;
                        }
                        Err(e) => {
                            tracing::error!("Delivery processor shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
