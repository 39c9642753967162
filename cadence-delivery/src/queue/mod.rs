//! Job queue: the single source of truth for scheduling and retry.
//!
//! Workers report outcomes; the queue alone decides retry vs. terminal and
//! owns every job mutation after insertion.

pub mod retry;

use std::sync::Arc;

use cadence_common::{
    time::unix_now,
    types::RecipientId,
};
use cadence_store::{
    DeliveryAttempt, Job, JobId, JobStatus, JobStore, SequenceRef,
};
use tokio::sync::mpsc;

use crate::{
    error::{DeliveryError, EngineError, ErrorKind},
    queue::retry::RetryPolicy,
    types::{DeliveryOutcome, NewJob},
};

/// Transition applied by [`JobQueue::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Delivered; the job is terminal.
    Succeeded,
    /// Gate short-circuit; the job is terminal (counts as success).
    Skipped,
    /// Retryable failure; attempt recorded, next try scheduled.
    RetryScheduled { attempt: u32, not_before: u64 },
    /// Rate limited; rescheduled without consuming an attempt.
    RateLimitDeferred { not_before: u64 },
    /// Retryable failures exhausted the attempt budget; terminal.
    Exhausted { attempts: u32, last_error: String },
    /// Permanent failure; terminal regardless of remaining attempts.
    PermanentFailure { kind: ErrorKind, error: String },
    /// The job was already terminal; nothing changed.
    AlreadyTerminal,
}

impl Transition {
    /// Whether this transition left the job in a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::Skipped
                | Self::Exhausted { .. }
                | Self::PermanentFailure { .. }
        )
    }
}

/// Completion event forwarded to the sequence scheduler.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job_id: JobId,
    pub recipient: RecipientId,
    pub sequence: Option<SequenceRef>,
    pub transition: Transition,
}

/// Counts of non-terminal jobs by status, for the queue gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCensus {
    pub pending: u64,
    pub in_flight: u64,
    pub retry: u64,
}

/// The delivery job queue.
///
/// Cheap to clone; clones share the store, policy and event channel.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    policy: RetryPolicy,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl JobQueue {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            events: None,
        }
    }

    /// Attach the completion-event channel consumed by the scheduler.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// The retry policy this queue applies.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Create and persist a job, returning its id.
    ///
    /// # Errors
    /// Returns an error if the store rejects the insert.
    pub async fn enqueue(&self, new: NewJob) -> Result<JobId, EngineError> {
        let now = unix_now();
        let job = Job {
            id: JobId::generate(),
            lane: new.lane,
            recipient: new.recipient,
            channel: new.channel,
            sequence: new.sequence,
            payload: new.payload,
            status: JobStatus::Pending,
            attempts: Vec::new(),
            max_attempts: new.max_attempts.unwrap_or(self.policy.max_attempts),
            enqueued_at: now,
            not_before: now + new.delay_secs,
        };

        self.store.insert(&job).await?;

        if let Some(metrics) = cadence_metrics::metrics() {
            metrics.engine.record_enqueued(&format!("{:?}", job.lane));
        }
        tracing::debug!(
            job_id = %job.id,
            recipient = %job.recipient,
            not_before = job.not_before,
            lane = ?job.lane,
            "Job enqueued"
        );

        Ok(job.id)
    }

    /// Atomically claim the best due job, if any.
    ///
    /// # Errors
    /// Returns an error if the store claim fails.
    pub async fn dequeue_due(&self) -> Result<Option<Job>, EngineError> {
        Ok(self.store.claim_due(unix_now()).await?)
    }

    /// Apply a delivery outcome to a claimed job.
    ///
    /// Terminal statuses are immutable: completing an already-terminal job
    /// is a no-op (this happens when a stalled claim was reclaimed and the
    /// original worker reports late — at-least-once delivery makes that
    /// benign).
    ///
    /// # Errors
    /// Returns an error if the job does not exist or the store update fails.
    pub async fn complete(
        &self,
        job_id: &JobId,
        outcome: &DeliveryOutcome,
    ) -> Result<Transition, EngineError> {
        let now = unix_now();
        let mut job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| EngineError::JobNotFound(job_id.clone()))?;

        if job.is_terminal() {
            tracing::warn!(
                job_id = %job.id,
                status = ?job.status,
                "Ignoring outcome for terminal job"
            );
            return Ok(Transition::AlreadyTerminal);
        }

        let transition = match outcome {
            DeliveryOutcome::Delivered => {
                job.record_attempt(DeliveryAttempt {
                    timestamp: now,
                    kind: None,
                    error: None,
                });
                job.status = JobStatus::Succeeded;
                Transition::Succeeded
            }

            DeliveryOutcome::Skipped => {
                // Not a delivery attempt: the transport was never contacted.
                job.status = JobStatus::Succeeded;
                Transition::Skipped
            }

            DeliveryOutcome::Failed(error) => self.apply_failure(&mut job, error, now),
        };

        self.store.update(&job).await?;
        self.record_metrics(outcome, &transition);

        if transition.is_terminal()
            && let Some(events) = &self.events
        {
            let _ = events.send(JobEvent {
                job_id: job.id.clone(),
                recipient: job.recipient,
                sequence: job.sequence.clone(),
                transition: transition.clone(),
            });
        }

        Ok(transition)
    }

    fn apply_failure(&self, job: &mut Job, error: &DeliveryError, now: u64) -> Transition {
        let kind = error.kind();

        // Rate limiting carries no deliverability signal: defer without
        // touching the attempt budget.
        if let Some(retry_after_secs) = error.retry_after_secs() {
            let not_before = now + retry_after_secs;
            job.status = JobStatus::Pending;
            job.not_before = not_before;
            tracing::debug!(
                job_id = %job.id,
                retry_after_secs,
                "Delivery rate limited, deferring"
            );
            return Transition::RateLimitDeferred { not_before };
        }

        job.record_attempt(DeliveryAttempt {
            timestamp: now,
            kind: Some(kind.as_str().to_string()),
            error: Some(error.to_string()),
        });
        let attempts = job.attempt_count();

        if error.is_permanent() {
            job.status = JobStatus::Failed(error.to_string());
            tracing::error!(
                job_id = %job.id,
                recipient = %job.recipient,
                kind = %kind,
                error = %error,
                history = ?job.attempts,
                "Job failed permanently"
            );
            return Transition::PermanentFailure {
                kind,
                error: error.to_string(),
            };
        }

        let cap = self.policy.cap_for(kind).min(job.max_attempts);
        if attempts < cap {
            let not_before = self.policy.next_retry_at(now, attempts);
            job.status = JobStatus::Retry {
                attempts,
                last_error: error.to_string(),
            };
            job.not_before = not_before;
            tracing::info!(
                job_id = %job.id,
                attempt = attempts,
                retry_delay_secs = not_before.saturating_sub(now),
                "Scheduled retry with exponential backoff"
            );
            Transition::RetryScheduled {
                attempt: attempts,
                not_before,
            }
        } else {
            job.status = JobStatus::Failed(error.to_string());
            tracing::error!(
                job_id = %job.id,
                recipient = %job.recipient,
                attempts,
                kind = %kind,
                history = ?job.attempts,
                "Job exhausted its attempt budget"
            );
            Transition::Exhausted {
                attempts,
                last_error: error.to_string(),
            }
        }
    }

    fn record_metrics(&self, outcome: &DeliveryOutcome, transition: &Transition) {
        let Some(metrics) = cadence_metrics::metrics() else {
            return;
        };
        if !matches!(outcome, DeliveryOutcome::Skipped) {
            metrics.engine.record_attempt(outcome.kind_str());
        }
        match transition {
            Transition::Succeeded => metrics.engine.record_succeeded(),
            Transition::Skipped => metrics.engine.record_skipped(),
            Transition::Exhausted { .. } => metrics.engine.record_exhausted("exhausted"),
            Transition::PermanentFailure { kind, .. } => {
                metrics.engine.record_exhausted(kind.as_str());
            }
            _ => {}
        }
    }

    /// Return stale in-flight claims to pending.
    ///
    /// # Errors
    /// Returns an error if the store sweep fails.
    pub async fn release_stalled(&self, claim_timeout_secs: u64) -> Result<usize, EngineError> {
        let released = self
            .store
            .release_stalled(unix_now(), claim_timeout_secs)
            .await?;
        if !released.is_empty() {
            tracing::warn!(
                count = released.len(),
                jobs = ?released,
                "Released stalled claims back to pending"
            );
        }
        Ok(released.len())
    }

    /// Remove terminal jobs older than the retention window.
    ///
    /// # Errors
    /// Returns an error if the store listing or removal fails.
    pub async fn collect_garbage(&self, retention_secs: u64) -> Result<usize, EngineError> {
        let now = unix_now();
        let mut removed = 0;

        for job in self.store.list().await? {
            if !job.is_terminal() {
                continue;
            }
            let resolved_at = job
                .attempts
                .last()
                .map_or(job.enqueued_at, |attempt| attempt.timestamp);
            if now.saturating_sub(resolved_at) >= retention_secs {
                self.store.remove(&job.id).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "Garbage collected terminal jobs");
        }
        Ok(removed)
    }

    /// Counts of non-terminal jobs by status.
    ///
    /// # Errors
    /// Returns an error if the store listing fails.
    pub async fn census(&self) -> Result<QueueCensus, EngineError> {
        let mut census = QueueCensus::default();
        for job in self.store.list().await? {
            match job.status {
                JobStatus::Pending => census.pending += 1,
                JobStatus::InFlight { .. } => census.in_flight += 1,
                JobStatus::Retry { .. } => census.retry += 1,
                JobStatus::Succeeded | JobStatus::Failed(_) => {}
            }
        }
        Ok(census)
    }

    /// Point lookup, for tests and control surfaces.
    ///
    /// # Errors
    /// Returns an error if the store read fails.
    pub async fn get(&self, job_id: &JobId) -> Result<Option<Job>, EngineError> {
        Ok(self.store.get(job_id).await?)
    }
}
