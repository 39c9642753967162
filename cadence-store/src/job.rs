//! The job record: one unit of deferred delivery work.

use cadence_common::types::{CampaignId, ChannelId, MessagePayload, RecipientId};
use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Seconds of waiting that promote a job by one priority lane.
///
/// Aging keeps low-priority lanes from starving while a busy high-priority
/// lane stays saturated.
const AGING_INTERVAL_SECS: u64 = 300;

/// Logical queue lane for a job.
///
/// Lanes are served highest first, subject to aging (see
/// [`Job::effective_priority`]).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Priority {
    /// Time-critical alerts (e.g. verification results).
    Critical,
    /// Important but not urgent.
    High,
    /// Routine drip-campaign messages.
    #[default]
    Normal,
    /// Bulk or best-effort work.
    Low,
}

impl Priority {
    /// Lane rank, lower is served first.
    #[must_use]
    pub const fn rank(self) -> i64 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

/// Link from a job back to the drip sequence that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRef {
    pub campaign: CampaignId,
    /// Sequence day this job delivers (1-indexed).
    pub day: u32,
}

/// Record of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// Unix timestamp of the attempt.
    pub timestamp: u64,
    /// Classified error kind, `None` on success.
    pub kind: Option<String>,
    /// Human-readable error, `None` on success.
    pub error: Option<String>,
}

/// Current state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting to become due.
    Pending,
    /// Claimed by a worker; released back to `Pending` if the claim goes
    /// stale.
    InFlight { claimed_at: u64 },
    /// A retryable failure occurred; waiting for the backoff to elapse.
    Retry { attempts: u32, last_error: String },
    /// Delivered (or skipped by the pre-delivery gate). Terminal.
    Succeeded,
    /// Permanently failed. Terminal.
    Failed(String),
}

impl JobStatus {
    /// Whether this status is terminal — terminal jobs are immutable and
    /// only removed by garbage collection.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

/// A unit of deferred work owned by the job queue.
///
/// The queue is the only component that mutates a job after insertion; the
/// scheduler creates jobs and otherwise only observes outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub lane: Priority,
    pub recipient: RecipientId,
    /// Channel target, when the message also goes to a shared channel.
    pub channel: Option<ChannelId>,
    /// Present when this job was created by the sequence scheduler.
    pub sequence: Option<SequenceRef>,
    pub payload: MessagePayload,
    pub status: JobStatus,
    /// One entry per delivery attempt, oldest first.
    pub attempts: Vec<DeliveryAttempt>,
    pub max_attempts: u32,
    /// Unix timestamp when the job was first enqueued.
    pub enqueued_at: u64,
    /// Unix timestamp before which the job must not be dispatched.
    pub not_before: u64,
}

impl Job {
    /// Number of delivery attempts made so far.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }

    /// Record a delivery attempt.
    pub fn record_attempt(&mut self, attempt: DeliveryAttempt) {
        self.attempts.push(attempt);
    }

    /// Whether the job has reached a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the job is eligible for dispatch at `now`.
    #[must_use]
    pub const fn is_due(&self, now: u64) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Retry { .. })
            && now >= self.not_before
    }

    /// Effective priority at `now`, lower served first.
    ///
    /// Starts at the lane rank and decreases by one for every
    /// `AGING_INTERVAL_SECS` the job has been due, so long-waiting
    /// low-priority jobs eventually outrank fresh high-priority ones.
    #[must_use]
    pub fn effective_priority(&self, now: u64) -> i64 {
        let waited = now.saturating_sub(self.not_before);
        let boost = i64::try_from(waited / AGING_INTERVAL_SECS).unwrap_or(i64::MAX);
        self.lane.rank().saturating_sub(boost)
    }
}

#[cfg(test)]
mod tests {
    use cadence_common::types::MessagePayload;

    use super::*;

    fn sample_job(lane: Priority, not_before: u64) -> Job {
        Job {
            id: JobId::generate(),
            lane,
            recipient: RecipientId(7),
            channel: None,
            sequence: None,
            payload: MessagePayload::Text {
                body: "hi".to_string(),
            },
            status: JobStatus::Pending,
            attempts: Vec::new(),
            max_attempts: 5,
            enqueued_at: not_before,
            not_before,
        }
    }

    #[test]
    fn due_respects_not_before_and_status() {
        let mut job = sample_job(Priority::Normal, 100);
        assert!(!job.is_due(99));
        assert!(job.is_due(100));

        job.status = JobStatus::Succeeded;
        assert!(!job.is_due(200));

        job.status = JobStatus::Retry {
            attempts: 1,
            last_error: "timeout".to_string(),
        };
        assert!(job.is_due(200));
    }

    #[test]
    fn aging_promotes_waiting_jobs() {
        let low = sample_job(Priority::Low, 0);
        let critical = sample_job(Priority::Critical, 1200);

        // Fresh: critical outranks low.
        assert!(critical.effective_priority(0) < low.effective_priority(0));

        // Once the low job has waited long enough it outranks a fresh
        // critical job.
        assert!(low.effective_priority(1200) < critical.effective_priority(1200));
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed("blocked".to_string()).is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InFlight { claimed_at: 0 }.is_terminal());
    }
}
