//! Storage traits shared by all backends.
//!
//! Backends must tolerate concurrent read-modify-write: `claim_due` and
//! `increment` are atomic operations, not read-then-write sequences.

use async_trait::async_trait;
use cadence_common::types::{CampaignId, RecipientId};

use crate::{
    Result,
    job::Job,
    sequence::SequenceState,
    types::JobId,
};

/// Durable storage for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails if the id already exists.
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Point lookup by id.
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// Replace an existing job record.
    async fn update(&self, job: &Job) -> Result<()>;

    /// Remove a job, returning it if present.
    async fn remove(&self, id: &JobId) -> Result<Option<Job>>;

    /// All jobs, in no particular order.
    async fn list(&self) -> Result<Vec<Job>>;

    /// Atomically claim the best due job at `now`, marking it in-flight.
    ///
    /// "Best" is lowest [`Job::effective_priority`], ties broken by earliest
    /// `not_before`. Two concurrent callers never receive the same job.
    async fn claim_due(&self, now: u64) -> Result<Option<Job>>;

    /// Return stale in-flight claims (older than `claim_timeout_secs`) to
    /// `Pending`, and report which jobs were released.
    async fn release_stalled(&self, now: u64, claim_timeout_secs: u64) -> Result<Vec<JobId>>;
}

/// Durable storage for sequence state, keyed by (recipient, campaign).
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Insert or replace a sequence state.
    async fn put(&self, state: &SequenceState) -> Result<()>;

    /// Point lookup.
    async fn get(
        &self,
        recipient: RecipientId,
        campaign: &CampaignId,
    ) -> Result<Option<SequenceState>>;

    /// All currently active sequences.
    async fn list_active(&self) -> Result<Vec<SequenceState>>;
}

/// Post-increment view of a rate-limit counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterValue {
    /// Count within the current window, including this increment.
    pub count: u64,
    /// Seconds until the current window expires and the count resets.
    pub resets_in_secs: u64,
}

/// Atomic increment-with-expiry primitive backing the rate limiter.
///
/// The memory backend suffices for single-process deployments; multi-process
/// deployments swap in a shared implementation behind the same trait.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter for `key` within its current fixed
    /// window of `window_secs`, returning the post-increment value. A key
    /// whose window has expired resets to zero before the increment.
    async fn increment(&self, key: &str, window_secs: u64) -> Result<CounterValue>;
}
