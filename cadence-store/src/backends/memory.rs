//! In-memory backing stores.
//!
//! These implementations keep records in `DashMap`s for lock-free concurrent
//! access. They are the default for tests and acceptable for single-process
//! deployments that can tolerate losing queue state on restart.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_common::{
    time::unix_now,
    types::{CampaignId, RecipientId},
};
use dashmap::DashMap;

use crate::{
    Result, StoreError,
    job::{Job, JobStatus},
    sequence::SequenceState,
    traits::{CounterStore, CounterValue, JobStore, SequenceStore},
    types::JobId,
};

/// In-memory job store.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<DashMap<JobId, Job>>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        if self.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.get(id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, job: &Job) -> Result<()> {
        match self.jobs.get_mut(&job.id) {
            Some(mut entry) => {
                *entry.value_mut() = job.clone();
                Ok(())
            }
            None => Err(StoreError::JobNotFound(job.id.clone())),
        }
    }

    async fn remove(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.remove(id).map(|(_, job)| job))
    }

    async fn list(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn claim_due(&self, now: u64) -> Result<Option<Job>> {
        // Selection and claim are separate steps, so re-check eligibility
        // under the exclusive entry lock before marking in-flight. A
        // candidate that another worker claimed in between is skipped and
        // selection runs again.
        loop {
            let candidate = self
                .jobs
                .iter()
                .filter(|entry| entry.value().is_due(now))
                .map(|entry| {
                    let job = entry.value();
                    (job.effective_priority(now), job.not_before, job.id.clone())
                })
                .min();

            let Some((_, _, id)) = candidate else {
                return Ok(None);
            };

            if let Some(mut entry) = self.jobs.get_mut(&id) {
                let job = entry.value_mut();
                if job.is_due(now) {
                    job.status = JobStatus::InFlight { claimed_at: now };
                    return Ok(Some(job.clone()));
                }
            }
        }
    }

    async fn release_stalled(&self, now: u64, claim_timeout_secs: u64) -> Result<Vec<JobId>> {
        let mut released = Vec::new();

        for mut entry in self.jobs.iter_mut() {
            let job = entry.value_mut();
            if let JobStatus::InFlight { claimed_at } = job.status
                && now.saturating_sub(claimed_at) >= claim_timeout_secs
            {
                job.status = JobStatus::Pending;
                released.push(job.id.clone());
            }
        }

        Ok(released)
    }
}

/// In-memory sequence store.
#[derive(Debug, Clone, Default)]
pub struct MemorySequenceStore {
    sequences: Arc<DashMap<(RecipientId, CampaignId), SequenceState>>,
}

impl MemorySequenceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for MemorySequenceStore {
    async fn put(&self, state: &SequenceState) -> Result<()> {
        self.sequences.insert(
            (state.recipient, state.campaign.clone()),
            state.clone(),
        );
        Ok(())
    }

    async fn get(
        &self,
        recipient: RecipientId,
        campaign: &CampaignId,
    ) -> Result<Option<SequenceState>> {
        Ok(self
            .sequences
            .get(&(recipient, campaign.clone()))
            .map(|entry| entry.value().clone()))
    }

    async fn list_active(&self) -> Result<Vec<SequenceState>> {
        Ok(self
            .sequences
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[derive(Debug)]
struct WindowSlot {
    window_start: u64,
    count: u64,
}

/// In-memory fixed-window counter store.
///
/// The `DashMap` entry guard makes each increment a single atomic
/// read-modify-write; concurrent callers for the same key serialize on the
/// entry lock, never on a full-map lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<DashMap<String, WindowSlot>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop counters whose window expired before `now`.
    ///
    /// Expired slots are also reset lazily on their next increment; this
    /// sweep only bounds memory for identifiers that never return. Run it
    /// from a periodic task in long-lived deployments.
    pub fn reap_expired(&self, now: u64, window_secs: u64) {
        self.counters
            .retain(|_, slot| now < slot.window_start + window_secs);
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window_secs: u64) -> Result<CounterValue> {
        let now = unix_now();
        let mut slot = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| WindowSlot {
                window_start: now,
                count: 0,
            });

        // The count resets exactly at window expiry.
        if now >= slot.window_start + window_secs {
            slot.window_start = now;
            slot.count = 0;
        }

        slot.count += 1;

        Ok(CounterValue {
            count: slot.count,
            resets_in_secs: (slot.window_start + window_secs).saturating_sub(now),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use cadence_common::types::MessagePayload;

    use super::*;
    use crate::job::Priority;

    fn sample_job(not_before: u64, lane: Priority) -> Job {
        Job {
            id: JobId::generate(),
            lane,
            recipient: RecipientId(1),
            channel: None,
            sequence: None,
            payload: MessagePayload::Text {
                body: "hello".to_string(),
            },
            status: JobStatus::Pending,
            attempts: Vec::new(),
            max_attempts: 5,
            enqueued_at: not_before,
            not_before,
        }
    }

    #[tokio::test]
    async fn insert_get_update_remove() {
        let store = MemoryJobStore::new();
        let mut job = sample_job(0, Priority::Normal);

        store.insert(&job).await.unwrap();
        assert!(matches!(
            store.insert(&job).await,
            Err(StoreError::AlreadyExists(_))
        ));

        job.status = JobStatus::Succeeded;
        store.update(&job).await.unwrap();
        assert_eq!(
            store.get(&job.id).await.unwrap().unwrap().status,
            JobStatus::Succeeded
        );

        assert!(store.remove(&job.id).await.unwrap().is_some());
        assert!(store.get(&job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_due_prefers_higher_priority() {
        let store = MemoryJobStore::new();
        let low = sample_job(0, Priority::Low);
        let critical = sample_job(0, Priority::Critical);
        store.insert(&low).await.unwrap();
        store.insert(&critical).await.unwrap();

        let claimed = store.claim_due(10).await.unwrap().unwrap();
        assert_eq!(claimed.id, critical.id);
        assert!(matches!(claimed.status, JobStatus::InFlight { .. }));

        let claimed = store.claim_due(10).await.unwrap().unwrap();
        assert_eq!(claimed.id, low.id);

        assert!(store.claim_due(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_due_skips_future_jobs() {
        let store = MemoryJobStore::new();
        let job = sample_job(1000, Priority::Normal);
        store.insert(&job).await.unwrap();

        assert!(store.claim_due(999).await.unwrap().is_none());
        assert!(store.claim_due(1000).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_job() {
        let store = MemoryJobStore::new();
        for _ in 0..20 {
            store.insert(&sample_job(0, Priority::Normal)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.claim_due(10).await }));
        }

        let mut claimed = std::collections::HashSet::new();
        let mut count = 0;
        for handle in handles {
            if let Some(job) = handle.await.unwrap().unwrap() {
                assert!(claimed.insert(job.id), "job claimed twice");
                count += 1;
            }
        }
        assert_eq!(count, 20);
    }

    #[tokio::test]
    async fn release_stalled_returns_old_claims() {
        let store = MemoryJobStore::new();
        let job = sample_job(0, Priority::Normal);
        store.insert(&job).await.unwrap();

        let claimed = store.claim_due(100).await.unwrap().unwrap();
        assert!(store
            .release_stalled(200, 300)
            .await
            .unwrap()
            .is_empty());

        let released = store.release_stalled(500, 300).await.unwrap();
        assert_eq!(released, vec![claimed.id.clone()]);
        assert_eq!(
            store.get(&claimed.id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn sequence_store_roundtrip() {
        let store = MemorySequenceStore::new();
        let campaign = CampaignId::new("nag");
        let state = SequenceState::enter(RecipientId(9), campaign.clone(), 0);

        store.put(&state).await.unwrap();
        let loaded = store.get(RecipientId(9), &campaign).await.unwrap().unwrap();
        assert_eq!(loaded, state);

        assert_eq!(store.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn counter_increments_within_window() {
        let store = MemoryCounterStore::new();

        for expected in 1..=5 {
            let value = store.increment("send:1", 60).await.unwrap();
            assert_eq!(value.count, expected);
            assert!(value.resets_in_secs <= 60);
        }
    }

    #[tokio::test]
    async fn counter_reap_drops_expired_windows() {
        let store = MemoryCounterStore::new();
        store.increment("send:1", 60).await.unwrap();
        store.increment("send:1", 60).await.unwrap();

        // Window still live: reap keeps the slot and the count continues.
        store.reap_expired(unix_now(), 60);
        assert_eq!(store.increment("send:1", 60).await.unwrap().count, 3);

        // Past expiry the slot is dropped and counting starts over.
        store.reap_expired(unix_now() + 120, 60);
        assert_eq!(store.increment("send:1", 60).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn counter_keys_are_independent() {
        let store = MemoryCounterStore::new();
        store.increment("send:1", 60).await.unwrap();
        store.increment("send:1", 60).await.unwrap();

        let other = store.increment("send:2", 60).await.unwrap();
        assert_eq!(other.count, 1);
    }
}
