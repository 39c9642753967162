//! The sequence scheduler and its pre-delivery gate.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use cadence_common::{
    internal,
    time::unix_now,
    types::{CampaignId, RecipientId},
};
use cadence_delivery::{JobEvent, JobQueue, NewJob, SequenceGate, Transition};
use cadence_store::{Job, SequenceRef, SequenceState, SequenceStore, StopReason};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{catalog::MessageCatalog, delay::DelayTable, error::CampaignError};

fn default_campaigns() -> HashMap<String, DelayTable> {
    let mut campaigns = HashMap::new();
    campaigns.insert("verification-nag".to_string(), DelayTable::default());
    campaigns
}

/// Campaign configuration: one delay table per campaign slug.
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignConfig {
    #[serde(default = "default_campaigns")]
    pub campaigns: HashMap<String, DelayTable>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            campaigns: default_campaigns(),
        }
    }
}

/// Drives per-(recipient, campaign) sequences.
///
/// Lazily creates one job per day: day k+1's job is created only after day
/// k's job reaches a terminal outcome, which is what guarantees per-recipient
/// ordering — the queue itself makes no cross-job ordering promises.
pub struct SequenceScheduler {
    sequences: Arc<dyn SequenceStore>,
    queue: JobQueue,
    catalog: Arc<dyn MessageCatalog>,
    config: CampaignConfig,
}

impl std::fmt::Debug for SequenceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SequenceScheduler {
    #[must_use]
    pub fn new(
        sequences: Arc<dyn SequenceStore>,
        queue: JobQueue,
        catalog: Arc<dyn MessageCatalog>,
        config: CampaignConfig,
    ) -> Self {
        Self {
            sequences,
            queue,
            catalog,
            config,
        }
    }

    fn table(&self, campaign: &CampaignId) -> Result<&DelayTable, CampaignError> {
        self.config
            .campaigns
            .get(campaign.as_str())
            .ok_or_else(|| CampaignError::UnknownCampaign(campaign.clone()))
    }

    /// Enter `recipient` into `campaign`, scheduling day 1.
    ///
    /// Re-entering while a sequence is active is a no-op. A stopped or
    /// completed sequence restarts from day 1.
    ///
    /// # Errors
    /// Returns an error for unknown campaigns or store/queue failures.
    pub async fn enter(
        &self,
        recipient: RecipientId,
        campaign: &CampaignId,
    ) -> Result<(), CampaignError> {
        self.table(campaign)?;

        if let Some(existing) = self.sequences.get(recipient, campaign).await?
            && existing.active
        {
            tracing::debug!(
                recipient = %recipient,
                campaign = %campaign,
                day = existing.day,
                "Sequence already active, ignoring re-entry"
            );
            return Ok(());
        }

        let mut state = SequenceState::enter(recipient, campaign.clone(), unix_now());
        self.schedule_day(&mut state, 1).await?;
        self.sequences.put(&state).await?;

        internal!(
            level = INFO,
            "Recipient {recipient} entered campaign {campaign}"
        );
        Ok(())
    }

    /// Stop the sequence for `recipient` in `campaign`.
    ///
    /// Effective even with a job already queued or in flight: the job stays
    /// in the queue, and the pre-delivery gate resolves it as a no-op
    /// success without contacting the transport.
    ///
    /// # Errors
    /// Returns an error if no sequence exists or the store fails.
    pub async fn stop(
        &self,
        recipient: RecipientId,
        campaign: &CampaignId,
        reason: StopReason,
    ) -> Result<(), CampaignError> {
        let mut state = self
            .sequences
            .get(recipient, campaign)
            .await?
            .ok_or_else(|| CampaignError::SequenceNotFound {
                recipient,
                campaign: campaign.clone(),
            })?;

        state.stop(reason);
        self.sequences.put(&state).await?;

        internal!(
            level = INFO,
            "Sequence ({recipient}, {campaign}) stopped: {reason}"
        );
        Ok(())
    }

    /// React to a terminal job outcome, advancing or stopping the sequence.
    ///
    /// # Errors
    /// Returns an error on store/queue failures — these indicate bugs or
    /// outages, not transient delivery conditions.
    pub async fn handle_event(&self, event: &JobEvent) -> Result<(), CampaignError> {
        let Some(sequence_ref) = &event.sequence else {
            return Ok(()); // not a sequence job
        };

        let Some(mut state) = self
            .sequences
            .get(event.recipient, &sequence_ref.campaign)
            .await?
        else {
            tracing::warn!(
                recipient = %event.recipient,
                campaign = %sequence_ref.campaign,
                "Outcome for unknown sequence, ignoring"
            );
            return Ok(());
        };

        // A stale event (e.g. for a job from a previous run of the
        // sequence) must not advance the current one.
        if state.pending_job.as_ref() != Some(&event.job_id) {
            tracing::debug!(
                recipient = %event.recipient,
                campaign = %sequence_ref.campaign,
                job_id = %event.job_id,
                "Outcome does not match the pending job, ignoring"
            );
            return Ok(());
        }

        state.pending_job = None;

        match &event.transition {
            Transition::Succeeded => {
                state.last_sent_at = Some(unix_now());

                if !state.active {
                    // Stopped while the job was in flight; nothing further.
                } else if state.day < self.table(&state.campaign)?.days() {
                    let next_day = state.day + 1;
                    self.schedule_day(&mut state, next_day).await?;
                } else {
                    state.stop(StopReason::Completed);
                    internal!(
                        level = INFO,
                        "Sequence ({}, {}) completed after day {}",
                        state.recipient,
                        state.campaign,
                        state.day
                    );
                }
            }

            Transition::Skipped => {
                // Gate short-circuit: the sequence was already stopped.
            }

            Transition::Exhausted { .. } | Transition::PermanentFailure { .. } => {
                state.stop(StopReason::Exhausted);
                tracing::error!(
                    recipient = %state.recipient,
                    campaign = %state.campaign,
                    day = state.day,
                    transition = ?event.transition,
                    "Sequence abandoned after terminal delivery failure"
                );
            }

            Transition::RetryScheduled { .. }
            | Transition::RateLimitDeferred { .. }
            | Transition::AlreadyTerminal => {
                // Non-terminal or duplicate; nothing to do.
            }
        }

        self.sequences.put(&state).await?;
        Ok(())
    }

    /// Create day `day`'s job for this sequence.
    ///
    /// Never speculative: callers invoke this only at entry (day 1) or after
    /// the previous day's job went terminal.
    async fn schedule_day(
        &self,
        state: &mut SequenceState,
        day: u32,
    ) -> Result<(), CampaignError> {
        if state.pending_job.is_some() {
            return Err(CampaignError::PendingJobExists {
                recipient: state.recipient,
                campaign: state.campaign.clone(),
            });
        }

        let delay_secs = self.table(&state.campaign)?.delay_secs(day).ok_or_else(|| {
            CampaignError::DayOutOfRange {
                campaign: state.campaign.clone(),
                day,
            }
        })?;

        let payload = self.catalog.payload(&state.campaign, day, state.recipient);
        let job_id = self
            .queue
            .enqueue(
                NewJob::new(state.recipient, payload)
                    .sequence(SequenceRef {
                        campaign: state.campaign.clone(),
                        day,
                    })
                    .delay_secs(delay_secs),
            )
            .await?;

        state.day = day;
        state.pending_job = Some(job_id);

        tracing::debug!(
            recipient = %state.recipient,
            campaign = %state.campaign,
            day,
            delay_secs,
            "Scheduled sequence day"
        );
        Ok(())
    }

    /// Consume terminal job events until the channel closes or shutdown.
    ///
    /// # Errors
    /// Propagates `handle_event` failures; the scheduler does not swallow
    /// its own errors.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<JobEvent>,
        mut shutdown: tokio::sync::broadcast::Receiver<cadence_common::Signal>,
    ) -> Result<(), CampaignError> {
        internal!("Sequence scheduler starting");

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(&event).await?,
                        None => break,
                    }
                }
                _ = shutdown.recv() => {
                    internal!("Sequence scheduler received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Pre-delivery check backed by the sequence store.
///
/// A job whose sequence is no longer active — or whose sequence now tracks
/// a different job — must not be delivered. Store failures fail open
/// (deliver) to keep the pipeline moving; the scheduler's stale-event check
/// keeps state consistent either way.
pub struct CampaignGate {
    sequences: Arc<dyn SequenceStore>,
}

impl std::fmt::Debug for CampaignGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignGate").finish_non_exhaustive()
    }
}

impl CampaignGate {
    #[must_use]
    pub fn new(sequences: Arc<dyn SequenceStore>) -> Self {
        Self { sequences }
    }
}

#[async_trait]
impl SequenceGate for CampaignGate {
    async fn should_deliver(&self, job: &Job) -> bool {
        let Some(sequence_ref) = &job.sequence else {
            return true;
        };

        match self
            .sequences
            .get(job.recipient, &sequence_ref.campaign)
            .await
        {
            Ok(Some(state)) => state.active && state.pending_job.as_ref() == Some(&job.id),
            // No state yet: the job was enqueued moments before its state
            // record landed. Deliver rather than drop.
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    error = %e,
                    "Sequence store unavailable during gate check, delivering anyway"
                );
                true
            }
        }
    }
}
