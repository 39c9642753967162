//! Error types for campaign scheduling.
//!
//! Scheduler failures are configuration or programming errors, not
//! transient conditions — they propagate loudly instead of being retried.

use cadence_common::types::{CampaignId, RecipientId};
use cadence_delivery::EngineError;
use cadence_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CampaignError {
    /// Underlying sequence store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The job queue rejected an operation.
    #[error("Queue error: {0}")]
    Queue(#[from] EngineError),

    /// No delay table is configured for this campaign.
    #[error("Unknown campaign: {0}")]
    UnknownCampaign(CampaignId),

    /// A day outside the campaign's delay table was scheduled.
    #[error("Campaign {campaign} has no day {day}")]
    DayOutOfRange { campaign: CampaignId, day: u32 },

    /// A day was about to be scheduled while another job is outstanding.
    ///
    /// Indicates a bug: the single-flight invariant would be violated.
    #[error("Sequence ({recipient}, {campaign}) already has a pending job")]
    PendingJobExists {
        recipient: RecipientId,
        campaign: CampaignId,
    },

    /// No sequence state exists for this (recipient, campaign).
    #[error("No sequence for ({recipient}, {campaign})")]
    SequenceNotFound {
        recipient: RecipientId,
        campaign: CampaignId,
    },
}
