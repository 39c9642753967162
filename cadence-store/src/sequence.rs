//! Per-(recipient, campaign) drip-sequence state.

use cadence_common::types::{CampaignId, RecipientId};
use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Why a sequence stopped advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The recipient converted (e.g. completed verification).
    Converted,
    /// The recipient opted out.
    Unsubscribed,
    /// The sequence reached its final day.
    Completed,
    /// A day's job failed terminally and the sequence was abandoned.
    Exhausted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Converted => "converted",
            Self::Unsubscribed => "unsubscribed",
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// State machine record for one recipient's progress through one campaign.
///
/// Invariant: at most one non-terminal job exists per sequence at any time
/// (`pending_job` is its id); `day` only advances after that job reaches a
/// terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub recipient: RecipientId,
    pub campaign: CampaignId,
    /// Last day whose job has been created (0 = entered, nothing scheduled
    /// past day 1 yet).
    pub day: u32,
    /// False once stopped or completed; inactive sequences never schedule.
    pub active: bool,
    /// Unix timestamp of the last confirmed send.
    pub last_sent_at: Option<u64>,
    /// The outstanding job for the current day, if any.
    pub pending_job: Option<JobId>,
    /// Unix timestamp of campaign entry.
    pub started_at: u64,
    /// Set when the sequence stops, for operator visibility.
    pub stopped: Option<StopReason>,
}

impl SequenceState {
    /// Fresh state at campaign entry.
    #[must_use]
    pub const fn enter(recipient: RecipientId, campaign: CampaignId, now: u64) -> Self {
        Self {
            recipient,
            campaign,
            day: 0,
            active: true,
            last_sent_at: None,
            pending_job: None,
            started_at: now,
            stopped: None,
        }
    }

    /// Mark the sequence stopped. Idempotent: the first reason wins.
    pub fn stop(&mut self, reason: StopReason) {
        if self.active {
            self.active = false;
            self.stopped = Some(reason);
        }
    }
}
