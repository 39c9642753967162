//! Type definitions for the delivery engine.

use cadence_common::types::{ChannelId, MessagePayload, RecipientId};
use cadence_store::{Priority, SequenceRef};

use crate::error::DeliveryError;

/// Result of one delivery attempt, consumed synchronously by the queue to
/// decide the job's next transition. Not persisted beyond the attempt
/// history and logs.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The transport accepted the message.
    Delivered,
    /// The pre-delivery gate short-circuited the job; the transport was not
    /// contacted.
    Skipped,
    /// The attempt failed with a classified error.
    Failed(DeliveryError),
}

impl DeliveryOutcome {
    /// Whether the job should be considered successfully resolved.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Delivered | Self::Skipped)
    }

    /// Metrics/logging label for this outcome.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Skipped => "skipped",
            Self::Failed(err) => err.kind().as_str(),
        }
    }
}

/// Specification of a job to enqueue.
///
/// The queue assigns the id, timestamps and initial status; callers only
/// describe the work.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub recipient: RecipientId,
    pub channel: Option<ChannelId>,
    pub sequence: Option<SequenceRef>,
    pub payload: MessagePayload,
    pub lane: Priority,
    /// Seconds from now before the job becomes due.
    pub delay_secs: u64,
    /// Override of the policy's max attempts, if any.
    pub max_attempts: Option<u32>,
}

impl NewJob {
    #[must_use]
    pub const fn new(recipient: RecipientId, payload: MessagePayload) -> Self {
        Self {
            recipient,
            channel: None,
            sequence: None,
            payload,
            lane: Priority::Normal,
            delay_secs: 0,
            max_attempts: None,
        }
    }

    #[must_use]
    pub const fn lane(mut self, lane: Priority) -> Self {
        self.lane = lane;
        self
    }

    #[must_use]
    pub const fn delay_secs(mut self, delay_secs: u64) -> Self {
        self.delay_secs = delay_secs;
        self
    }

    #[must_use]
    pub const fn channel(mut self, channel: ChannelId) -> Self {
        self.channel = Some(channel);
        self
    }

    #[must_use]
    pub fn sequence(mut self, sequence: SequenceRef) -> Self {
        self.sequence = Some(sequence);
        self
    }

    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}
