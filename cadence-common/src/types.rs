//! Identifier newtypes and message payloads shared across the engine.

use serde::{Deserialize, Serialize};

/// Chat identifier of a message recipient (a user's direct chat).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RecipientId(pub i64);

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat identifier of a group or channel target.
///
/// Present on a job only when the message is addressed to a shared channel
/// rather than (or in addition to) the recipient's direct chat; channel
/// sends are rate limited separately from per-recipient sends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChannelId(pub i64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slug naming a drip campaign (e.g. `verification-nag`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CampaignId(pub String);

impl CampaignId {
    #[must_use]
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CampaignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CampaignId {
    fn from(slug: &str) -> Self {
        Self(slug.to_string())
    }
}

/// Message content handed to the transport, opaque to the queue.
///
/// Template rendering happens upstream; by the time a payload reaches the
/// engine it is final copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Plain text message.
    Text { body: String },
    /// Photo by URL or file reference, with an optional caption.
    Photo { image: String, caption: Option<String> },
}

impl MessagePayload {
    /// Short description of the payload for logs, without the full body.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Photo { .. } => "photo",
        }
    }
}
