//! Message source for scheduled sequence days.

use cadence_common::types::{CampaignId, MessagePayload, RecipientId};

/// Supplies the rendered payload for a campaign day.
///
/// Template text lives outside the engine; implementations typically render
/// a template store or a static per-day table. Must return a payload for
/// every day within the campaign's delay table.
pub trait MessageCatalog: Send + Sync {
    fn payload(&self, campaign: &CampaignId, day: u32, recipient: RecipientId) -> MessagePayload;
}

impl<F> MessageCatalog for F
where
    F: Fn(&CampaignId, u32, RecipientId) -> MessagePayload + Send + Sync,
{
    fn payload(&self, campaign: &CampaignId, day: u32, recipient: RecipientId) -> MessagePayload {
        self(campaign, day, recipient)
    }
}
