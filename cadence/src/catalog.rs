//! Static per-day message catalog, filled from configuration.

use std::collections::HashMap;

use cadence_campaign::MessageCatalog;
use cadence_common::types::{CampaignId, MessagePayload, RecipientId};

/// Catalog mapping campaign → per-day message bodies.
///
/// Days without configured copy fall back to a generic reminder, so a
/// sparsely configured campaign still delivers every scheduled day.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    messages: HashMap<String, Vec<String>>,
}

impl StaticCatalog {
    #[must_use]
    pub const fn new(messages: HashMap<String, Vec<String>>) -> Self {
        Self { messages }
    }
}

impl MessageCatalog for StaticCatalog {
    fn payload(&self, campaign: &CampaignId, day: u32, _recipient: RecipientId) -> MessagePayload {
        let body = usize::try_from(day.saturating_sub(1))
            .ok()
            .and_then(|index| self.messages.get(campaign.as_str())?.get(index))
            .cloned()
            .unwrap_or_else(|| format!("Reminder: you still have steps to finish (day {day})"));

        MessagePayload::Text { body }
    }
}
