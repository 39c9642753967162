//! Built-in transport adapters.
//!
//! Production deployments implement [`ChatTransport`] against their chat
//! API client; the console adapter here covers local runs and dry-runs.

use async_trait::async_trait;
use cadence_common::{
    outgoing,
    transport::{ChatTransport, TransportError},
    types::{ChannelId, MessagePayload, RecipientId},
};
use serde::Deserialize;
use std::sync::Arc;

/// Transport selection from configuration.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub enum TransportConfig {
    /// Log every send instead of contacting a chat service.
    #[default]
    Console,
}

impl TransportConfig {
    #[must_use]
    pub fn into_transport(self) -> Arc<dyn ChatTransport> {
        match self {
            Self::Console => Arc::new(ConsoleTransport),
        }
    }
}

/// Adapter that writes sends to the log. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleTransport;

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send(
        &self,
        recipient: RecipientId,
        payload: &MessagePayload,
    ) -> Result<(), TransportError> {
        outgoing!(
            level = INFO,
            "-> recipient {recipient}: {} message",
            payload.kind()
        );
        Ok(())
    }

    async fn send_to_channel(
        &self,
        channel: ChannelId,
        payload: &MessagePayload,
    ) -> Result<(), TransportError> {
        outgoing!(
            level = INFO,
            "-> channel {channel}: {} message",
            payload.kind()
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_transport_always_succeeds() {
        let transport = ConsoleTransport;
        let payload = MessagePayload::Text {
            body: "hello".to_string(),
        };
        transport.send(RecipientId(1), &payload).await.unwrap();
        transport
            .send_to_channel(ChannelId(-100), &payload)
            .await
            .unwrap();
    }
}
