//! Capability interface for the external chat transport.
//!
//! The engine never talks to a chat API directly; it goes through
//! [`ChatTransport`], implemented by adapters. Adapters are responsible for
//! converting whatever their client library raises into the tagged
//! [`TransportError`] variants below — downstream classification works on
//! these tags and status codes, never on message strings.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ChannelId, MessagePayload, RecipientId};

/// Failure surface of a transport adapter.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The chat API answered with an error status.
    ///
    /// `retry_after` carries the API's flood-control hint in seconds, when
    /// one was present in the response.
    #[error("transport API error {code}: {description}")]
    Api {
        code: u16,
        description: String,
        retry_after: Option<u64>,
    },

    /// The request did not complete within the adapter's deadline.
    #[error("transport timed out: {0}")]
    Timeout(String),

    /// Connection-level failure (DNS, refused connection, broken pipe).
    #[error("transport network error: {0}")]
    Network(String),

    /// The connection closed mid-request.
    #[error("transport connection closed unexpectedly")]
    ConnectionClosed,
}

impl TransportError {
    /// Convenience constructor for API errors without a flood-control hint.
    #[must_use]
    pub fn api(code: u16, description: impl Into<String>) -> Self {
        Self::Api {
            code,
            description: description.into(),
            retry_after: None,
        }
    }
}

/// One-shot send primitives against the chat service.
///
/// Implementations must be cheap to call concurrently; the delivery worker
/// pool shares a single adapter instance.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a message to a recipient's direct chat.
    async fn send(
        &self,
        recipient: RecipientId,
        payload: &MessagePayload,
    ) -> Result<(), TransportError>;

    /// Send a message to a group or channel.
    async fn send_to_channel(
        &self,
        channel: ChannelId,
        payload: &MessagePayload,
    ) -> Result<(), TransportError>;
}
