//! Scripted mock transport for integration tests.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use cadence_common::{
    transport::{ChatTransport, TransportError},
    types::{ChannelId, MessagePayload, RecipientId},
};

/// Transport that replays a script of results, then succeeds.
///
/// Each send pops the next scripted result; when the script is exhausted the
/// transport answers `Ok(())`. The call count covers both direct and channel
/// sends.
pub struct MockTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    calls: AtomicU64,
}

impl MockTransport {
    /// A transport that always succeeds.
    pub fn succeeding() -> Self {
        Self::with_script(Vec::new())
    }

    /// A transport that replays `script`, then succeeds.
    pub fn with_script(script: Vec<Result<(), TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU64::new(0),
        }
    }

    /// Total sends attempted through this transport.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_result(&self) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send(
        &self,
        _recipient: RecipientId,
        _payload: &MessagePayload,
    ) -> Result<(), TransportError> {
        self.next_result()
    }

    async fn send_to_channel(
        &self,
        _channel: ChannelId,
        _payload: &MessagePayload,
    ) -> Result<(), TransportError> {
        self.next_result()
    }
}
