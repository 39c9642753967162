//! Delivery worker: performs one delivery attempt.
//!
//! The worker is stateless between calls — all retry state lives in the job.
//! It never throws across the queue boundary: every attempt resolves to a
//! [`DeliveryOutcome`].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use cadence_common::{outgoing, transport::ChatTransport};
use cadence_store::Job;

use crate::{
    error::{DeliveryError, TransientError},
    rate_limiter::{LimitAction, RateLimitDecision, RateLimiter},
    types::DeliveryOutcome,
};

/// Pre-delivery check consulted before contacting the transport.
///
/// Implemented by the sequence scheduler: a job whose sequence has stopped
/// since it was queued resolves as a no-op success without a send. This is
/// the cancellation mechanism — there is no hard-cancel of in-flight work.
#[async_trait]
pub trait SequenceGate: Send + Sync {
    /// Whether the job should still be delivered.
    async fn should_deliver(&self, job: &Job) -> bool;
}

/// Stateless delivery worker shared by the processor's worker pool.
pub struct DeliveryWorker {
    transport: Arc<dyn ChatTransport>,
    limiter: Arc<RateLimiter>,
    gate: Option<Arc<dyn SequenceGate>>,
    attempt_timeout: Duration,
}

impl std::fmt::Debug for DeliveryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryWorker")
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl DeliveryWorker {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        limiter: Arc<RateLimiter>,
        gate: Option<Arc<dyn SequenceGate>>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            gate,
            attempt_timeout,
        }
    }

    /// Perform one delivery attempt for `job`.
    ///
    /// Order: gate check, rate limits (recipient, then channel when the job
    /// targets one), then exactly one transport call bounded by the attempt
    /// timeout. Failures are classified before being returned.
    pub async fn deliver(&self, job: &Job) -> DeliveryOutcome {
        if let Some(gate) = &self.gate
            && job.sequence.is_some()
            && !gate.should_deliver(job).await
        {
            outgoing!(
                level = DEBUG,
                "Job {} short-circuited by gate, sequence no longer wants it",
                job.id
            );
            return DeliveryOutcome::Skipped;
        }

        if let RateLimitDecision::Denied { retry_after_secs } = self
            .limiter
            .allow(LimitAction::RecipientSend, &job.recipient.to_string())
            .await
        {
            self.record_denied(LimitAction::RecipientSend);
            return DeliveryOutcome::Failed(DeliveryError::RateLimited { retry_after_secs });
        }

        if let Some(channel) = job.channel
            && let RateLimitDecision::Denied { retry_after_secs } = self
                .limiter
                .allow(LimitAction::ChannelSend, &channel.to_string())
                .await
        {
            self.record_denied(LimitAction::ChannelSend);
            return DeliveryOutcome::Failed(DeliveryError::RateLimited { retry_after_secs });
        }

        outgoing!(
            level = DEBUG,
            "Delivering job {} ({}) to {}",
            job.id,
            job.payload.kind(),
            job.recipient
        );

        let send = async {
            match job.channel {
                Some(channel) => self.transport.send_to_channel(channel, &job.payload).await,
                None => self.transport.send(job.recipient, &job.payload).await,
            }
        };

        match tokio::time::timeout(self.attempt_timeout, send).await {
            Ok(Ok(())) => DeliveryOutcome::Delivered,
            Ok(Err(transport_error)) => {
                DeliveryOutcome::Failed(DeliveryError::from(transport_error))
            }
            Err(_) => DeliveryOutcome::Failed(DeliveryError::Transient(TransientError::Timeout(
                format!("no response within {}s", self.attempt_timeout.as_secs()),
            ))),
        }
    }

    fn record_denied(&self, action: LimitAction) {
        if let Some(metrics) = cadence_metrics::metrics() {
            metrics.engine.record_rate_limit_denied(action.as_str());
        }
    }
}
