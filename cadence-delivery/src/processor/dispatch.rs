//! Dispatch of due jobs to the worker pool, and queue housekeeping.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::{
    error::EngineError,
    queue::JobQueue,
    worker::DeliveryWorker,
};

/// Drain all currently due jobs through the worker pool.
///
/// Claims jobs one at a time (each claim is atomic at the store) and runs up
/// to `max_concurrent` deliveries in parallel, refilling the pool as tasks
/// finish. Returns the number of jobs dispatched this round.
///
/// No locks are held across transport calls: each task owns its claimed job,
/// and all shared state lives behind the queue's store.
///
/// # Errors
/// Returns an error if claiming from the store fails.
pub(crate) async fn process_due_internal(
    queue: &JobQueue,
    worker: &Arc<DeliveryWorker>,
    max_concurrent: usize,
) -> Result<usize, EngineError> {
    let mut join_set: JoinSet<()> = JoinSet::new();
    let mut dispatched = 0usize;
    let mut drained = false;

    loop {
        // Keep the pool full while due jobs remain.
        while !drained && join_set.len() < max_concurrent {
            match queue.dequeue_due().await? {
                Some(job) => {
                    dispatched += 1;
                    let queue = queue.clone();
                    let worker = Arc::clone(worker);

                    join_set.spawn(async move {
                        let outcome = worker.deliver(&job).await;
                        if let Err(e) = queue.complete(&job.id, &outcome).await {
                            tracing::error!(
                                job_id = %job.id,
                                error = %e,
                                "Failed to record delivery outcome"
                            );
                        }
                    });
                }
                None => {
                    drained = true;
                }
            }
        }

        // An empty pool here means the fill loop exited via `drained`.
        if join_set.join_next().await.is_none() {
            break;
        }
    }

    Ok(dispatched)
}

/// Periodic queue maintenance: stalled-claim recovery, garbage collection
/// and queue gauges.
///
/// # Errors
/// Returns an error if any store sweep fails.
pub(crate) async fn housekeeping_internal(
    queue: &JobQueue,
    claim_timeout_secs: u64,
    completed_retention_secs: u64,
) -> Result<(), EngineError> {
    queue.release_stalled(claim_timeout_secs).await?;
    queue.collect_garbage(completed_retention_secs).await?;

    if let Some(metrics) = cadence_metrics::metrics() {
        let census = queue.census().await?;
        metrics
            .engine
            .update_queue_sizes(census.pending, census.in_flight, census.retry);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use cadence_common::{
        transport::{ChatTransport, TransportError},
        types::{ChannelId, MessagePayload, RecipientId},
    };
    use cadence_store::{JobStatus, MemoryCounterStore, MemoryJobStore};

    use super::*;
    use crate::{
        queue::retry::RetryPolicy,
        rate_limiter::{LimitRule, RateLimitConfig, RateLimiter},
        types::NewJob,
    };

    struct CountingTransport {
        calls: AtomicU64,
    }

    #[async_trait]
    impl ChatTransport for CountingTransport {
        async fn send(
            &self,
            _recipient: RecipientId,
            _payload: &MessagePayload,
        ) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send_to_channel(
            &self,
            _channel: ChannelId,
            _payload: &MessagePayload,
        ) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatches_all_due_jobs() {
        let queue = JobQueue::new(
            Arc::new(MemoryJobStore::new()),
            RetryPolicy::default(),
        );
        let transport = Arc::new(CountingTransport {
            calls: AtomicU64::new(0),
        });
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig {
                // Distinct recipients, generous rule: nothing is denied.
                recipient: LimitRule {
                    limit: 100,
                    window_secs: 60,
                },
                ..RateLimitConfig::default()
            },
            Arc::new(MemoryCounterStore::new()),
        ));
        let worker = Arc::new(DeliveryWorker::new(
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
            limiter,
            None,
            Duration::from_secs(5),
        ));

        let mut ids = Vec::new();
        for i in 0..12 {
            ids.push(
                queue
                    .enqueue(NewJob::new(
                        RecipientId(i),
                        MessagePayload::Text {
                            body: "hi".to_string(),
                        },
                    ))
                    .await
                    .unwrap(),
            );
        }

        let dispatched = process_due_internal(&queue, &worker, 3).await.unwrap();
        assert_eq!(dispatched, 12);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 12);

        for id in ids {
            let job = queue.get(&id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Succeeded);
        }
    }
}
