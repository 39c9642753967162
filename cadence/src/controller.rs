use std::{collections::HashMap, sync::Arc, sync::LazyLock};

use cadence_campaign::{CampaignConfig, CampaignGate, SequenceScheduler};
use cadence_common::{Signal, internal, logging, tracing};
use cadence_delivery::DeliveryProcessor;
use cadence_metrics::MetricsConfig;
use cadence_store::{MemoryCounterStore, StoreConfig};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use crate::{catalog::StaticCatalog, transport::TransportConfig};

/// Top-level controller, deserialized from the RON configuration file.
#[derive(Default, Deserialize)]
pub struct Cadence {
    #[serde(default)]
    store: StoreConfig,
    #[serde(alias = "delivery", default)]
    processor: DeliveryProcessor,
    #[serde(alias = "campaigns", default)]
    campaign: CampaignConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    transport: TransportConfig,
    /// Campaign → per-day message bodies (day 1 first).
    #[serde(default)]
    messages: HashMap<String, Vec<String>>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Cadence {
    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if any component fails to
    /// initialise, or if the processor or scheduler exit with an error.
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();
        cadence_metrics::init_metrics(&self.metrics)?;

        let stores = self.store.into_stores()?;
        let counters = Arc::new(MemoryCounterStore::new());
        let transport = self.transport.into_transport();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let gate = Arc::new(CampaignGate::new(stores.sequences.clone()));
        self.processor.init(
            stores.jobs.clone(),
            counters,
            transport,
            Some(gate),
            events_tx,
        )?;

        let scheduler = SequenceScheduler::new(
            stores.sequences,
            self.processor.queue().clone(),
            Arc::new(StaticCatalog::new(std::mem::take(&mut self.messages))),
            self.campaign.clone(),
        );

        internal!("Controller running");

        let ret = tokio::select! {
            r = self.processor.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(Into::into)
            }
            r = scheduler.run(events_rx, SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(Into::into)
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let config: Cadence = ron::from_str(
            r"Cadence (
                store: Memory(()),
            )",
        )
        .unwrap();
        assert!(matches!(config.store, StoreConfig::Memory(_)));
    }

    #[test]
    fn full_config_parses() {
        let config: Cadence = ron::from_str(
            r#"Cadence (
                store: Memory(()),
                transport: Console,
                processor: (
                    process_interval_secs: 2,
                    max_concurrent_deliveries: 4,
                    retry: (
                        max_attempts: 3,
                        base_retry_delay_secs: 30,
                    ),
                    rate_limits: (
                        recipient: ( limit: 5, window_secs: 60 ),
                        fail_open: true,
                    ),
                ),
                campaign: (
                    campaigns: {
                        "verification-nag": ( hours: [1, 24, 24] ),
                    },
                ),
                messages: {
                    "verification-nag": [
                        "Finish your broker verification to unlock signals.",
                        "Still pending: your verification.",
                    ],
                },
                metrics: ( enabled: false ),
            )"#,
        )
        .unwrap();

        assert_eq!(config.processor.process_interval_secs, 2);
        assert_eq!(config.processor.retry.max_attempts, 3);
        assert_eq!(config.campaign.campaigns.len(), 1);
        assert_eq!(config.messages["verification-nag"].len(), 2);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Cadence = ron::from_str("Cadence ()").unwrap();
        assert_eq!(config.processor.process_interval_secs, 5);
        assert!(config.campaign.campaigns.contains_key("verification-nag"));
        assert!(!config.metrics.enabled);
    }
}
