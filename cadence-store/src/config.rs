//! Runtime selection of the backing store through configuration.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    FileStore, MemoryJobStore, MemorySequenceStore, Result,
    traits::{JobStore, SequenceStore},
};

/// Configuration for the persistence backend.
///
/// # Examples
///
/// File-backed store in RON config (production — survives restarts):
/// ```ron
/// Cadence (
///     store: File((
///         path: "/var/lib/cadence",
///     )),
/// )
/// ```
///
/// Memory-backed store for testing:
/// ```ron
/// Cadence (
///     store: Memory(()),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    /// File-based store (production).
    File(FileStore),
    /// Memory-based store (testing/development).
    Memory(MemoryStoreConfig),
}

/// Configuration for the memory-backed store. Currently empty; kept as a
/// struct so future knobs deserialize in place.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct MemoryStoreConfig {}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File(FileStore::default())
    }
}

/// The initialized job and sequence stores as trait objects.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub sequences: Arc<dyn SequenceStore>,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

impl StoreConfig {
    /// Initialize the configured backend and return it as trait objects.
    ///
    /// The file backend creates its directories and cleans up crash
    /// leftovers here, so misconfiguration fails at startup.
    ///
    /// # Errors
    /// Returns an error if file store initialization fails (directory
    /// creation, permissions, etc.)
    pub fn into_stores(self) -> Result<Stores> {
        match self {
            Self::File(store) => {
                store.init()?;
                Ok(Stores {
                    jobs: Arc::new(store.clone()),
                    sequences: Arc::new(store),
                })
            }
            Self::Memory(_) => Ok(Stores {
                jobs: Arc::new(MemoryJobStore::new()),
                sequences: Arc::new(MemorySequenceStore::new()),
            }),
        }
    }
}
