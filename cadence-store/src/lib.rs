pub mod backends;
pub mod config;
pub mod error;
pub mod job;
pub mod sequence;
pub mod traits;
pub mod types;

pub use backends::{FileStore, MemoryCounterStore, MemoryJobStore, MemorySequenceStore};
pub use config::{MemoryStoreConfig, StoreConfig, Stores};
pub use error::{Result, StoreError};
pub use job::{DeliveryAttempt, Job, JobStatus, Priority, SequenceRef};
pub use sequence::{SequenceState, StopReason};
pub use traits::{CounterStore, CounterValue, JobStore, SequenceStore};
pub use types::JobId;
