//! Deferred delivery engine for outbound chat notifications
//!
//! This crate provides functionality to:
//! - Queue time-displaced delivery jobs with priority and backoff
//! - Rate limit sends per recipient and per channel
//! - Classify transport failures into retryable vs. permanent
//! - Dispatch due jobs through a bounded worker pool

mod error;
pub mod processor;
pub mod queue;
mod rate_limiter;
mod types;
mod worker;

// Re-export error types
pub use error::{
    DeliveryError, EngineError, ErrorKind, PermissionError, RecipientError, TransientError,
};
// Re-export core types
pub use processor::DeliveryProcessor;
pub use queue::{JobEvent, JobQueue, QueueCensus, Transition, retry::RetryPolicy};
pub use rate_limiter::{
    LimitAction, LimitRule, RateLimitConfig, RateLimitDecision, RateLimiter,
};
pub use types::{DeliveryOutcome, NewJob};
pub use worker::{DeliveryWorker, SequenceGate};
