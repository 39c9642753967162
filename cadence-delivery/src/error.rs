//! Typed error handling and transport-failure classification.
//!
//! This module is the single authority that turns raw [`TransportError`]s
//! into the closed delivery taxonomy:
//! - Rate limited — retry after the hint, attempt budget untouched
//! - Transient — retry with backoff, bounded attempts
//! - Recipient / Permission — permanent, never retried
//! - Unknown — retry under a stricter cap
//!
//! No other component re-interprets transport failures.

use thiserror::Error;

use cadence_common::transport::TransportError;
use cadence_store::{JobId, StoreError};

/// Fallback flood-control wait when the transport gives no hint.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Classified delivery failure.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport (or the local limiter) refused the send for pacing
    /// reasons. Does not count toward the attempt budget.
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Temporary failure that can be retried with backoff.
    #[error("Transient failure: {0}")]
    Transient(#[from] TransientError),

    /// The recipient cannot be reached, now or later. Never retried.
    #[error("Recipient unreachable: {0}")]
    Recipient(#[from] RecipientError),

    /// The bot lacks authorization. Never retried automatically; surfaced
    /// for operator action.
    #[error("Permission failure: {0}")]
    Permission(#[from] PermissionError),

    /// Unanticipated failure shape. Retried under a stricter cap so an
    /// unmapped error cannot loop forever.
    #[error("Unclassified transport failure: {0}")]
    Unknown(String),
}

/// Temporary failures that should be retried with exponential backoff.
#[derive(Debug, Error)]
pub enum TransientError {
    /// Connection-level failure (DNS, refused, broken pipe).
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt did not complete within its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The chat service reported a server-side failure.
    #[error("Service error {code}: {description}")]
    Service { code: u16, description: String },

    /// The connection closed mid-request.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

/// Recipient-not-reachable failures. Never retried.
#[derive(Debug, Error)]
pub enum RecipientError {
    /// The recipient blocked the bot.
    #[error("Recipient blocked the bot: {0}")]
    Blocked(String),

    /// Unknown recipient or chat id.
    #[error("Recipient or chat not found: {0}")]
    NotFound(String),

    /// The recipient's account no longer exists.
    #[error("Recipient account deactivated: {0}")]
    Deactivated(String),
}

/// Authorization failures. Never retried automatically.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Bad or revoked credentials, or missing rights on the target chat.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

/// Tag identifying the class of a delivery failure, used in outcomes,
/// attempt history and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    TransientNetwork,
    PermanentRecipient,
    PermanentPermission,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::TransientNetwork => "transient_network",
            Self::PermanentRecipient => "permanent_recipient",
            Self::PermanentPermission => "permanent_permission",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DeliveryError {
    /// The taxonomy tag for this failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Transient(_) => ErrorKind::TransientNetwork,
            Self::Recipient(_) => ErrorKind::PermanentRecipient,
            Self::Permission(_) => ErrorKind::PermanentPermission,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Returns `true` if this failure may be retried at all.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Transient(_) | Self::Unknown(_)
        )
    }

    /// Returns `true` if this failure is permanent.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Recipient(_) | Self::Permission(_))
    }

    /// The flood-control wait, for rate-limited failures.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Classify a raw transport failure.
///
/// Mapping rules, in priority order:
/// 1. 429 → rate limited, with the transport's hint or a 60s default
/// 2. 403/404/410 → recipient unreachable (blocked / not found /
///    deactivated)
/// 3. 401 → permission failure
/// 4. 5xx, timeouts, network failures, closed connections → transient
/// 5. anything else → unknown
impl From<TransportError> for DeliveryError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Api {
                code: 429,
                retry_after,
                ..
            } => Self::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },

            TransportError::Api {
                code: 403,
                description,
                ..
            } => Self::Recipient(RecipientError::Blocked(description)),

            TransportError::Api {
                code: 404,
                description,
                ..
            } => Self::Recipient(RecipientError::NotFound(description)),

            TransportError::Api {
                code: 410,
                description,
                ..
            } => Self::Recipient(RecipientError::Deactivated(description)),

            TransportError::Api {
                code: 401,
                description,
                ..
            } => Self::Permission(PermissionError::Unauthorized(description)),

            TransportError::Api {
                code, description, ..
            } if (500..600).contains(&code) => Self::Transient(TransientError::Service {
                code,
                description,
            }),

            TransportError::Timeout(msg) => Self::Transient(TransientError::Timeout(msg)),

            TransportError::Network(msg) => Self::Transient(TransientError::Network(msg)),

            TransportError::ConnectionClosed => {
                Self::Transient(TransientError::ConnectionClosed)
            }

            TransportError::Api {
                code, description, ..
            } => Self::Unknown(format!("{code} {description}")),
        }
    }
}

/// Infrastructure errors from the queue and processor.
///
/// These are not delivery failures — they indicate a bug, misconfiguration
/// or store outage, and propagate loudly instead of entering retry logic.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Job not found in the queue.
    #[error("Job not found in queue: {0}")]
    JobNotFound(JobId),

    /// Engine component used before `init()`.
    #[error("Engine not initialized: {0}")]
    NotInitialized(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_takes_hint() {
        let err: DeliveryError = TransportError::Api {
            code: 429,
            description: "Too Many Requests".to_string(),
            retry_after: Some(17),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after_secs(), Some(17));
    }

    #[test]
    fn test_rate_limited_default_hint() {
        let err: DeliveryError = TransportError::api(429, "flood control").into();
        assert_eq!(err.retry_after_secs(), Some(DEFAULT_RETRY_AFTER_SECS));
    }

    #[test]
    fn test_recipient_codes_are_permanent() {
        for code in [403, 404, 410] {
            let err: DeliveryError = TransportError::api(code, "gone").into();
            assert_eq!(err.kind(), ErrorKind::PermanentRecipient, "code {code}");
            assert!(err.is_permanent());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_unauthorized_is_permission() {
        let err: DeliveryError = TransportError::api(401, "token revoked").into();
        assert_eq!(err.kind(), ErrorKind::PermanentPermission);
        assert!(err.is_permanent());
    }

    #[test]
    fn test_5xx_is_transient() {
        let err: DeliveryError = TransportError::api(502, "bad gateway").into();
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(err.is_retryable());
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_timeout_and_network_are_transient() {
        let timeout: DeliveryError = TransportError::Timeout("30s elapsed".to_string()).into();
        assert_eq!(timeout.kind(), ErrorKind::TransientNetwork);

        let network: DeliveryError =
            TransportError::Network("connection refused".to_string()).into();
        assert_eq!(network.kind(), ErrorKind::TransientNetwork);

        let closed: DeliveryError = TransportError::ConnectionClosed.into();
        assert_eq!(closed.kind(), ErrorKind::TransientNetwork);
    }

    #[test]
    fn test_unmapped_code_is_unknown() {
        let err: DeliveryError = TransportError::api(418, "teapot").into();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("418"));
    }

    #[test]
    fn test_error_display() {
        let err = DeliveryError::Recipient(RecipientError::Blocked(
            "bot was blocked by the user".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "Recipient unreachable: Recipient blocked the bot: bot was blocked by the user"
        );
    }
}
