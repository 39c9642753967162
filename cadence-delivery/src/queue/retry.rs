//! Retry policy: exponential backoff with jitter, bounded attempts.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Calculate a backoff delay using exponential growth with jitter
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max_delay) * (1 ± jitter)`
///
/// # Arguments
/// * `attempt` - The attempt number (1-indexed)
/// * `base_delay_secs` - Base delay in seconds (e.g., 60 for 1 minute)
/// * `max_delay_secs` - Maximum delay in seconds (e.g., 3600 for 1 hour)
/// * `jitter_factor` - Jitter factor (e.g., 0.2 for ±20%)
#[must_use]
pub fn calculate_backoff_secs(
    attempt: u32,
    base_delay_secs: u64,
    max_delay_secs: u64,
    jitter_factor: f64,
) -> u64 {
    // Use saturating operations to prevent overflow
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        // 2^63 would overflow, use max_delay directly
        max_delay_secs
    } else {
        let multiplier = 1u64 << exponent; // 2^exponent
        base_delay_secs
            .saturating_mul(multiplier)
            .min(max_delay_secs)
    };

    // Apply jitter: delay * (1 ± jitter_factor)
    // Intentional precision loss and casting for randomization
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered_delay = {
        let jitter_range = (delay as f64) * jitter_factor;
        if jitter_range <= 0.0 {
            delay as f64
        } else {
            let mut rng = rand::rng();
            let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
            ((delay as f64) + jitter).max(0.0)
        }
    } as u64;

    jittered_delay
}

/// Retry policy configuration for the job queue.
///
/// Owned centrally by the queue: workers report outcomes, the queue applies
/// this policy. Retry behavior is defined once, not per call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts before giving up.
    ///
    /// Default: 5 attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Attempt cap for failures classified `Unknown`.
    ///
    /// Stricter than `max_attempts` so an unanticipated error shape cannot
    /// keep a job cycling for the full budget.
    ///
    /// Default: 2 attempts
    #[serde(default = "defaults::unknown_attempt_cap")]
    pub unknown_attempt_cap: u32,

    /// Base delay for exponential backoff (in seconds).
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::base_retry_delay_secs")]
    pub base_retry_delay_secs: u64,

    /// Maximum retry delay (in seconds).
    ///
    /// Default: 3600 seconds (1 hour)
    #[serde(default = "defaults::max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,

    /// Jitter factor for randomizing retry delays.
    ///
    /// Jitter prevents thundering herd when many jobs retry simultaneously.
    ///
    /// Default: 0.2 (±20%)
    #[serde(default = "defaults::retry_jitter_factor")]
    pub retry_jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            unknown_attempt_cap: defaults::unknown_attempt_cap(),
            base_retry_delay_secs: defaults::base_retry_delay_secs(),
            max_retry_delay_secs: defaults::max_retry_delay_secs(),
            retry_jitter_factor: defaults::retry_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// The attempt cap that applies to a failure of the given kind.
    #[must_use]
    pub const fn cap_for(&self, kind: ErrorKind) -> u32 {
        match kind {
            ErrorKind::Unknown => {
                if self.unknown_attempt_cap < self.max_attempts {
                    self.unknown_attempt_cap
                } else {
                    self.max_attempts
                }
            }
            _ => self.max_attempts,
        }
    }

    /// Whether another attempt is allowed after `attempt_count` attempts of
    /// a failure of `kind`.
    #[must_use]
    pub const fn should_retry(&self, kind: ErrorKind, attempt_count: u32) -> bool {
        attempt_count < self.cap_for(kind)
    }

    /// Unix timestamp of the next retry after `attempt_count` attempts.
    #[must_use]
    pub fn next_retry_at(&self, now: u64, attempt_count: u32) -> u64 {
        now + calculate_backoff_secs(
            attempt_count,
            self.base_retry_delay_secs,
            self.max_retry_delay_secs,
            self.retry_jitter_factor,
        )
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        5
    }

    pub const fn unknown_attempt_cap() -> u32 {
        2
    }

    pub const fn base_retry_delay_secs() -> u64 {
        60
    }

    pub const fn max_retry_delay_secs() -> u64 {
        3600
    }

    pub const fn retry_jitter_factor() -> f64 {
        0.2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        // jitter = 0 for predictable results
        assert_eq!(calculate_backoff_secs(1, 60, 86400, 0.0), 60);
        assert_eq!(calculate_backoff_secs(2, 60, 86400, 0.0), 120);
        assert_eq!(calculate_backoff_secs(3, 60, 86400, 0.0), 240);
        assert_eq!(calculate_backoff_secs(4, 60, 86400, 0.0), 480);

        // High attempt numbers cap at max_delay
        assert_eq!(calculate_backoff_secs(20, 60, 86400, 0.0), 86400);
        assert_eq!(calculate_backoff_secs(200, 60, 86400, 0.0), 86400);
    }

    #[test]
    fn test_backoff_strictly_increasing_below_cap() {
        let mut previous = 0;
        for attempt in 1..=6 {
            let delay = calculate_backoff_secs(attempt, 60, 86400, 0.0);
            assert!(delay > previous, "attempt {attempt} did not increase");
            previous = delay;
        }
    }

    #[test]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    fn test_backoff_with_jitter_stays_in_range() {
        let jitter_factor = 0.2;

        // Attempt 2: expected 120s, with ±20% jitter = 96-144s
        let delay = calculate_backoff_secs(2, 60, 86400, jitter_factor);
        let expected = 120u64;
        let min = expected - (expected as f64 * jitter_factor) as u64;
        let max = expected + (expected as f64 * jitter_factor) as u64;
        assert!(
            delay >= min && delay <= max,
            "Delay {delay} should be within jitter range [{min}, {max}]"
        );
    }

    #[test]
    fn test_jitter_varies_across_jobs() {
        // With jitter enabled, a batch of concurrent failing jobs should not
        // all land on the same retry instant.
        let delays: std::collections::HashSet<u64> = (0..64)
            .map(|_| calculate_backoff_secs(4, 600, 86400, 0.2))
            .collect();
        assert!(delays.len() > 1, "jitter produced identical delays");
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.unknown_attempt_cap, 2);
        assert_eq!(policy.base_retry_delay_secs, 60);
        assert_eq!(policy.max_retry_delay_secs, 3600);
        assert!((policy.retry_jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_should_retry_per_kind() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(ErrorKind::TransientNetwork, 0));
        assert!(policy.should_retry(ErrorKind::TransientNetwork, 4));
        assert!(!policy.should_retry(ErrorKind::TransientNetwork, 5));

        // Unknown failures get the stricter cap.
        assert!(policy.should_retry(ErrorKind::Unknown, 1));
        assert!(!policy.should_retry(ErrorKind::Unknown, 2));
    }

    #[test]
    fn test_unknown_cap_never_exceeds_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 1,
            unknown_attempt_cap: 2,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.cap_for(ErrorKind::Unknown), 1);
    }

    #[test]
    fn test_next_retry_at_offsets_from_now() {
        let policy = RetryPolicy {
            retry_jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_retry_at(1000, 1), 1060);
        assert_eq!(policy.next_retry_at(1000, 2), 1120);
    }
}
