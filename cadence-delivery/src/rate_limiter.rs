//! Fixed-window rate limiting over the shared counter store.
//!
//! Each (action, identifier) pair gets its own window; a send is allowed
//! while the post-increment count stays within the configured limit. The
//! increment-and-check is a single atomic operation at the counter store, so
//! concurrent callers cannot slip past the limit through a read-then-write
//! race.
//!
//! When the counter store is unavailable the limiter fails open by default:
//! availability of the notification pipeline is prioritized over strict
//! enforcement. `fail_open = false` inverts that choice.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use cadence_store::CounterStore;
use serde::{Deserialize, Serialize};

/// What is being rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitAction {
    /// Sends to one recipient's direct chat.
    RecipientSend,
    /// Sends into one group or channel.
    ChannelSend,
}

impl LimitAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecipientSend => "recipient_send",
            Self::ChannelSend => "channel_send",
        }
    }
}

/// One fixed-window rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitRule {
    /// Maximum allowed actions per window.
    pub limit: u64,
    /// Window length in seconds.
    pub window_secs: u64,
}

/// Configuration for rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Per-recipient send limit
    ///
    /// Also paces drip backlogs: one recipient's queued days cannot
    /// monopolize worker slots.
    #[serde(default = "default_recipient_rule")]
    pub recipient: LimitRule,

    /// Per-channel send limit
    #[serde(default = "default_channel_rule")]
    pub channel: LimitRule,

    /// Allow sends when the counter store is unavailable
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            recipient: default_recipient_rule(),
            channel: default_channel_rule(),
            fail_open: default_fail_open(),
        }
    }
}

const fn default_recipient_rule() -> LimitRule {
    LimitRule {
        limit: 5,
        window_secs: 60,
    }
}

const fn default_channel_rule() -> LimitRule {
    LimitRule {
        limit: 20,
        window_secs: 60,
    }
}

const fn default_fail_open() -> bool {
    true
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Denied { retry_after_secs: u64 },
}

impl RateLimitDecision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Fixed-window rate limiter shared by all delivery workers.
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Arc<dyn CounterStore>,
    /// Denials since startup, for observability only.
    exceeded: AtomicU64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("exceeded", &self.exceeded)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig, counters: Arc<dyn CounterStore>) -> Self {
        Self {
            config,
            counters,
            exceeded: AtomicU64::new(0),
        }
    }

    const fn rule(&self, action: LimitAction) -> LimitRule {
        match action {
            LimitAction::RecipientSend => self.config.recipient,
            LimitAction::ChannelSend => self.config.channel,
        }
    }

    /// Check whether `identifier` may perform `action` now.
    ///
    /// Increments the window counter and allows the action while the
    /// post-increment count is within the limit. Denial has no side effect
    /// beyond the exceeded counter.
    pub async fn allow(&self, action: LimitAction, identifier: &str) -> RateLimitDecision {
        let rule = self.rule(action);
        let key = format!("{}:{identifier}", action.as_str());

        match self.counters.increment(&key, rule.window_secs).await {
            Ok(value) => {
                if value.count <= rule.limit {
                    RateLimitDecision::Allowed
                } else {
                    self.exceeded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        action = action.as_str(),
                        identifier,
                        count = value.count,
                        limit = rule.limit,
                        "Rate limit exceeded"
                    );
                    RateLimitDecision::Denied {
                        retry_after_secs: value.resets_in_secs.max(1),
                    }
                }
            }
            Err(e) => {
                if self.config.fail_open {
                    tracing::warn!(
                        action = action.as_str(),
                        error = %e,
                        "Counter store unavailable, failing open"
                    );
                    RateLimitDecision::Allowed
                } else {
                    tracing::warn!(
                        action = action.as_str(),
                        error = %e,
                        "Counter store unavailable, failing closed"
                    );
                    RateLimitDecision::Denied {
                        retry_after_secs: rule.window_secs,
                    }
                }
            }
        }
    }

    /// Denials recorded since startup.
    #[must_use]
    pub fn exceeded_count(&self) -> u64 {
        self.exceeded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use cadence_store::{CounterValue, MemoryCounterStore, StoreError};

    use super::*;

    fn limiter(config: RateLimitConfig) -> RateLimiter {
        RateLimiter::new(config, Arc::new(MemoryCounterStore::new()))
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let limiter = limiter(RateLimitConfig::default());

        for _ in 0..5 {
            assert!(
                limiter
                    .allow(LimitAction::RecipientSend, "42")
                    .await
                    .is_allowed()
            );
        }

        let decision = limiter.allow(LimitAction::RecipientSend, "42").await;
        assert!(matches!(decision, RateLimitDecision::Denied { .. }));
        assert_eq!(limiter.exceeded_count(), 1);
    }

    #[tokio::test]
    async fn identifiers_are_independent() {
        let limiter = limiter(RateLimitConfig::default());

        for _ in 0..5 {
            assert!(
                limiter
                    .allow(LimitAction::RecipientSend, "1")
                    .await
                    .is_allowed()
            );
        }
        assert!(
            limiter
                .allow(LimitAction::RecipientSend, "2")
                .await
                .is_allowed()
        );
    }

    #[tokio::test]
    async fn actions_are_independent() {
        let limiter = limiter(RateLimitConfig::default());

        for _ in 0..5 {
            assert!(
                limiter
                    .allow(LimitAction::RecipientSend, "1")
                    .await
                    .is_allowed()
            );
        }
        // Same identifier, different action type: separate window.
        assert!(
            limiter
                .allow(LimitAction::ChannelSend, "1")
                .await
                .is_allowed()
        );
    }

    #[tokio::test]
    async fn concurrent_burst_allows_exactly_limit() {
        let limiter = Arc::new(limiter(RateLimitConfig::default()));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.allow(LimitAction::RecipientSend, "7").await
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().is_allowed() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 5);
        assert_eq!(limiter.exceeded_count(), 95);
    }

    #[derive(Debug)]
    struct BrokenCounterStore;

    #[async_trait]
    impl CounterStore for BrokenCounterStore {
        async fn increment(
            &self,
            _key: &str,
            _window_secs: u64,
        ) -> Result<CounterValue, StoreError> {
            Err(StoreError::Internal("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn broken_store_fails_open_by_default() {
        let limiter = RateLimiter::new(RateLimitConfig::default(), Arc::new(BrokenCounterStore));
        assert!(
            limiter
                .allow(LimitAction::RecipientSend, "1")
                .await
                .is_allowed()
        );
    }

    #[tokio::test]
    async fn broken_store_fails_closed_when_configured() {
        let config = RateLimitConfig {
            fail_open: false,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(config, Arc::new(BrokenCounterStore));
        let decision = limiter.allow(LimitAction::RecipientSend, "1").await;
        assert!(matches!(decision, RateLimitDecision::Denied { .. }));
    }
}
