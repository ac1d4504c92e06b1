//! Retry policy for ledger operations.

use chainpilot_config::RetryConfig;
use chainpilot_rpc_client::ErrorKind;
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const MAX_RETRY_ATTEMPTS: u32 = 6;

/// Base retry delay (exponential backoff)
pub const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Maximum retry delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(32);

/// Cool-down forced on the rate limiter when rotation is not possible.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);

/// Error recovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Stop; the environment is unusable
    Abort,
    /// Switch endpoint and retry, or cool down when switching is impossible
    RotateAndRetry,
    /// Retry on the same endpoint after a backoff delay
    RetryWithBackoff,
    /// Surface the error without retrying
    Propagate,
}

impl From<ErrorKind> for RecoveryStrategy {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::QuotaExceeded => Self::Abort,
            ErrorKind::RateLimited | ErrorKind::Connectivity => Self::RotateAndRetry,
            ErrorKind::UpstreamServer | ErrorKind::FeeRelated => Self::RetryWithBackoff,
            ErrorKind::Unclassified => Self::Propagate,
        }
    }
}

/// Retry bounds and delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Rate limiter cool-down when rotation is impossible
    pub rate_limit_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRY_ATTEMPTS,
            base_delay: BASE_RETRY_DELAY,
            max_delay: MAX_RETRY_DELAY,
            rate_limit_backoff: RATE_LIMIT_BACKOFF,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            rate_limit_backoff: config.rate_limit_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Calculates the delay before retry `attempt` (0-based) with exponential backoff
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2_u32.pow(attempt.min(10)));
        delay.min(self.max_delay)
    }
}
