//! Per-network token bucket with a manual backoff override.
//!
//! One limiter exists per network name and is shared by every executor talking
//! to that network, so the configured rate is a process-wide ceiling.

use chainpilot_config::NetworkConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Token bucket state guarded by the limiter mutex.
#[derive(Debug)]
struct BucketState {
    /// Available tokens
    tokens: f64,
    /// Last refill timestamp
    last_refill: Instant,
    /// Calls are refused until this instant
    backoff_until: Option<Instant>,
}

/// Snapshot of a limiter for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterStatus {
    /// Network name
    pub network: String,
    /// Tokens currently available
    pub tokens: f64,
    /// Refill rate in tokens per second
    pub rate: f64,
    /// Bucket capacity
    pub burst: u32,
    /// True while a backoff is in force
    pub in_backoff: bool,
    /// Time left in the current backoff
    pub backoff_remaining: Duration,
}

/// Token bucket throttle for one network.
#[derive(Debug)]
pub struct RateLimiter {
    network: String,
    rate: f64,
    burst: u32,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Creates a full bucket refilling at `rate` tokens per second.
    pub fn new(network: impl Into<String>, rate: f64, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            network: network.into(),
            rate: if rate.is_finite() && rate > 0.0 { rate } else { 1.0 },
            burst,
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
                backoff_until: None,
            }),
        }
    }

    /// Network this limiter throttles.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(f64::from(self.burst));
        state.last_refill = now;
    }

    /// Takes a token if one is available right now.
    ///
    /// Returns the time to wait before trying again otherwise.
    fn try_take(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();

        if let Some(until) = state.backoff_until {
            if until > now {
                return Err(until - now);
            }
            state.backoff_until = None;
        }

        self.refill(&mut state, now);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        Err(Duration::from_secs_f64((1.0 - state.tokens) / self.rate))
    }

    /// Waits for a token for at most `max_wait`.
    ///
    /// Returns false when the wait would exceed the bound.
    pub async fn acquire(&self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            let wait = match self.try_take() {
                Ok(()) => return true,
                Err(wait) => wait,
            };
            let now = Instant::now();
            if now >= deadline {
                debug!(network = %self.network, ?max_wait, "rate limiter wait bound reached");
                return false;
            }
            sleep(wait.min(deadline - now)).await;
        }
    }

    /// Blocks all acquisitions for `duration` and empties the bucket.
    ///
    /// An existing longer backoff is kept.
    pub fn trigger_backoff(&self, duration: Duration) {
        let mut state = self.state.lock();
        let until = Instant::now() + duration;
        let until = match state.backoff_until {
            Some(current) if current > until => current,
            _ => until,
        };
        state.backoff_until = Some(until);
        state.tokens = 0.0;
        state.last_refill = until;
        warn!(network = %self.network, backoff_secs = duration.as_secs_f64(), "rate limit backoff triggered");
    }

    /// Current limiter status.
    #[must_use]
    pub fn status(&self) -> RateLimiterStatus {
        let mut state = self.state.lock();
        let now = Instant::now();
        let backoff_remaining = state
            .backoff_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default();
        if backoff_remaining.is_zero() {
            self.refill(&mut state, now);
        }
        RateLimiterStatus {
            network: self.network.clone(),
            tokens: state.tokens,
            rate: self.rate,
            burst: self.burst,
            in_backoff: !backoff_remaining.is_zero(),
            backoff_remaining,
        }
    }
}

/// Process-scoped limiters keyed by network name.
///
/// Limiters hold no external resources and need no teardown.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the limiter for `network`, creating it from the network's settings.
    pub fn get_or_create(&self, network: &NetworkConfig) -> Arc<RateLimiter> {
        self.limiters
            .entry(network.name.clone())
            .or_insert_with(|| Arc::new(RateLimiter::new(&network.name, network.rate, network.burst)))
            .clone()
    }

    /// Returns an existing limiter.
    #[must_use]
    pub fn get(&self, network: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(network).map(|entry| Arc::clone(entry.value()))
    }

    /// Status of every limiter.
    #[must_use]
    pub fn statuses(&self) -> Vec<RateLimiterStatus> {
        let mut statuses: Vec<_> = self.limiters.iter().map(|entry| entry.value().status()).collect();
        statuses.sort_by(|a, b| a.network.cmp(&b.network));
        statuses
    }
}
