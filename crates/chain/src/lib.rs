//! Chainpilot execution layer
//!
//! Hides endpoint flakiness, rate limits and fee volatility behind one retry
//! contract:
//! - [`RateLimiter`]: per-network token bucket with a manual backoff override
//! - [`EndpointPool`]: round-robin endpoint rotation with failure counters
//! - [`OperationExecutor`]: classified retries, fee and gas estimation, waits
//! - [`TransactionSender`]: nonce-stable signing, fee bumps and confirmation

pub mod endpoint_pool;
pub mod error_handling;
pub mod executor;
pub mod fees;
pub mod rate_limiter;
pub mod sender;

mod error;

pub use endpoint_pool::EndpointPool;
pub use error::{ChainError, ChainResult};
pub use error_handling::{RecoveryStrategy, RetryPolicy};
pub use executor::OperationExecutor;
pub use fees::{compute_eip1559, FeeEstimate};
pub use rate_limiter::{RateLimiter, RateLimiterRegistry, RateLimiterStatus};
pub use sender::{TransactionSender, TxIntent};
