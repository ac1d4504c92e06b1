//! # chainpilot: resilient EVM ledger agent
//!
//! chainpilot executes ledger operations against EVM networks through
//! rate-limited, rotating JSON-RPC endpoints and drives Olas services through
//! the registry lifecycle and staking.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chainpilot::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(std::path::Path::new("chainpilot.toml"))?;
//!     let network = config.network(&config.default_network)?.clone();
//!
//!     let limiters = RateLimiterRegistry::new();
//!     let factory = Arc::new(HttpTransportFactory::new(config.retry.rpc_timeout())?);
//!     let executor =
//!         OperationExecutor::connect(network, &limiters, factory, &config.retry, &config.transactions)?;
//!
//!     println!("fees: {:?}", executor.estimate_fees().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`core`] - addresses, hashes and the Solidity ABI codec
//! - [`config`] - TOML configuration and network presets
//! - [`rpc_client`] - JSON-RPC transport and typed `eth_*` calls
//! - [`wallets`] - signer, keyring and transaction history seams
//! - [`chain`] - rate limiting, endpoint rotation, retries and transaction sending
//! - [`olas`] - service registry lifecycle and staking orchestration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub use chainpilot_chain as chain;
pub use chainpilot_config as config;
pub use chainpilot_core as core;
pub use chainpilot_olas as olas;
pub use chainpilot_rpc_client as rpc_client;
pub use chainpilot_wallets as wallets;

/// Common imports for chainpilot users
pub mod prelude {
    pub use crate::chain::{
        ChainError, EndpointPool, FeeEstimate, OperationExecutor, RateLimiter, RateLimiterRegistry,
        TransactionSender, TxIntent,
    };
    pub use crate::config::{AppConfig, NetworkConfig, OlasConfig, RetryConfig, TransactionConfig};
    pub use crate::core::{Address, Bytes, Wei, H256};
    pub use crate::olas::{
        LifecycleError, Service, ServiceManager, ServiceState, StakingState, StakingStatus, StakingStatusReader,
    };
    pub use crate::rpc_client::{EthApi, HttpTransport, HttpTransportFactory, Transport};
    pub use crate::wallets::{AccountBook, Keyring, RemoteSigner, Signer};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
