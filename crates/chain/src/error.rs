use chainpilot_config::ConfigError;
use chainpilot_core::{Address, Wei, H256};
use chainpilot_rpc_client::{ErrorKind, RpcError};
use chainpilot_wallets::WalletError;
use std::time::Duration;
use thiserror::Error;

/// Result type for execution-layer operations
pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// Execution-layer errors
#[derive(Error, Debug)]
pub enum ChainError {
    /// A metered provider refused service; stop issuing calls.
    #[error("rpc quota exhausted on {network}: {source}")]
    QuotaExceeded {
        /// Network name
        network: String,
        /// Provider error
        source: RpcError,
    },

    /// Every retry failed.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Operation name
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Last error
        source: RpcError,
    },

    /// A non-retryable transport error.
    #[error("{operation} failed: {source}")]
    Rpc {
        /// Operation name
        operation: String,
        /// Transport error
        source: RpcError,
    },

    /// The executor's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The rate limiter did not grant a token in time.
    #[error("rate limiter for {network} did not grant a token within {waited:?}")]
    Throttled {
        /// Network name
        network: String,
        /// Time waited
        waited: Duration,
    },

    /// The transaction was broadcast but no receipt appeared in time.
    ///
    /// It may still be mined; it is never resubmitted.
    #[error("no receipt for {hash} within {waited:?}")]
    ReceiptTimeout {
        /// Transaction hash
        hash: H256,
        /// Time waited
        waited: Duration,
    },

    /// The transaction was mined with status 0.
    #[error("transaction {hash} reverted")]
    Reverted {
        /// Transaction hash
        hash: H256,
    },

    /// The sender cannot cover value plus maximum gas cost.
    #[error("insufficient funds in {address}: need {required} wei, have {available} wei")]
    InsufficientFunds {
        /// Sender
        address: Address,
        /// Required balance
        required: Wei,
        /// Current balance
        available: Wei,
    },

    /// No key is available for the sender.
    #[error("no signer available for {0}")]
    UnknownSigner(Address),

    /// Signer, keyring or multisig failure.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// A network without endpoints.
    #[error("network {0} has no rpc endpoints")]
    EmptyEndpoints(String),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ChainError {
    /// True for errors after which callers must stop issuing calls.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::Cancelled)
    }

    /// Classification of the underlying transport error, if any.
    #[must_use]
    pub fn rpc_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::QuotaExceeded { .. } => Some(ErrorKind::QuotaExceeded),
            Self::Exhausted { source, .. } | Self::Rpc { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
