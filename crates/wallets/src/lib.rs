//! Chainpilot Wallets
//!
//! Narrow collaborator interfaces the execution layer depends on, plus the
//! implementations the agent ships with:
//! - [`Signer`] turns unsigned transactions into raw signed bytes
//!   ([`RemoteSigner`] delegates to a node or clef-style endpoint)
//! - [`Keyring`] maps labels to agent and multisig accounts ([`AccountBook`])
//! - [`MultisigExecutor`] submits calls on behalf of a Safe
//! - [`TransactionHistory`] receives fire-and-forget records of sent transactions

pub mod history;
pub mod keyring;
pub mod multisig;
pub mod signer;

pub use history::{MemoryHistory, TracingHistory, TransactionHistory, TransactionRecord, TxStatus};
pub use keyring::{AccountBook, Keyring, MultisigAccount, StoredAccount};
pub use multisig::{MultisigExecutor, SafeOperation};
pub use signer::{RemoteSigner, Signer};

use chainpilot_core::Address;
use chainpilot_rpc_client::RpcError;
use thiserror::Error;

/// Result type for wallet operations
pub type WalletResult<T> = std::result::Result<T, WalletError>;

/// Wallet-related errors
#[derive(Error, Debug, Clone)]
pub enum WalletError {
    /// No key is available for the address.
    #[error("no signer available for {0}")]
    UnknownSigner(Address),

    /// The signer refused or failed to sign.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Transport failure while talking to a remote signer.
    #[error("signer endpoint error: {0}")]
    Rpc(#[from] RpcError),

    /// Invalid multisig registration or execution failure.
    #[error("multisig error: {0}")]
    Multisig(String),

    /// The history sink rejected a record.
    #[error("history error: {0}")]
    History(String),
}

impl WalletError {
    /// Creates a signing error.
    pub fn signing<S: Into<String>>(message: S) -> Self {
        Self::Signing(message.into())
    }

    /// Creates a multisig error.
    pub fn multisig<S: Into<String>>(message: S) -> Self {
        Self::Multisig(message.into())
    }
}
