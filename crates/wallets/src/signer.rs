//! Transaction signing.

use crate::{WalletError, WalletResult};
use async_trait::async_trait;
use chainpilot_core::{Address, Bytes};
use chainpilot_rpc_client::{EthApi, TransactionRequest};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Produces raw signed transactions.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs `tx` with the key of `tx.from`.
    async fn sign_transaction(&self, tx: &TransactionRequest) -> WalletResult<Bytes>;

    /// Returns true when a key for `address` is available.
    fn can_sign(&self, address: &Address) -> bool;

    /// Provisions a fresh key and returns its address.
    async fn create_account(&self) -> WalletResult<Address>;
}

/// Signer backed by an endpoint exposing `eth_signTransaction`.
///
/// The set of unlocked accounts is read once at connect time and extended by
/// [`Signer::create_account`].
pub struct RemoteSigner {
    api: EthApi,
    passphrase: String,
    accounts: RwLock<BTreeSet<Address>>,
}

impl std::fmt::Debug for RemoteSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSigner")
            .field("url", &self.api.url())
            .field("accounts", &self.accounts.read().len())
            .finish()
    }
}

impl RemoteSigner {
    /// Connects to the signer and loads its account list.
    pub async fn connect(api: EthApi, passphrase: impl Into<String>) -> WalletResult<Self> {
        let accounts = api.accounts().await?;
        info!(url = %api.url(), accounts = accounts.len(), "connected to remote signer");
        Ok(Self {
            api,
            passphrase: passphrase.into(),
            accounts: RwLock::new(accounts.into_iter().collect()),
        })
    }

    /// Accounts this signer can sign for.
    #[must_use]
    pub fn accounts(&self) -> Vec<Address> {
        self.accounts.read().iter().copied().collect()
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    async fn sign_transaction(&self, tx: &TransactionRequest) -> WalletResult<Bytes> {
        if !self.can_sign(&tx.from) {
            return Err(WalletError::UnknownSigner(tx.from));
        }
        let raw = self.api.sign_transaction(tx).await?;
        if raw.is_empty() {
            return Err(WalletError::signing("signer returned an empty payload"));
        }
        debug!(from = %tx.from, nonce = ?tx.nonce, "transaction signed");
        Ok(raw)
    }

    fn can_sign(&self, address: &Address) -> bool {
        self.accounts.read().contains(address)
    }

    async fn create_account(&self) -> WalletResult<Address> {
        let address = self.api.new_account(&self.passphrase).await?;
        self.accounts.write().insert(address);
        info!(%address, "created signer account");
        Ok(address)
    }
}
