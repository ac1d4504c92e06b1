//! Labelled accounts: agent keys and multisig wallets.

use crate::signer::Signer;
use crate::{WalletError, WalletResult};
use async_trait::async_trait;
use chainpilot_core::Address;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// A multisig wallet known to the keyring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigAccount {
    /// Safe address
    pub address: Address,
    /// Owner addresses
    pub signers: Vec<Address>,
    /// Confirmations required
    pub threshold: u32,
}

/// A keyring entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredAccount {
    /// Externally owned account held by the signer.
    Eoa {
        /// Account address
        address: Address,
    },
    /// Multisig wallet.
    Multisig(MultisigAccount),
}

impl StoredAccount {
    /// Address of the entry.
    #[must_use]
    pub fn address(&self) -> Address {
        match self {
            Self::Eoa { address } => *address,
            Self::Multisig(safe) => safe.address,
        }
    }
}

/// Maps labels to accounts the agent controls.
#[async_trait]
pub trait Keyring: Send + Sync {
    /// Returns the EOA stored under `label`, creating one if absent.
    async fn agent_account(&self, label: &str) -> WalletResult<Address>;

    /// Records a multisig wallet under `label`.
    fn register_multisig(
        &self,
        label: &str,
        address: Address,
        signers: Vec<Address>,
        threshold: u32,
    ) -> WalletResult<()>;

    /// Returns true when `address` is a registered multisig.
    fn is_multisig(&self, address: &Address) -> bool;

    /// Looks up the account stored under `label`.
    fn resolve(&self, label: &str) -> Option<Address>;
}

/// In-memory keyring backed by a [`Signer`] for key creation.
pub struct AccountBook {
    signer: Arc<dyn Signer>,
    accounts: RwLock<BTreeMap<String, StoredAccount>>,
}

impl AccountBook {
    /// Creates an empty book.
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self::with_entries(signer, BTreeMap::new())
    }

    /// Creates a book pre-populated with `entries`.
    pub fn with_entries(signer: Arc<dyn Signer>, entries: BTreeMap<String, StoredAccount>) -> Self {
        Self {
            signer,
            accounts: RwLock::new(entries),
        }
    }

    /// Copy of every entry, for persistence.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, StoredAccount> {
        self.accounts.read().clone()
    }

    /// Multisig details for `address`.
    #[must_use]
    pub fn multisig(&self, address: &Address) -> Option<MultisigAccount> {
        self.accounts.read().values().find_map(|entry| match entry {
            StoredAccount::Multisig(safe) if safe.address == *address => Some(safe.clone()),
            _ => None,
        })
    }
}

#[async_trait]
impl Keyring for AccountBook {
    async fn agent_account(&self, label: &str) -> WalletResult<Address> {
        if let Some(StoredAccount::Eoa { address }) = self.accounts.read().get(label) {
            return Ok(*address);
        }

        let created = self.signer.create_account().await?;
        let mut accounts = self.accounts.write();
        // Another task may have raced us to the same label.
        let entry = accounts
            .entry(label.to_string())
            .or_insert(StoredAccount::Eoa { address: created });
        match entry {
            StoredAccount::Eoa { address } => {
                if *address == created {
                    info!(label, %created, "provisioned agent account");
                }
                Ok(*address)
            }
            StoredAccount::Multisig(safe) => Err(WalletError::multisig(format!(
                "label {label} already names multisig {}",
                safe.address
            ))),
        }
    }

    fn register_multisig(
        &self,
        label: &str,
        address: Address,
        signers: Vec<Address>,
        threshold: u32,
    ) -> WalletResult<()> {
        if threshold == 0 || threshold as usize > signers.len() {
            return Err(WalletError::multisig(format!(
                "threshold {threshold} invalid for {} signers",
                signers.len()
            )));
        }
        info!(label, %address, threshold, "registered multisig");
        self.accounts.write().insert(
            label.to_string(),
            StoredAccount::Multisig(MultisigAccount {
                address,
                signers,
                threshold,
            }),
        );
        Ok(())
    }

    fn is_multisig(&self, address: &Address) -> bool {
        self.multisig(address).is_some()
    }

    fn resolve(&self, label: &str) -> Option<Address> {
        self.accounts.read().get(label).map(StoredAccount::address)
    }
}
