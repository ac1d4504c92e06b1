//! The ledger surface the lifecycle needs.

use crate::error::LifecycleResult;
use async_trait::async_trait;
use chainpilot_chain::{TransactionSender, TxIntent};
use chainpilot_core::{Address, Bytes, Wei};
use chainpilot_rpc_client::Receipt;
use std::sync::Arc;

/// Reads and writes against one network.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Network name.
    fn network(&self) -> &str;

    /// Read-only contract call.
    async fn call(&self, to: Address, data: Vec<u8>) -> LifecycleResult<Bytes>;

    /// Sends a transaction and returns its successful receipt.
    async fn send(&self, intent: TxIntent) -> LifecycleResult<Receipt>;

    /// Native balance of `address`.
    async fn native_balance(&self, address: Address) -> LifecycleResult<Wei>;

    /// Timestamp of the latest block.
    async fn timestamp(&self) -> LifecycleResult<u64>;
}

/// [`LedgerGateway`] over the retrying execution layer.
pub struct EvmGateway {
    sender: Arc<TransactionSender>,
}

impl EvmGateway {
    /// Wraps a sender; reads go through its executor.
    pub fn new(sender: Arc<TransactionSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl LedgerGateway for EvmGateway {
    fn network(&self) -> &str {
        &self.sender.executor().network().name
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> LifecycleResult<Bytes> {
        Ok(self.sender.executor().call(to, Bytes(data)).await?)
    }

    async fn send(&self, intent: TxIntent) -> LifecycleResult<Receipt> {
        Ok(self.sender.send(intent).await?)
    }

    async fn native_balance(&self, address: Address) -> LifecycleResult<Wei> {
        Ok(self.sender.executor().native_balance(address).await?)
    }

    async fn timestamp(&self) -> LifecycleResult<u64> {
        Ok(self.sender.executor().block_timestamp().await?)
    }
}
