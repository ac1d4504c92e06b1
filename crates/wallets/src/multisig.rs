//! Multisig co-execution.

use crate::WalletResult;
use async_trait::async_trait;
use chainpilot_core::{Address, Bytes, Wei, H256};
use serde::{Deserialize, Serialize};

/// Safe operation type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SafeOperation {
    /// Regular call
    #[default]
    Call = 0,
    /// Delegate call
    DelegateCall = 1,
}

/// Submits transactions on behalf of a multisig wallet.
///
/// Collecting co-signatures is the implementor's concern; callers only need
/// the hash of the resulting on-chain transaction.
#[async_trait]
pub trait MultisigExecutor: Send + Sync {
    /// Executes `to.call{value}(data)` from `safe` and returns the transaction hash.
    async fn execute_multisig_transaction(
        &self,
        safe: Address,
        to: Address,
        value: Wei,
        data: &Bytes,
        operation: SafeOperation,
    ) -> WalletResult<H256>;
}
