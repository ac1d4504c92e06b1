//! Transaction history sinks.

use crate::WalletResult;
use async_trait::async_trait;
use chainpilot_core::{Address, Wei, H256};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome recorded for a sent transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Mined with status 1
    Confirmed,
    /// Mined with status 0
    Reverted,
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction hash
    pub hash: H256,
    /// Sender
    pub from: Address,
    /// Recipient
    pub to: Address,
    /// Token moved, `None` for native value
    pub token: Option<Address>,
    /// Amount moved
    pub amount: Wei,
    /// Network name
    pub network: String,
    /// Outcome
    pub status: TxStatus,
    /// Free-form labels, e.g. the lifecycle step
    pub tags: Vec<String>,
    /// Fee paid, when known
    pub gas_cost: Option<Wei>,
    /// Time the record was written
    pub timestamp: DateTime<Utc>,
}

/// Receives records of sent transactions.
///
/// Callers treat failures as non-fatal and only log them.
#[async_trait]
pub trait TransactionHistory: Send + Sync {
    /// Stores one record.
    async fn log_transaction(&self, record: TransactionRecord) -> WalletResult<()>;
}

/// Writes records to the `chainpilot::history` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHistory;

#[async_trait]
impl TransactionHistory for TracingHistory {
    async fn log_transaction(&self, record: TransactionRecord) -> WalletResult<()> {
        info!(
            target: "chainpilot::history",
            hash = %record.hash,
            from = %record.from,
            to = %record.to,
            amount = record.amount,
            network = %record.network,
            status = ?record.status,
            tags = ?record.tags,
            gas_cost = ?record.gas_cost,
            "transaction recorded"
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<TransactionRecord>>,
}

impl MemoryHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl TransactionHistory for MemoryHistory {
    async fn log_transaction(&self, record: TransactionRecord) -> WalletResult<()> {
        self.records.lock().push(record);
        Ok(())
    }
}
