//! Typed views of ledger JSON-RPC payloads.

use chainpilot_core::{quantity, quantity_opt, Address, Bytes, Wei, H256};
use serde::{Deserialize, Serialize};

/// Block selector for state reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    /// Last mined block.
    Latest,
    /// Including transactions still in the pool.
    Pending,
}

impl BlockTag {
    /// JSON-RPC spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Pending => "pending",
        }
    }
}

/// The subset of a block header the executor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block height
    #[serde(with = "quantity")]
    pub number: u64,
    /// Unix timestamp
    #[serde(with = "quantity")]
    pub timestamp: u64,
    /// EIP-1559 base fee, absent on legacy networks
    #[serde(default, with = "quantity_opt", skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<Wei>,
}

/// An unsigned transaction as sent to `eth_estimateGas`, `eth_call` and the signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Sender
    pub from: Address,
    /// Recipient; `None` for contract creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    /// Attached native value
    #[serde(with = "quantity")]
    pub value: Wei,
    /// Calldata
    #[serde(default, rename = "data")]
    pub data: Bytes,
    /// Gas limit
    #[serde(default, with = "quantity_opt", skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    /// Sender nonce
    #[serde(default, with = "quantity_opt", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Chain id for replay protection
    #[serde(default, with = "quantity_opt", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Legacy gas price
    #[serde(default, with = "quantity_opt", skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<Wei>,
    /// EIP-1559 fee cap
    #[serde(default, with = "quantity_opt", skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<Wei>,
    /// EIP-1559 tip
    #[serde(default, with = "quantity_opt", skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<Wei>,
}

impl TransactionRequest {
    /// A call from `from` to `to` carrying `data` and `value`.
    #[must_use]
    pub fn call(from: Address, to: Address, value: Wei, data: Bytes) -> Self {
        Self {
            from,
            to: Some(to),
            value,
            data,
            ..Self::default()
        }
    }

    /// Highest price per gas this transaction may pay.
    #[must_use]
    pub fn max_price_per_gas(&self) -> Wei {
        self.max_fee_per_gas.or(self.gas_price).unwrap_or(0)
    }
}

/// An event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event signature hash
    pub topics: Vec<H256>,
    /// Non-indexed data
    #[serde(default)]
    pub data: Bytes,
}

/// A transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Transaction hash
    pub transaction_hash: H256,
    /// 1 on success, 0 on revert
    #[serde(with = "quantity")]
    pub status: u64,
    /// Inclusion block
    #[serde(with = "quantity")]
    pub block_number: u64,
    /// Gas consumed
    #[serde(with = "quantity")]
    pub gas_used: u64,
    /// Price actually paid per gas
    #[serde(default, with = "quantity_opt", skip_serializing_if = "Option::is_none")]
    pub effective_gas_price: Option<Wei>,
    /// Emitted logs
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl Receipt {
    /// True when the transaction executed without reverting.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.status == 1
    }

    /// Total fee paid, when the node reports the effective price.
    #[must_use]
    pub fn fee_paid(&self) -> Option<Wei> {
        self.effective_gas_price
            .map(|price| price.saturating_mul(Wei::from(self.gas_used)))
    }
}

/// What `eth_getTransactionByHash` tells us about a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    /// Transaction hash
    pub hash: H256,
    /// Sender nonce
    #[serde(with = "quantity")]
    pub nonce: u64,
    /// Inclusion block, `None` while pending
    #[serde(default, with = "quantity_opt")]
    pub block_number: Option<u64>,
}
