//! Typed wrappers over the `eth_*` JSON-RPC namespace.

use crate::error::{RpcError, RpcResult};
use crate::models::{Block, BlockTag, Receipt, TransactionInfo, TransactionRequest};
use crate::transport::Transport;
use chainpilot_core::{parse_quantity, Address, Bytes, Wei, H256};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

/// Ledger API bound to one transport.
///
/// Cheap to clone; the executor hands a fresh clone to every attempt so that an
/// endpoint rotation takes effect on the next try.
#[derive(Clone)]
pub struct EthApi {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for EthApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthApi")
            .field("url", &self.transport.url())
            .finish()
    }
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> RpcResult<T> {
    serde_json::from_value(value).map_err(|err| RpcError::invalid_response(format!("{method}: {err}")))
}

fn quantity(method: &str, value: &Value) -> RpcResult<u128> {
    let text = value
        .as_str()
        .ok_or_else(|| RpcError::invalid_response(format!("{method}: expected hex quantity, got {value}")))?;
    Ok(parse_quantity(text)?)
}

fn quantity_u64(method: &str, value: &Value) -> RpcResult<u64> {
    let wide = quantity(method, value)?;
    u64::try_from(wide).map_err(|_| RpcError::invalid_response(format!("{method}: {wide} exceeds u64")))
}

impl EthApi {
    /// Wraps a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Endpoint behind this API.
    #[must_use]
    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Issues a raw call.
    pub async fn raw(&self, method: &str, params: Value) -> RpcResult<Value> {
        self.transport.request(method, params).await
    }

    /// `eth_blockNumber`
    pub async fn block_number(&self) -> RpcResult<u64> {
        let value = self.raw("eth_blockNumber", json!([])).await?;
        quantity_u64("eth_blockNumber", &value)
    }

    /// `eth_chainId`
    pub async fn chain_id(&self) -> RpcResult<u64> {
        let value = self.raw("eth_chainId", json!([])).await?;
        quantity_u64("eth_chainId", &value)
    }

    /// Header of the latest block.
    pub async fn latest_block(&self) -> RpcResult<Block> {
        let value = self
            .raw("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        if value.is_null() {
            return Err(RpcError::invalid_response("eth_getBlockByNumber: null block"));
        }
        decode("eth_getBlockByNumber", value)
    }

    /// `eth_gasPrice`
    pub async fn gas_price(&self) -> RpcResult<Wei> {
        let value = self.raw("eth_gasPrice", json!([])).await?;
        quantity("eth_gasPrice", &value)
    }

    /// `eth_maxPriorityFeePerGas`
    pub async fn max_priority_fee(&self) -> RpcResult<Wei> {
        let value = self.raw("eth_maxPriorityFeePerGas", json!([])).await?;
        quantity("eth_maxPriorityFeePerGas", &value)
    }

    /// `eth_estimateGas`
    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> RpcResult<u64> {
        let value = self.raw("eth_estimateGas", json!([tx])).await?;
        quantity_u64("eth_estimateGas", &value)
    }

    /// `eth_call` against the latest block.
    pub async fn call(&self, tx: &TransactionRequest) -> RpcResult<Bytes> {
        let value = self.raw("eth_call", json!([tx, "latest"])).await?;
        decode("eth_call", value)
    }

    /// `eth_getCode`
    pub async fn get_code(&self, address: Address) -> RpcResult<Bytes> {
        let value = self.raw("eth_getCode", json!([address, "latest"])).await?;
        decode("eth_getCode", value)
    }

    /// `eth_getBalance`
    pub async fn get_balance(&self, address: Address) -> RpcResult<Wei> {
        let value = self.raw("eth_getBalance", json!([address, "latest"])).await?;
        quantity("eth_getBalance", &value)
    }

    /// `eth_getTransactionCount`
    pub async fn transaction_count(&self, address: Address, tag: BlockTag) -> RpcResult<u64> {
        let value = self
            .raw("eth_getTransactionCount", json!([address, tag.as_str()]))
            .await?;
        quantity_u64("eth_getTransactionCount", &value)
    }

    /// `eth_sendRawTransaction`
    pub async fn send_raw_transaction(&self, raw: &Bytes) -> RpcResult<H256> {
        let value = self.raw("eth_sendRawTransaction", json!([raw])).await?;
        decode("eth_sendRawTransaction", value)
    }

    /// `eth_getTransactionReceipt`; `None` while the transaction is pending.
    pub async fn transaction_receipt(&self, hash: H256) -> RpcResult<Option<Receipt>> {
        let value = self.raw("eth_getTransactionReceipt", json!([hash])).await?;
        if value.is_null() {
            return Ok(None);
        }
        decode("eth_getTransactionReceipt", value).map(Some)
    }

    /// `eth_getTransactionByHash`; `None` if the node has never seen it.
    pub async fn transaction_by_hash(&self, hash: H256) -> RpcResult<Option<TransactionInfo>> {
        let value = self.raw("eth_getTransactionByHash", json!([hash])).await?;
        if value.is_null() {
            return Ok(None);
        }
        decode("eth_getTransactionByHash", value).map(Some)
    }

    /// `eth_signTransaction`, accepting both the bare-hex and `{raw, tx}` reply shapes.
    pub async fn sign_transaction(&self, tx: &TransactionRequest) -> RpcResult<Bytes> {
        let value = self.raw("eth_signTransaction", json!([tx])).await?;
        let raw = match value {
            Value::Object(mut object) => object
                .remove("raw")
                .ok_or_else(|| RpcError::invalid_response("eth_signTransaction: missing raw"))?,
            other => other,
        };
        decode("eth_signTransaction", raw)
    }

    /// `eth_accounts`
    pub async fn accounts(&self) -> RpcResult<Vec<Address>> {
        let value = self.raw("eth_accounts", json!([])).await?;
        decode("eth_accounts", value)
    }

    /// `personal_newAccount`
    pub async fn new_account(&self, passphrase: &str) -> RpcResult<Address> {
        let value = self.raw("personal_newAccount", json!([passphrase])).await?;
        decode("personal_newAccount", value)
    }
}
