//! RPC client tests
//!
//! HTTP behaviour is exercised against a mockito server; typed decoding is
//! exercised against an in-process transport that answers from a fixed table.

use async_trait::async_trait;
use chainpilot_core::Address;
use chainpilot_rpc_client::{
    BlockTag, ErrorKind, EthApi, HttpTransport, RpcError, RpcResult, Transport, TransactionRequest,
};
use mockito::Matcher;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Table-driven transport mirroring a node's replies.
struct MockTransport {
    responses: HashMap<String, Value>,
}

impl MockTransport {
    fn new() -> Self {
        let mut responses = HashMap::new();
        responses.insert("eth_blockNumber".to_string(), json!("0x1b4"));
        responses.insert("eth_chainId".to_string(), json!("0x64"));
        responses.insert(
            "eth_getBlockByNumber".to_string(),
            json!({
                "number": "0x1b4",
                "timestamp": "0x6553f100",
                "baseFeePerGas": "0x64",
                "hash": "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef"
            }),
        );
        responses.insert("eth_getBalance".to_string(), json!("0xde0b6b3a7640000"));
        responses.insert("eth_getTransactionCount".to_string(), json!("0x7"));
        responses.insert("eth_getTransactionReceipt".to_string(), Value::Null);
        responses.insert(
            "eth_signTransaction".to_string(),
            json!({ "raw": "0xf86c", "tx": {} }),
        );
        Self { responses }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, method: &str, _params: Value) -> RpcResult<Value> {
        self.responses
            .get(method)
            .cloned()
            .ok_or_else(|| RpcError::json_rpc(-32601, format!("method {method} not found")))
    }

    fn url(&self) -> &str {
        "mock://node"
    }
}

fn mock_api() -> EthApi {
    EthApi::new(Arc::new(MockTransport::new()))
}

#[tokio::test]
async fn typed_reads_decode_quantities() {
    let api = mock_api();
    assert_eq!(api.block_number().await.unwrap(), 436);
    assert_eq!(api.chain_id().await.unwrap(), 100);
    assert_eq!(
        api.get_balance(Address::ZERO).await.unwrap(),
        1_000_000_000_000_000_000
    );
    assert_eq!(
        api.transaction_count(Address::ZERO, BlockTag::Pending)
            .await
            .unwrap(),
        7
    );
    let block = api.latest_block().await.unwrap();
    assert_eq!(block.base_fee_per_gas, Some(100));
}

#[tokio::test]
async fn pending_receipt_is_none() {
    let api = mock_api();
    let hash = "0x1111111111111111111111111111111111111111111111111111111111111111"
        .parse()
        .unwrap();
    assert!(api.transaction_receipt(hash).await.unwrap().is_none());
}

#[tokio::test]
async fn sign_transaction_accepts_object_reply() {
    let api = mock_api();
    let raw = api
        .sign_transaction(&TransactionRequest::default())
        .await
        .unwrap();
    assert_eq!(raw.0, vec![0xf8, 0x6c]);
}

#[tokio::test]
async fn unknown_method_is_unclassified() {
    let err = mock_api().gas_price().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unclassified);
}

#[tokio::test]
async fn http_transport_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
        .create_async()
        .await;

    let transport = HttpTransport::new(&server.url()).unwrap();
    let api = EthApi::new(Arc::new(transport));
    assert_eq!(api.block_number().await.unwrap(), 16);
    mock.assert_async().await;
}

#[tokio::test]
async fn http_429_is_rate_limited() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(429)
        .with_body("Too Many Requests")
        .create_async()
        .await;

    let transport = HttpTransport::new(&server.url()).unwrap();
    let err = transport
        .request("eth_blockNumber", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Http { status: 429, .. }));
    assert_eq!(err.kind(), ErrorKind::RateLimited);
}

#[tokio::test]
async fn http_503_is_upstream_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(503)
        .with_body("service unavailable")
        .create_async()
        .await;

    let transport = HttpTransport::new(&server.url()).unwrap();
    let err = transport.request("eth_gasPrice", json!([])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamServer);
}

#[tokio::test]
async fn json_rpc_error_object_is_surfaced() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"replacement transaction underpriced"}}"#,
        )
        .create_async()
        .await;

    let transport = HttpTransport::new(&server.url()).unwrap();
    let err = transport
        .request("eth_sendRawTransaction", json!(["0x00"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::JsonRpc { code: -32000, .. }));
    assert_eq!(err.kind(), ErrorKind::FeeRelated);
}

#[tokio::test]
async fn unreachable_endpoint_is_connectivity() {
    // Port 9 (discard) on loopback is closed on test hosts.
    let transport = HttpTransport::new("http://127.0.0.1:9").unwrap();
    let err = transport
        .request("eth_blockNumber", json!([]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);
}
