//! Shared fixtures: a scriptable JSON-RPC node and executor builders.
#![allow(dead_code)]

use async_trait::async_trait;
use chainpilot_chain::{OperationExecutor, RateLimiterRegistry};
use chainpilot_config::{NetworkConfig, RetryConfig, TransactionConfig};
use chainpilot_rpc_client::{RpcError, RpcResult, Transport, TransportFactory};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

type Handler = Arc<dyn Fn(&Value) -> RpcResult<Value> + Send + Sync>;

pub const TX_HASH: &str = "0xabababababababababababababababababababababababababababababababab";

/// In-process node answering each method from a handler.
pub struct MockNode {
    url: String,
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockNode {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            handlers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// A node with plausible answers for everything the sender touches.
    pub fn healthy(url: impl Into<String>) -> Arc<Self> {
        let node = Self::new(url);
        node.reply("eth_blockNumber", json!("0x10"));
        node.reply("eth_chainId", json!("0x64"));
        node.reply(
            "eth_getBlockByNumber",
            json!({"number": "0x10", "timestamp": "0x6553f100", "baseFeePerGas": "0x64"}),
        );
        node.reply("eth_maxPriorityFeePerGas", json!("0x2"));
        node.reply("eth_gasPrice", json!("0x3b9aca00"));
        node.reply("eth_getCode", json!("0x"));
        node.reply("eth_getBalance", json!("0xde0b6b3a7640000"));
        node.reply("eth_estimateGas", json!("0x5208"));
        node.reply("eth_getTransactionCount", json!("0x3"));
        node.reply("eth_getTransactionByHash", Value::Null);
        node.reply("eth_sendRawTransaction", json!(TX_HASH));
        node.handle("eth_getTransactionReceipt", |params| Ok(receipt_json(&params[0], 1)));
        node
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn handle<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value) -> RpcResult<Value> + Send + Sync + 'static,
    {
        self.handlers.lock().insert(method.to_string(), Arc::new(handler));
    }

    pub fn reply(&self, method: &str, value: Value) {
        self.handle(method, move |_| Ok(value.clone()));
    }

    pub fn fail(&self, method: &str, error: RpcError) {
        self.handle(method, move |_| Err(error.clone()));
    }

    /// Answers from `responses` in order, repeating the last one.
    pub fn sequence(&self, method: &str, responses: Vec<RpcResult<Value>>) {
        assert!(!responses.is_empty());
        let queue = Mutex::new(VecDeque::from(responses));
        self.handle(method, move |_| {
            let mut queue = queue.lock();
            if queue.len() > 1 {
                queue.pop_front().expect("non-empty queue")
            } else {
                queue.front().cloned().expect("non-empty queue")
            }
        });
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }

    pub fn params(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockNode {
    async fn request(&self, method: &str, params: Value) -> RpcResult<Value> {
        self.calls.lock().push((method.to_string(), params.clone()));
        let handler = self.handlers.lock().get(method).cloned();
        match handler {
            Some(handler) => handler(&params),
            None => Err(RpcError::json_rpc(-32601, format!("method {method} not mocked"))),
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

pub struct MockFactory {
    nodes: Vec<Arc<MockNode>>,
}

impl TransportFactory for MockFactory {
    fn connect(&self, url: &str) -> RpcResult<Arc<dyn Transport>> {
        self.nodes
            .iter()
            .find(|node| node.url == url)
            .map(|node| Arc::clone(node) as Arc<dyn Transport>)
            .ok_or_else(|| RpcError::invalid_response(format!("unknown endpoint {url}")))
    }
}

pub fn receipt_json(hash: &Value, status: u8) -> Value {
    json!({
        "transactionHash": hash,
        "status": format!("0x{status:x}"),
        "blockNumber": "0x11",
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x98",
        "logs": []
    })
}

pub fn network(nodes: &[Arc<MockNode>]) -> NetworkConfig {
    NetworkConfig {
        name: "testnet".to_string(),
        rpc_urls: nodes.iter().map(|node| node.url.clone()).collect(),
        chain_id: 100,
        native_symbol: "xDAI".to_string(),
        rate: 1000.0,
        burst: 1000,
        min_priority_fee: 1,
        ..NetworkConfig::default()
    }
}

pub fn executor_for(nodes: &[Arc<MockNode>]) -> OperationExecutor {
    let factory = Arc::new(MockFactory {
        nodes: nodes.to_vec(),
    });
    OperationExecutor::connect(
        network(nodes),
        &RateLimiterRegistry::new(),
        factory,
        &RetryConfig::default(),
        &TransactionConfig::default(),
    )
    .expect("executor")
}

pub fn rate_limited() -> RpcError {
    RpcError::Http {
        status: 429,
        body: "Too Many Requests".to_string(),
    }
}

pub fn server_error() -> RpcError {
    RpcError::Http {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

pub fn quota_exhausted() -> RpcError {
    RpcError::Http {
        status: 403,
        body: "Forbidden: Tenderly virtual testnet quota exceeded".to_string(),
    }
}

pub fn timeout() -> RpcError {
    RpcError::Transport {
        message: "operation timed out".to_string(),
        timeout: true,
        connect: false,
    }
}
