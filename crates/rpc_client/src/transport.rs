//! JSON-RPC transports.

use crate::error::{RpcError, RpcResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    /// Protocol version, always "2.0"
    pub jsonrpc: &'static str,
    /// Request id
    pub id: u64,
    /// Method name
    pub method: &'a str,
    /// Positional parameters
    pub params: Value,
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponseError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Optional provider data
    #[serde(default)]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    /// Request id echoed back
    #[serde(default)]
    pub id: Value,
    /// Result on success
    #[serde(default)]
    pub result: Option<Value>,
    /// Error on failure
    #[serde(default)]
    pub error: Option<RpcResponseError>,
}

impl RpcResponse {
    /// Converts the response into its result value.
    pub fn into_result(self) -> RpcResult<Value> {
        if let Some(error) = self.error {
            let message = match error.data {
                Some(Value::String(data)) => format!("{}: {data}", error.message),
                _ => error.message,
            };
            return Err(RpcError::json_rpc(error.code, message));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Something that can carry JSON-RPC calls to a node.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and returns its `result`.
    async fn request(&self, method: &str, params: Value) -> RpcResult<Value>;

    /// Endpoint this transport talks to.
    fn url(&self) -> &str;
}

/// Builds transports for endpoint URLs.
///
/// Endpoint rotation rebinds through this trait instead of mutating a live
/// transport.
pub trait TransportFactory: Send + Sync {
    /// Creates a transport bound to `url`.
    fn connect(&self, url: &str) -> RpcResult<Arc<dyn Transport>>;
}

/// JSON-RPC over HTTP(S).
#[derive(Debug)]
pub struct HttpTransport {
    url: Url,
    raw_url: String,
    client: Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport with the default timeout.
    pub fn new(url: &str) -> RpcResult<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// Creates a transport with an explicit per-request timeout.
    pub fn with_timeout(url: &str, timeout: Duration) -> RpcResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, url)
    }

    /// Creates a transport around an existing HTTP client.
    pub fn with_client(client: Client, url: &str) -> RpcResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|err| RpcError::invalid_response(format!("bad endpoint url {url}: {err}")))?;
        Ok(Self {
            url: parsed,
            raw_url: url.to_string(),
            client,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> RpcResult<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        trace!(url = %self.raw_url, method, id = request.id, "json-rpc request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RpcError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RpcResponse = serde_json::from_str(&body).map_err(|err| {
            RpcError::invalid_response(format!("{method}: {err}: {}", truncate(&body, 200)))
        })?;
        parsed.into_result()
    }

    fn url(&self) -> &str {
        &self.raw_url
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Factory producing [`HttpTransport`]s that share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    client: Client,
}

impl HttpTransportFactory {
    /// Creates a factory whose transports use `timeout` per request.
    pub fn new(timeout: Duration) -> RpcResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

impl TransportFactory for HttpTransportFactory {
    fn connect(&self, url: &str) -> RpcResult<Arc<dyn Transport>> {
        Ok(Arc::new(HttpTransport::with_client(self.client.clone(), url)?))
    }
}
