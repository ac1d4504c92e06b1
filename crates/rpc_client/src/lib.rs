//! chainpilot RPC client
//!
//! JSON-RPC plumbing for ledger nodes: a [`Transport`] trait with an HTTP
//! implementation, a [`TransportFactory`] used to rebind on endpoint rotation,
//! the typed [`EthApi`] surface, and [`RpcError`] with its retry
//! [`ErrorKind`] classification.

pub mod error;
pub mod eth_api;
pub mod models;
pub mod transport;

pub use error::{classify_message, ErrorKind, RpcError, RpcResult};
pub use eth_api::EthApi;
pub use models::{Block, BlockTag, Log, Receipt, TransactionInfo, TransactionRequest};
pub use transport::{
    HttpTransport, HttpTransportFactory, RpcRequest, RpcResponse, Transport, TransportFactory,
    DEFAULT_TIMEOUT,
};
