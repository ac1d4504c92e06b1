//! Round-robin pool of interchangeable RPC endpoints for one network.

use crate::error::{ChainError, ChainResult};
use chainpilot_rpc_client::{EthApi, Transport, TransportFactory};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

struct PoolState {
    index: usize,
    failures: HashMap<usize, u32>,
    transport: Arc<dyn Transport>,
}

/// Ordered endpoints with a single active transport.
///
/// Every read and write of the active endpoint happens under one lock, which
/// also serializes rotation and the failure counters.
pub struct EndpointPool {
    network: String,
    urls: Vec<String>,
    factory: Arc<dyn TransportFactory>,
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for EndpointPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointPool")
            .field("network", &self.network)
            .field("urls", &self.urls)
            .field("index", &self.current_index())
            .finish()
    }
}

impl EndpointPool {
    /// Binds the first endpoint that the factory accepts.
    pub fn new(
        network: impl Into<String>,
        urls: Vec<String>,
        factory: Arc<dyn TransportFactory>,
    ) -> ChainResult<Self> {
        let network = network.into();
        let mut last_error = None;
        for (index, url) in urls.iter().enumerate() {
            match factory.connect(url) {
                Ok(transport) => {
                    return Ok(Self {
                        network,
                        urls,
                        factory,
                        state: Mutex::new(PoolState {
                            index,
                            failures: HashMap::new(),
                            transport,
                        }),
                    });
                }
                Err(err) => {
                    warn!(network = %network, url = %url, error = %err, "endpoint rejected");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(source) => Err(ChainError::Rpc {
                operation: "connect".to_string(),
                source,
            }),
            None => Err(ChainError::EmptyEndpoints(network)),
        }
    }

    /// Network name.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Number of configured endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// True when no endpoints are configured (never the case for a built pool).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Active endpoint URL.
    #[must_use]
    pub fn current(&self) -> String {
        self.urls[self.state.lock().index].clone()
    }

    /// Index of the active endpoint.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.state.lock().index
    }

    /// API bound to the active endpoint.
    #[must_use]
    pub fn api(&self) -> EthApi {
        self.checkout().1
    }

    /// Active index together with an API bound to it.
    #[must_use]
    pub fn checkout(&self) -> (usize, EthApi) {
        let state = self.state.lock();
        (state.index, EthApi::new(Arc::clone(&state.transport)))
    }

    /// Advances to the next endpoint and rebinds the transport.
    ///
    /// Returns false, leaving state untouched, with fewer than two endpoints or
    /// when the next endpoint cannot be bound.
    pub fn rotate(&self) -> bool {
        let mut state = self.state.lock();
        self.rotate_locked(&mut state)
    }

    /// Rotates only if `failed_index` is still active.
    ///
    /// Concurrent callers that saw the same endpoint fail rotate once between
    /// them. Returns true when the active endpoint differs from `failed_index`
    /// afterwards.
    pub fn rotate_from(&self, failed_index: usize) -> bool {
        let mut state = self.state.lock();
        if state.index != failed_index {
            return true;
        }
        self.rotate_locked(&mut state)
    }

    fn rotate_locked(&self, state: &mut PoolState) -> bool {
        if self.urls.len() < 2 {
            return false;
        }
        let next = (state.index + 1) % self.urls.len();
        match self.factory.connect(&self.urls[next]) {
            Ok(transport) => {
                info!(
                    network = %self.network,
                    from = %self.urls[state.index],
                    to = %self.urls[next],
                    "rotated rpc endpoint"
                );
                state.index = next;
                state.transport = transport;
                true
            }
            Err(err) => {
                warn!(network = %self.network, url = %self.urls[next], error = %err, "endpoint rotation failed");
                false
            }
        }
    }

    /// Bumps the failure counter of endpoint `index` and returns the new count.
    pub fn record_failure(&self, index: usize) -> u32 {
        let mut state = self.state.lock();
        let count = state.failures.entry(index).or_insert(0);
        *count += 1;
        *count
    }

    /// Consecutive failures recorded for endpoint `index`.
    #[must_use]
    pub fn failure_count(&self, index: usize) -> u32 {
        self.state.lock().failures.get(&index).copied().unwrap_or(0)
    }

    /// Clears every failure counter.
    pub fn reset_failures(&self) {
        self.state.lock().failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainpilot_rpc_client::{RpcError, RpcResult};
    use proptest::prelude::*;
    use serde_json::Value;

    struct NullTransport(String);

    #[async_trait]
    impl Transport for NullTransport {
        async fn request(&self, method: &str, _params: Value) -> RpcResult<Value> {
            Err(RpcError::invalid_response(method))
        }

        fn url(&self) -> &str {
            &self.0
        }
    }

    struct Factory {
        reject: Option<String>,
    }

    impl TransportFactory for Factory {
        fn connect(&self, url: &str) -> RpcResult<Arc<dyn Transport>> {
            if self.reject.as_deref() == Some(url) {
                return Err(RpcError::invalid_response("rejected"));
            }
            Ok(Arc::new(NullTransport(url.to_string())))
        }
    }

    fn pool(n: usize) -> EndpointPool {
        let urls = (0..n).map(|i| format!("http://node{i}.local")).collect();
        EndpointPool::new("gnosis", urls, Arc::new(Factory { reject: None })).unwrap()
    }

    #[test]
    fn single_endpoint_never_rotates() {
        let pool = pool(1);
        assert!(!pool.rotate());
        assert_eq!(pool.current_index(), 0);
    }

    #[test]
    fn rotation_rebinds_transport() {
        let pool = pool(2);
        assert!(pool.rotate());
        assert_eq!(pool.current(), "http://node1.local");
        assert_eq!(pool.api().url(), "http://node1.local");
    }

    #[test]
    fn failed_rebind_leaves_state() {
        let urls = vec!["http://a".to_string(), "http://b".to_string()];
        let factory = Factory {
            reject: Some("http://b".to_string()),
        };
        let pool = EndpointPool::new("gnosis", urls, Arc::new(factory)).unwrap();
        assert!(!pool.rotate());
        assert_eq!(pool.current(), "http://a");
    }

    #[test]
    fn empty_pool_is_rejected() {
        let result = EndpointPool::new("gnosis", Vec::new(), Arc::new(Factory { reject: None }));
        assert!(matches!(result, Err(ChainError::EmptyEndpoints(_))));
    }

    #[test]
    fn stale_failure_does_not_double_rotate() {
        let pool = pool(3);
        assert!(pool.rotate_from(0));
        assert!(pool.rotate_from(0));
        assert_eq!(pool.current_index(), 1);
    }

    #[test]
    fn failure_counters() {
        let pool = pool(2);
        assert_eq!(pool.record_failure(0), 1);
        assert_eq!(pool.record_failure(0), 2);
        assert_eq!(pool.failure_count(0), 2);
        assert_eq!(pool.failure_count(1), 0);
        pool.reset_failures();
        assert_eq!(pool.failure_count(0), 0);
    }

    proptest! {
        #[test]
        fn n_rotations_return_to_start(n in 2usize..8, start in 0usize..8) {
            let pool = pool(n);
            for _ in 0..(start % n) {
                pool.rotate();
            }
            let origin = pool.current_index();
            for _ in 0..n {
                prop_assert!(pool.rotate());
            }
            prop_assert_eq!(pool.current_index(), origin);
        }
    }
}
