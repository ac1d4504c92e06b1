//! Retrying operation executor for one network.
//!
//! Every ledger call goes through [`OperationExecutor::execute`], which takes a
//! rate-limiter token, binds the active endpoint, classifies failures and
//! decides between rotating, backing off, retrying and giving up. Waits race
//! the executor's cancellation token.

use crate::endpoint_pool::EndpointPool;
use crate::error::{ChainError, ChainResult};
use crate::error_handling::{RecoveryStrategy, RetryPolicy};
use crate::fees::{compute_eip1559, FeeEstimate};
use crate::rate_limiter::{RateLimiter, RateLimiterRegistry};
use chainpilot_config::{NetworkConfig, RetryConfig, TransactionConfig};
use chainpilot_core::{Address, Bytes, Wei, H256};
use chainpilot_rpc_client::{
    BlockTag, EthApi, Receipt, RpcResult, TransactionRequest, TransportFactory,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Executes ledger operations against one network with retries.
#[derive(Debug)]
pub struct OperationExecutor {
    network: Arc<NetworkConfig>,
    pool: EndpointPool,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    throttle_timeout: Duration,
    transfer_gas_limit: u64,
    fallback_gas_limit: u64,
    cancel: CancellationToken,
}

impl OperationExecutor {
    /// Creates an executor from its parts.
    pub fn new(
        network: Arc<NetworkConfig>,
        pool: EndpointPool,
        limiter: Arc<RateLimiter>,
        retry: &RetryConfig,
        transactions: &TransactionConfig,
    ) -> Self {
        Self {
            network,
            pool,
            limiter,
            policy: RetryPolicy::from(retry),
            throttle_timeout: retry.throttle_timeout(),
            transfer_gas_limit: transactions.transfer_gas_limit,
            fallback_gas_limit: transactions.fallback_gas_limit,
            cancel: CancellationToken::new(),
        }
    }

    /// Builds the endpoint pool for `network` and takes its shared limiter from `registry`.
    pub fn connect(
        network: NetworkConfig,
        registry: &RateLimiterRegistry,
        factory: Arc<dyn TransportFactory>,
        retry: &RetryConfig,
        transactions: &TransactionConfig,
    ) -> ChainResult<Self> {
        let pool = EndpointPool::new(&network.name, network.rpc_urls.clone(), factory)?;
        let limiter = registry.get_or_create(&network);
        Ok(Self::new(Arc::new(network), pool, limiter, retry, transactions))
    }

    /// Replaces the cancellation token, e.g. with a child of a process-wide one.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token that aborts every pending wait of this executor.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Network settings.
    #[must_use]
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Endpoint pool.
    #[must_use]
    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// Shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Token address by symbol.
    #[must_use]
    pub fn token_address(&self, symbol: &str) -> Option<Address> {
        self.network.token_address(symbol)
    }

    /// Contract address by name.
    #[must_use]
    pub fn contract_address(&self, name: &str) -> Option<Address> {
        self.network.contract_address(name)
    }

    /// Clears the per-endpoint failure counters.
    pub fn reset_failure_counts(&self) {
        self.pool.reset_failures();
        info!(network = %self.network.name, "endpoint failure counters reset");
    }

    /// Sleeps unless cancelled first.
    pub async fn pause(&self, duration: Duration) -> ChainResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ChainError::Cancelled),
            _ = sleep(duration) => Ok(()),
        }
    }

    async fn throttle(&self) -> ChainResult<()> {
        let granted = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ChainError::Cancelled),
            granted = self.limiter.acquire(self.throttle_timeout) => granted,
        };
        if granted {
            Ok(())
        } else {
            Err(ChainError::Throttled {
                network: self.network.name.clone(),
                waited: self.throttle_timeout,
            })
        }
    }

    /// Runs `op` with at most `max_retries` retries.
    ///
    /// `op` receives an API bound to the endpoint active at the time of the
    /// attempt. Quota exhaustion aborts at once and unclassified errors are
    /// returned without retrying. Rate-limit and connectivity errors rotate to
    /// the next endpoint and retry immediately, at most `N - 1` times per call;
    /// after that, or with a single endpoint, they put the limiter into
    /// backoff. Server and fee errors retry on the same endpoint after an
    /// exponential delay.
    pub async fn execute<T, F, Fut>(&self, name: &str, max_retries: u32, mut op: F) -> ChainResult<T>
    where
        F: FnMut(EthApi) -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        let max_rotations = self.pool.len().saturating_sub(1);
        let mut rotations = 0usize;
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ChainError::Cancelled);
            }
            self.throttle().await?;

            let (index, api) = self.pool.checkout();
            let err = match op(api).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(network = %self.network.name, operation = name, attempt, "operation recovered");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            let strategy = RecoveryStrategy::from(kind);
            match strategy {
                RecoveryStrategy::Abort => {
                    error!(network = %self.network.name, operation = name, error = %err, "rpc quota exhausted");
                    return Err(ChainError::QuotaExceeded {
                        network: self.network.name.clone(),
                        source: err,
                    });
                }
                RecoveryStrategy::Propagate => {
                    return Err(ChainError::Rpc {
                        operation: name.to_string(),
                        source: err,
                    });
                }
                RecoveryStrategy::RotateAndRetry | RecoveryStrategy::RetryWithBackoff => {}
            }

            let failures = self.pool.record_failure(index);
            if attempt >= max_retries {
                warn!(
                    network = %self.network.name,
                    operation = name,
                    attempts = attempt + 1,
                    error = %err,
                    "retries exhausted"
                );
                return Err(ChainError::Exhausted {
                    operation: name.to_string(),
                    attempts: attempt + 1,
                    source: err,
                });
            }

            let delay = self.policy.delay_for_attempt(attempt);
            attempt += 1;

            if strategy == RecoveryStrategy::RotateAndRetry {
                if rotations < max_rotations && self.pool.rotate_from(index) {
                    rotations += 1;
                    info!(
                        network = %self.network.name,
                        operation = name,
                        attempt,
                        kind = ?kind,
                        endpoint_failures = failures,
                        "retrying on next endpoint"
                    );
                    continue;
                }
                self.limiter.trigger_backoff(self.policy.rate_limit_backoff);
            }

            warn!(
                network = %self.network.name,
                operation = name,
                attempt,
                kind = ?kind,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after backoff"
            );
            self.pause(delay).await?;
        }
    }

    /// [`execute`](Self::execute) with the configured retry bound.
    pub async fn run<T, F, Fut>(&self, name: &str, op: F) -> ChainResult<T>
    where
        F: FnMut(EthApi) -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        self.execute(name, self.policy.max_retries, op).await
    }

    /// Fee parameters for the next transaction.
    ///
    /// Uses the EIP-1559 model when the latest block carries a base fee and a
    /// legacy gas price otherwise.
    pub async fn estimate_fees(&self) -> ChainResult<FeeEstimate> {
        let block = self
            .run("latest_block", |api| async move { api.latest_block().await })
            .await?;

        let Some(base_fee) = block.base_fee_per_gas else {
            let gas_price = self
                .run("gas_price", |api| async move { api.gas_price().await })
                .await?;
            return Ok(FeeEstimate::Legacy { gas_price });
        };

        let floor = self.network.priority_fee_floor();
        let observed = match self
            .run("max_priority_fee", |api| async move { api.max_priority_fee().await })
            .await
        {
            Ok(fee) => fee,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(network = %self.network.name, error = %err, "priority fee unavailable, using floor");
                floor
            }
        };
        let estimate = compute_eip1559(base_fee, observed, floor);
        debug!(network = %self.network.name, base_fee, observed, ?estimate, "fees estimated");
        Ok(estimate)
    }

    /// Gas limit for `tx`.
    ///
    /// Returns 0 when the sender is a contract, since simulating calls from
    /// contract accounts is unreliable. Successful estimates get a 10% buffer;
    /// failed ones fall back to a fixed ceiling.
    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> ChainResult<u64> {
        if self.is_contract(tx.from).await? {
            debug!(from = %tx.from, "sender is a contract, skipping gas estimation");
            return Ok(0);
        }

        let result = self
            .run("estimate_gas", |api| {
                let tx = tx.clone();
                async move { api.estimate_gas(&tx).await }
            })
            .await;
        match result {
            Ok(gas) => Ok(gas.saturating_add(gas / 10)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                let fallback = if tx.data.is_empty() {
                    self.transfer_gas_limit
                } else {
                    self.fallback_gas_limit
                };
                warn!(from = %tx.from, error = %err, fallback, "gas estimation failed, using fallback limit");
                Ok(fallback)
            }
        }
    }

    /// Polls until the confirmed and pending nonces of `address` agree.
    ///
    /// Returns whether they converged within `max_wait`.
    pub async fn wait_for_no_pending(
        &self,
        address: Address,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> ChainResult<bool> {
        let deadline = Instant::now() + max_wait;
        loop {
            let latest = self
                .run("transaction_count", |api| async move {
                    api.transaction_count(address, BlockTag::Latest).await
                })
                .await?;
            let pending = self
                .run("transaction_count", |api| async move {
                    api.transaction_count(address, BlockTag::Pending).await
                })
                .await?;
            if latest >= pending {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(%address, latest, pending, "pending transactions did not clear");
                return Ok(false);
            }
            debug!(%address, latest, pending, "waiting for pending transactions");
            self.pause(poll_interval.min(deadline - now)).await?;
        }
    }

    /// Polls for the receipt of `hash` until `timeout`.
    pub async fn wait_for_receipt(
        &self,
        hash: H256,
        timeout: Duration,
        poll_interval: Duration,
    ) -> ChainResult<Receipt> {
        let start = Instant::now();
        let deadline = start + timeout;
        loop {
            let receipt = self
                .run("transaction_receipt", |api| async move {
                    api.transaction_receipt(hash).await
                })
                .await?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(tx_hash = %hash, waited_secs = timeout.as_secs(), "receipt wait timed out");
                return Err(ChainError::ReceiptTimeout {
                    hash,
                    waited: now - start,
                });
            }
            self.pause(poll_interval.min(deadline - now)).await?;
        }
    }

    /// True when the active endpoint reports a non-zero block height.
    pub async fn check_health(&self) -> bool {
        if self.throttle().await.is_err() {
            return false;
        }
        let api = self.pool.api();
        match api.block_number().await {
            Ok(height) if height > 0 => true,
            Ok(height) => {
                warn!(network = %self.network.name, url = %api.url(), height, "endpoint reports empty chain");
                false
            }
            Err(err) => {
                warn!(network = %self.network.name, url = %api.url(), error = %err, "health check failed");
                false
            }
        }
    }

    /// True when `address` has code.
    pub async fn is_contract(&self, address: Address) -> ChainResult<bool> {
        let code = self
            .run("get_code", |api| async move { api.get_code(address).await })
            .await?;
        Ok(!code.is_empty())
    }

    /// Native balance of `address`.
    pub async fn native_balance(&self, address: Address) -> ChainResult<Wei> {
        self.run("get_balance", |api| async move { api.get_balance(address).await })
            .await
    }

    /// Timestamp of the latest block.
    pub async fn block_timestamp(&self) -> ChainResult<u64> {
        let block = self
            .run("latest_block", |api| async move { api.latest_block().await })
            .await?;
        Ok(block.timestamp)
    }

    /// Read-only contract call.
    pub async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes> {
        self.run("eth_call", |api| {
            let tx = TransactionRequest::call(Address::ZERO, to, 0, data.clone());
            async move { api.call(&tx).await }
        })
        .await
    }
}

