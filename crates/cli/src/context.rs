//! Wires configuration into executors, senders and the service manager.

use anyhow::{bail, Context, Result};
use chainpilot_chain::{OperationExecutor, RateLimiterRegistry, TransactionSender};
use chainpilot_config::{AppConfig, NetworkConfig};
use chainpilot_core::Address;
use chainpilot_olas::{EvmGateway, JsonServiceStore, OlasContracts, ServiceManager};
use chainpilot_rpc_client::{EthApi, HttpTransport, HttpTransportFactory};
use chainpilot_wallets::{AccountBook, RemoteSigner, Signer, StoredAccount, TracingHistory};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything a command needs for one network.
pub struct AgentContext {
    config: AppConfig,
    network: NetworkConfig,
    limiters: RateLimiterRegistry,
    executor: Arc<OperationExecutor>,
    cancel: CancellationToken,
}

impl AgentContext {
    /// Connects to `network`, or the configured default network.
    pub fn connect(config: AppConfig, network: Option<&str>, cancel: CancellationToken) -> Result<Self> {
        let name = network.unwrap_or(&config.default_network).to_string();
        let network = config
            .network(&name)
            .with_context(|| format!("network '{name}' is not configured"))?
            .clone();

        let limiters = RateLimiterRegistry::new();
        let factory = Arc::new(
            HttpTransportFactory::new(config.retry.rpc_timeout()).context("failed to build HTTP client")?,
        );
        let executor = OperationExecutor::connect(
            network.clone(),
            &limiters,
            factory,
            &config.retry,
            &config.transactions,
        )
        .with_context(|| format!("failed to set up endpoints for {}", network.name))?
        .with_cancellation(cancel.child_token());

        info!(network = %network.name, endpoints = network.rpc_urls.len(), "executor ready");
        Ok(Self {
            config,
            network,
            limiters,
            executor: Arc::new(executor),
            cancel,
        })
    }

    /// Active network.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Shared executor.
    pub fn executor(&self) -> &Arc<OperationExecutor> {
        &self.executor
    }

    /// Rate limiters created by this context.
    pub fn limiters(&self) -> &RateLimiterRegistry {
        &self.limiters
    }

    /// Process-wide cancellation.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Connects the signer and builds a service manager.
    pub async fn service_manager(&self) -> Result<Operator> {
        let signer_config = &self.config.signer;
        let transport = HttpTransport::with_timeout(&signer_config.url, self.config.retry.rpc_timeout())
            .with_context(|| format!("invalid signer url {}", signer_config.url))?;
        let signer = Arc::new(
            RemoteSigner::connect(EthApi::new(Arc::new(transport)), signer_config.passphrase.clone())
                .await
                .with_context(|| format!("failed to reach signer at {}", signer_config.url))?,
        );

        let operator = match signer_config.operator {
            Some(address) => address,
            None => match signer.accounts().first() {
                Some(address) => *address,
                None => bail!("signer exposes no accounts and no operator is configured"),
            },
        };
        if !signer.can_sign(&operator) {
            bail!("signer cannot sign for operator {operator}");
        }

        let keyring_path = keyring_path(&self.config.store_path);
        let keyring = Arc::new(AccountBook::with_entries(
            signer.clone(),
            load_keyring(&keyring_path)?,
        ));
        let store = Arc::new(
            JsonServiceStore::open(&self.config.store_path)
                .with_context(|| format!("failed to open {}", self.config.store_path.display()))?,
        );

        let sender = TransactionSender::new(
            Arc::clone(&self.executor),
            signer,
            keyring.clone(),
            Arc::new(TracingHistory),
            self.config.transactions.clone(),
        );
        let contracts = OlasContracts::from_network(&self.network)
            .with_context(|| format!("Olas contracts missing for {}", self.network.name))?;
        let manager = ServiceManager::new(
            Arc::new(EvmGateway::new(Arc::new(sender))),
            keyring.clone(),
            store,
            contracts,
            self.config.olas.clone(),
            operator,
        );

        info!(network = %self.network.name, %operator, "service manager ready");
        Ok(Operator {
            manager,
            keyring,
            keyring_path,
        })
    }
}

/// A service manager and the keyring it writes to.
pub struct Operator {
    /// Lifecycle driver
    pub manager: ServiceManager,
    keyring: Arc<AccountBook>,
    keyring_path: PathBuf,
}

impl Operator {
    /// Writes keyring entries next to the service store.
    pub fn save_keyring(&self) -> Result<()> {
        let entries = self.keyring.entries();
        let raw = serde_json::to_string_pretty(&entries)?;
        if let Some(parent) = self.keyring_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.keyring_path, raw)
            .with_context(|| format!("failed to write {}", self.keyring_path.display()))?;
        debug!(path = %self.keyring_path.display(), entries = entries.len(), "keyring saved");
        Ok(())
    }

    /// Operator address.
    pub fn address(&self) -> Address {
        self.manager.operator()
    }
}

fn keyring_path(store_path: &Path) -> PathBuf {
    store_path.with_file_name("keyring.json")
}

fn load_keyring(path: &Path) -> Result<BTreeMap<String, StoredAccount>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
