//! chainpilot configuration
//!
//! Configuration is read once at startup from a TOML file and is immutable
//! afterwards. Every section has defaults, so a file only needs to name the
//! networks it talks to; well-known networks are completed from built-in presets.

use chainpilot_core::{Address, H256, Wei};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

pub mod networks;

/// Default steady-state request rate per network (tokens per second).
pub const DEFAULT_RATE: f64 = 25.0;
/// Default token-bucket capacity per network.
pub const DEFAULT_BURST: u32 = 50;
/// Default number of retries for a single operation.
pub const DEFAULT_MAX_RETRIES: u32 = 6;

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A network name was requested that is not configured.
    #[error("network '{0}' is not configured")]
    UnknownNetwork(String),
}

impl ConfigError {
    fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid(message.into())
    }
}

/// Static description of one ledger network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network name used as the key for limiters, stores and logs.
    pub name: String,
    /// Interchangeable endpoints, tried in order.
    pub rpc_urls: Vec<String>,
    /// Chain id used when signing.
    pub chain_id: u64,
    /// Symbol of the native currency.
    pub native_symbol: String,
    /// Token symbol to contract address.
    pub tokens: BTreeMap<String, Address>,
    /// Named protocol contracts.
    pub contracts: BTreeMap<String, Address>,
    /// Token-bucket refill rate (requests per second).
    pub rate: f64,
    /// Token-bucket capacity.
    pub burst: u32,
    /// Lower bound for the priority fee, in wei.
    pub min_priority_fee: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            rpc_urls: Vec::new(),
            chain_id: 0,
            native_symbol: String::new(),
            tokens: BTreeMap::new(),
            contracts: BTreeMap::new(),
            rate: DEFAULT_RATE,
            burst: DEFAULT_BURST,
            min_priority_fee: 1,
        }
    }
}

impl NetworkConfig {
    /// Looks up a token address by symbol, case-insensitively.
    #[must_use]
    pub fn token_address(&self, symbol: &str) -> Option<Address> {
        self.tokens
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(symbol))
            .map(|(_, address)| *address)
    }

    /// Looks up a named contract.
    #[must_use]
    pub fn contract_address(&self, name: &str) -> Option<Address> {
        self.contracts.get(name).copied()
    }

    /// Priority fee floor as a wei amount.
    #[must_use]
    pub fn priority_fee_floor(&self) -> Wei {
        Wei::from(self.min_priority_fee)
    }

    /// Fills unset fields from the preset with the same name, if there is one.
    ///
    /// Explicit entries always win; preset tokens and contracts are only added
    /// where the file does not name them.
    #[must_use]
    pub fn with_preset_defaults(mut self) -> Self {
        let Some(preset) = networks::preset(&self.name) else {
            return self;
        };
        if self.rpc_urls.is_empty() {
            self.rpc_urls = preset.rpc_urls;
        }
        if self.chain_id == 0 {
            self.chain_id = preset.chain_id;
        }
        if self.native_symbol.is_empty() {
            self.native_symbol = preset.native_symbol;
        }
        for (symbol, address) in preset.tokens {
            self.tokens.entry(symbol).or_insert(address);
        }
        for (name, address) in preset.contracts {
            self.contracts.entry(name).or_insert(address);
        }
        self
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::invalid("network name must not be empty"));
        }
        if self.rpc_urls.is_empty() {
            return Err(ConfigError::invalid(format!(
                "network '{}' has no rpc_urls",
                self.name
            )));
        }
        for raw in &self.rpc_urls {
            let url = Url::parse(raw).map_err(|err| {
                ConfigError::invalid(format!("network '{}': bad url '{raw}': {err}", self.name))
            })?;
            if url.scheme() == "http" && !is_loopback(&url) {
                warn!(
                    network = %self.name,
                    url = %raw,
                    "endpoint uses plain http; traffic and keys in transit are not protected"
                );
            }
        }
        if self.rate.is_nan() || self.rate <= 0.0 {
            return Err(ConfigError::invalid(format!(
                "network '{}': rate must be positive",
                self.name
            )));
        }
        if self.burst == 0 {
            return Err(ConfigError::invalid(format!(
                "network '{}': burst must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

fn is_loopback(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]" | "::1"))
}

/// Retry and throttling settings for the operation executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff sleep.
    pub max_delay_ms: u64,
    /// Forced cool-down after a rate-limit response that cannot be rotated away.
    pub rate_limit_backoff_secs: u64,
    /// Per-request transport timeout.
    pub rpc_timeout_secs: u64,
    /// Longest time a caller waits for a limiter token.
    pub throttle_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: 1_000,
            max_delay_ms: 32_000,
            rate_limit_backoff_secs: 5,
            rpc_timeout_secs: 10,
            throttle_timeout_secs: 30,
        }
    }
}

impl RetryConfig {
    /// Base backoff delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff ceiling.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Rate-limit cool-down.
    #[must_use]
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    /// Transport timeout.
    #[must_use]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Limiter wait bound.
    #[must_use]
    pub fn throttle_timeout(&self) -> Duration {
        Duration::from_secs(self.throttle_timeout_secs)
    }
}

/// Transaction submission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Longest wait for a receipt.
    pub receipt_timeout_secs: u64,
    /// Receipt polling interval.
    pub receipt_poll_ms: u64,
    /// Longest wait for the sender's pending pool to drain.
    pub pending_wait_secs: u64,
    /// Pending-pool polling interval.
    pub pending_poll_ms: u64,
    /// Re-sign attempts after fee rejections.
    pub fee_bump_attempts: u32,
    /// Gas ceiling used when simulation fails.
    pub fallback_gas_limit: u64,
    /// Gas ceiling for a plain native transfer when simulation fails.
    pub transfer_gas_limit: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 120,
            receipt_poll_ms: 1_000,
            pending_wait_secs: 60,
            pending_poll_ms: 2_000,
            fee_bump_attempts: 3,
            fallback_gas_limit: 500_000,
            transfer_gas_limit: 21_000,
        }
    }
}

impl TransactionConfig {
    /// Receipt wait bound.
    #[must_use]
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    /// Receipt polling interval.
    #[must_use]
    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    /// Pending-pool wait bound.
    #[must_use]
    pub fn pending_wait(&self) -> Duration {
        Duration::from_secs(self.pending_wait_secs)
    }

    /// Pending-pool polling interval.
    #[must_use]
    pub fn pending_poll(&self) -> Duration {
        Duration::from_millis(self.pending_poll_ms)
    }
}

/// Olas service lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OlasConfig {
    /// Service configuration hash passed to `create`.
    pub config_hash: H256,
    /// Agent id registered for new services.
    pub agent_id: u32,
    /// Multisig threshold for new services.
    pub threshold: u32,
    /// Native amount sent to a fresh agent account for gas.
    pub agent_funding_wei: u64,
    /// Delay after an epoch ends before anyone may checkpoint.
    pub checkpoint_grace_secs: u64,
    /// Safe fallback handler baked into the deployment payload.
    pub fallback_handler: Address,
}

/// Configuration hash of the trader agent package.
pub const TRADER_CONFIG_HASH: H256 = H256::new([
    0x10, 0x8e, 0x90, 0x79, 0x51, 0x19, 0xd6, 0x01, 0x52, 0x74, 0xef, 0x03, 0xaf, 0x1a, 0x66, 0x9c,
    0x6d, 0x13, 0xab, 0x6a, 0xcc, 0x9e, 0x2b, 0x29, 0x78, 0xbe, 0x01, 0xee, 0x9e, 0xa2, 0xec, 0x93,
]);

/// Default Safe compatibility fallback handler.
pub const DEFAULT_FALLBACK_HANDLER: Address = Address::new([
    0xf4, 0x8f, 0x2b, 0x2d, 0x2a, 0x53, 0x4e, 0x40, 0x24, 0x87, 0xb3, 0xee, 0x7c, 0x18, 0xc3, 0x3a,
    0xec, 0x0f, 0xe5, 0xe4,
]);

impl Default for OlasConfig {
    fn default() -> Self {
        Self {
            config_hash: TRADER_CONFIG_HASH,
            agent_id: 25,
            threshold: 1,
            agent_funding_wei: 100_000_000_000_000_000,
            checkpoint_grace_secs: 600,
            fallback_handler: DEFAULT_FALLBACK_HANDLER,
        }
    }
}

/// Remote signing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// JSON-RPC endpoint exposing `eth_signTransaction`.
    pub url: String,
    /// Passphrase used when the signer creates new accounts.
    pub passphrase: String,
    /// Address of the operator account that owns services and pays for transactions.
    pub operator: Option<Address>,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8550".to_string(),
            passphrase: String::new(),
            operator: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Network used when none is given on the command line.
    pub default_network: String,
    /// Configured networks.
    pub networks: Vec<NetworkConfig>,
    /// Retry and throttle settings.
    pub retry: RetryConfig,
    /// Transaction submission settings.
    pub transactions: TransactionConfig,
    /// Lifecycle settings.
    pub olas: OlasConfig,
    /// Signing endpoint.
    pub signer: SignerConfig,
    /// File holding locally known services.
    pub store_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_network: "gnosis".to_string(),
            networks: vec![networks::gnosis()],
            retry: RetryConfig::default(),
            transactions: TransactionConfig::default(),
            olas: OlasConfig::default(),
            signer: SignerConfig::default(),
            store_path: PathBuf::from("./data/services.json"),
        }
    }
}

impl AppConfig {
    /// Loads, completes and validates a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses, completes and validates configuration text.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let mut config: AppConfig = toml::from_str(content)?;
        config.networks = config
            .networks
            .into_iter()
            .map(NetworkConfig::with_preset_defaults)
            .collect();
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.networks.is_empty() {
            return Err(ConfigError::invalid("at least one network is required"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for network in &self.networks {
            network.validate()?;
            if !seen.insert(network.name.to_ascii_lowercase()) {
                return Err(ConfigError::invalid(format!(
                    "network '{}' is configured twice",
                    network.name
                )));
            }
        }
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::invalid("retry.base_delay_ms must be positive"));
        }
        if self.olas.threshold == 0 {
            return Err(ConfigError::invalid("olas.threshold must be at least 1"));
        }
        Ok(())
    }

    /// Returns the named network.
    pub fn network(&self, name: &str) -> ConfigResult<&NetworkConfig> {
        self.networks
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
    }
}
