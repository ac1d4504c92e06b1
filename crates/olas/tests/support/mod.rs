//! An in-memory registry, staking contract and token answering by selector.
#![allow(dead_code)]

use async_trait::async_trait;
use chainpilot_chain::TxIntent;
use chainpilot_config::OlasConfig;
use chainpilot_core::abi::{self, ParamType, Token};
use chainpilot_core::{selector, Address, Bytes, Wei, H256};
use chainpilot_olas::contracts::registry::{self, RegistryService};
use chainpilot_olas::contracts::staking::{self as staking_abi, StakedServiceInfo};
use chainpilot_olas::contracts::{erc20, manager, NATIVE_TOKEN};
use chainpilot_olas::events::{self, encode_log};
use chainpilot_olas::{
    JsonServiceStore, LedgerGateway, LifecycleResult, OlasContracts, Service, ServiceManager,
    ServiceState, StakingState,
};
use chainpilot_rpc_client::{Log, Receipt};
use chainpilot_wallets::{Keyring, WalletResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub const OPERATOR: Address = Address::new([0x0a; 20]);
pub const AGENT: Address = Address::new([0xa6; 20]);
pub const SAFE: Address = Address::new([0x5a; 20]);
pub const REGISTRY: Address = Address::new([0x01; 20]);
pub const MANAGER: Address = Address::new([0x02; 20]);
pub const UTILITY: Address = Address::new([0x03; 20]);
pub const SAFE_FACTORY: Address = Address::new([0x04; 20]);
pub const STAKING: Address = Address::new([0x05; 20]);
pub const CHECKER: Address = Address::new([0x06; 20]);
pub const OLAS: Address = Address::new([0x07; 20]);

pub const SERVICE_ID: u64 = 42;
pub const NOW: u64 = 1_700_000_000;
pub const ONE_PER_THOUSAND_SECONDS: u128 = 1_000_000_000_000_000;

/// Mutable chain state.
#[derive(Debug, Clone)]
pub struct World {
    pub now: u64,
    pub state: ServiceState,
    pub security_deposit: Wei,
    pub agent_ids: Vec<u32>,
    pub instances: Vec<Address>,
    pub multisig: Address,
    pub bond_token: Address,
    pub agent_bond: Wei,
    pub token_balance: Wei,
    pub allowance: Wei,
    /// Answers `allowance` with `type(uint256).max`.
    pub unlimited_allowance: bool,
    pub native_balances: HashMap<Address, Wei>,
    pub staking_token: Address,
    pub staking_state: StakingState,
    pub staked_ids: Vec<u128>,
    pub max_services: u128,
    pub min_deposit: Wei,
    pub min_duration: u64,
    pub ts_start: u64,
    pub liveness_period: u64,
    pub liveness_ratio: u128,
    pub ts_checkpoint: u64,
    pub next_checkpoint: u64,
    pub epoch: u128,
    pub reward: Wei,
    pub available_rewards: Wei,
    pub checkpoint_nonces: Vec<u128>,
    pub current_nonces: Vec<u128>,
    pub inactive: Vec<u128>,
    /// When false, mined receipts carry no logs.
    pub emit_events: bool,
}

impl Default for World {
    fn default() -> Self {
        Self {
            now: NOW,
            state: ServiceState::NonExistent,
            security_deposit: 1,
            agent_ids: vec![25],
            instances: Vec::new(),
            multisig: Address::ZERO,
            bond_token: NATIVE_TOKEN,
            agent_bond: 1,
            token_balance: 0,
            allowance: 0,
            unlimited_allowance: false,
            native_balances: HashMap::new(),
            staking_token: OLAS,
            staking_state: StakingState::NotStaked,
            staked_ids: Vec::new(),
            max_services: 2,
            min_deposit: 50,
            min_duration: 3 * 86_400,
            ts_start: 0,
            liveness_period: 86_400,
            liveness_ratio: ONE_PER_THOUSAND_SECONDS,
            ts_checkpoint: NOW - 3_600,
            next_checkpoint: NOW + 82_800,
            epoch: 7,
            reward: 0,
            available_rewards: 1_000,
            checkpoint_nonces: Vec::new(),
            current_nonces: Vec::new(),
            inactive: Vec::new(),
            emit_events: true,
        }
    }
}

impl World {
    /// A token-bonded service ready to stake.
    pub fn deployed_olas_service() -> Self {
        Self {
            state: ServiceState::Deployed,
            instances: vec![AGENT],
            multisig: SAFE,
            bond_token: OLAS,
            agent_bond: 50,
            token_balance: 100,
            ..Self::default()
        }
    }

    fn registry_view(&self) -> RegistryService {
        RegistryService {
            security_deposit: self.security_deposit,
            multisig: self.multisig,
            config_hash: H256::new([0x10; 32]),
            threshold: 1,
            max_num_agent_instances: 1,
            num_agent_instances: self.instances.len() as u32,
            state: self.state,
            agent_ids: self.agent_ids.clone(),
        }
    }
}

fn is(data: &[u8], signature: &str) -> bool {
    data.len() >= 4 && data[..4] == selector(signature)
}

fn uint(value: u128) -> Vec<u8> {
    abi::encode(&[Token::Uint(value)])
}

fn args(data: &[u8], kinds: &[ParamType]) -> Vec<Token> {
    abi::decode(kinds, &data[4..]).expect("calldata decodes")
}

/// A [`LedgerGateway`] over a [`World`].
pub struct FakeLedger {
    pub world: Mutex<World>,
    pub sent: Mutex<Vec<TxIntent>>,
}

impl FakeLedger {
    pub fn new(world: World) -> Arc<Self> {
        Arc::new(Self {
            world: Mutex::new(world),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent_tags(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .flat_map(|intent| intent.tags.clone())
            .collect()
    }

    pub fn with_world<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut self.world.lock())
    }

    fn view(&self, to: Address, data: &[u8]) -> Vec<u8> {
        let w = self.world.lock();
        if is(data, registry::GET_SERVICE) {
            registry::encode_service(&w.registry_view())
        } else if is(data, registry::GET_AGENT_INSTANCES) {
            abi::encode(&[
                Token::Uint(w.instances.len() as u128),
                Token::Array(w.instances.iter().copied().map(Token::Address).collect()),
            ])
        } else if is(data, registry::GET_AGENT_PARAMS) {
            abi::encode(&[
                Token::Uint(1),
                Token::Array(vec![Token::Tuple(vec![Token::Uint(1), Token::Uint(w.agent_bond)])]),
            ])
        } else if is(data, registry::MAP_SERVICE_ID_TOKEN_DEPOSIT) {
            abi::encode(&[Token::Address(w.bond_token), Token::Uint(w.security_deposit)])
        } else if is(data, registry::GET_AGENT_BOND) {
            uint(w.agent_bond)
        } else if is(data, erc20::BALANCE_OF) {
            uint(w.token_balance)
        } else if is(data, erc20::ALLOWANCE) {
            if w.unlimited_allowance {
                vec![0xff; 32]
            } else {
                uint(w.allowance)
            }
        } else if is(data, registry::OWNER_OF) {
            let holder = if w.staking_state == StakingState::NotStaked { OPERATOR } else { STAKING };
            abi::encode(&[Token::Address(holder)])
        } else if is(data, staking_abi::STAKING_TOKEN) {
            abi::encode(&[Token::Address(w.staking_token)])
        } else if is(data, staking_abi::MIN_STAKING_DEPOSIT) {
            uint(w.min_deposit)
        } else if is(data, staking_abi::MAX_NUM_SERVICES) {
            uint(w.max_services)
        } else if is(data, staking_abi::GET_SERVICE_IDS) {
            abi::encode(&[Token::Array(w.staked_ids.iter().copied().map(Token::Uint).collect())])
        } else if is(data, staking_abi::GET_STAKING_STATE) {
            uint(w.staking_state as u128)
        } else if is(data, staking_abi::GET_SERVICE_INFO) {
            staking_abi::encode_service_info(&StakedServiceInfo {
                multisig: w.multisig,
                owner: OPERATOR,
                nonces: w.checkpoint_nonces.clone(),
                ts_start: w.ts_start,
                reward: w.reward,
                inactivity: 0,
            })
        } else if is(data, staking_abi::MIN_STAKING_DURATION) {
            uint(u128::from(w.min_duration))
        } else if is(data, staking_abi::NEXT_REWARD_CHECKPOINT) {
            uint(u128::from(w.next_checkpoint))
        } else if is(data, staking_abi::ACTIVITY_CHECKER) {
            abi::encode(&[Token::Address(CHECKER)])
        } else if is(data, staking_abi::LIVENESS_RATIO) {
            uint(w.liveness_ratio)
        } else if is(data, staking_abi::LIVENESS_PERIOD) {
            uint(u128::from(w.liveness_period))
        } else if is(data, staking_abi::TS_CHECKPOINT) {
            uint(u128::from(w.ts_checkpoint))
        } else if is(data, staking_abi::EPOCH_COUNTER) {
            uint(w.epoch)
        } else if is(data, staking_abi::CALCULATE_STAKING_REWARD) {
            uint(w.reward)
        } else if is(data, staking_abi::GET_MULTISIG_NONCES) {
            abi::encode(&[Token::Array(w.current_nonces.iter().copied().map(Token::Uint).collect())])
        } else {
            panic!("unexpected call to {to}: 0x{}", hex_prefix(data));
        }
    }

    fn apply(&self, intent: &TxIntent) -> Vec<Log> {
        let mut w = self.world.lock();
        let data = &intent.data;
        let id = Token::Uint(u128::from(SERVICE_ID));
        let log = |name: &str, contract: Address, values: Vec<Token>| {
            encode_log(name, contract, &values).expect("known event")
        };

        if data.is_empty() {
            *w.native_balances.entry(intent.to).or_default() += intent.value;
            return Vec::new();
        }

        match intent.to {
            MANAGER if is(data, manager::CREATE) => {
                w.state = ServiceState::PreRegistration;
                vec![log(events::CREATE_SERVICE, REGISTRY, vec![id, Token::FixedBytes(H256::new([0x10; 32]))])]
            }
            MANAGER if is(data, manager::ACTIVATE_REGISTRATION) => {
                w.state = ServiceState::ActiveRegistration;
                vec![log(events::ACTIVATE_REGISTRATION, REGISTRY, vec![id])]
            }
            MANAGER if is(data, manager::REGISTER_AGENTS) => {
                let decoded = args(
                    data,
                    &[ParamType::Uint, ParamType::address_array(), ParamType::uint_array()],
                );
                w.instances = decoded[1].as_address_array().unwrap_or_default();
                w.state = ServiceState::FinishedRegistration;
                let agent = w.instances.first().copied().unwrap_or_default();
                vec![log(
                    events::REGISTER_INSTANCE,
                    REGISTRY,
                    vec![Token::Address(OPERATOR), id, Token::Address(agent), Token::Uint(25)],
                )]
            }
            MANAGER if is(data, manager::DEPLOY) => {
                w.state = ServiceState::Deployed;
                w.multisig = SAFE;
                vec![
                    log(events::CREATE_MULTISIG, REGISTRY, vec![id.clone(), Token::Address(SAFE)]),
                    log(events::DEPLOY_SERVICE, REGISTRY, vec![id]),
                ]
            }
            MANAGER if is(data, manager::TERMINATE) => {
                w.state = ServiceState::TerminatedBonded;
                vec![log(events::TERMINATE_SERVICE, REGISTRY, vec![id])]
            }
            MANAGER if is(data, manager::UNBOND) => {
                w.state = ServiceState::PreRegistration;
                w.instances.clear();
                vec![log(events::OPERATOR_UNBOND, REGISTRY, vec![Token::Address(OPERATOR), id])]
            }
            REGISTRY if is(data, registry::APPROVE) => Vec::new(),
            STAKING if is(data, staking_abi::STAKE) => {
                w.staking_state = StakingState::Staked;
                w.staked_ids.push(u128::from(SERVICE_ID));
                w.ts_start = w.now;
                let nonces = Token::Array(w.current_nonces.iter().copied().map(Token::Uint).collect());
                vec![log(
                    events::SERVICE_STAKED,
                    STAKING,
                    vec![Token::Uint(w.epoch), id, Token::Address(OPERATOR), Token::Address(w.multisig), nonces],
                )]
            }
            STAKING if is(data, staking_abi::UNSTAKE) => {
                w.staking_state = StakingState::NotStaked;
                w.staked_ids.retain(|staked| *staked != u128::from(SERVICE_ID));
                w.ts_start = 0;
                let nonces = Token::Array(w.current_nonces.iter().copied().map(Token::Uint).collect());
                vec![log(
                    events::SERVICE_UNSTAKED,
                    STAKING,
                    vec![
                        Token::Uint(w.epoch),
                        id,
                        Token::Address(OPERATOR),
                        Token::Address(w.multisig),
                        nonces,
                        Token::Uint(w.reward),
                    ],
                )]
            }
            STAKING if is(data, staking_abi::CHECKPOINT) => {
                let closed = w.epoch;
                w.epoch += 1;
                w.ts_checkpoint = w.now;
                w.next_checkpoint = w.now + w.liveness_period;
                let mut logs: Vec<Log> = w
                    .inactive
                    .iter()
                    .map(|service| {
                        log(
                            events::INACTIVITY_WARNING,
                            STAKING,
                            vec![Token::Uint(closed), Token::Uint(*service), Token::Uint(1)],
                        )
                    })
                    .collect();
                logs.push(log(
                    events::CHECKPOINT,
                    STAKING,
                    vec![
                        Token::Uint(closed),
                        Token::Uint(w.available_rewards),
                        Token::Array(Vec::new()),
                        Token::Array(Vec::new()),
                        Token::Uint(u128::from(w.liveness_period)),
                    ],
                ));
                logs
            }
            token if is(data, erc20::APPROVE) => {
                let decoded = args(data, &[ParamType::Address, ParamType::Uint]);
                if token == w.bond_token || token == w.staking_token {
                    w.allowance = decoded[1].as_uint().unwrap_or_default();
                }
                Vec::new()
            }
            other => panic!("unexpected transaction to {other}: 0x{}", hex_prefix(data)),
        }
    }
}

fn hex_prefix(data: &[u8]) -> String {
    data.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
impl LedgerGateway for FakeLedger {
    fn network(&self) -> &str {
        "gnosis"
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> LifecycleResult<Bytes> {
        Ok(Bytes(self.view(to, &data)))
    }

    async fn send(&self, intent: TxIntent) -> LifecycleResult<Receipt> {
        let logs = self.apply(&intent);
        let mut sent = self.sent.lock();
        sent.push(intent);
        let n = sent.len() as u8;
        let emit = self.world.lock().emit_events;
        Ok(Receipt {
            transaction_hash: H256::new([n; 32]),
            status: 1,
            block_number: u64::from(n),
            gas_used: 21_000,
            effective_gas_price: None,
            logs: if emit { logs } else { Vec::new() },
        })
    }

    async fn native_balance(&self, address: Address) -> LifecycleResult<Wei> {
        Ok(self
            .world
            .lock()
            .native_balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn timestamp(&self) -> LifecycleResult<u64> {
        Ok(self.world.lock().now)
    }
}

/// Keyring handing out [`AGENT`] and recording multisigs.
#[derive(Default)]
pub struct FakeKeyring {
    pub multisigs: Mutex<Vec<(String, Address, Vec<Address>, u32)>>,
}

#[async_trait]
impl Keyring for FakeKeyring {
    async fn agent_account(&self, _label: &str) -> WalletResult<Address> {
        Ok(AGENT)
    }

    fn register_multisig(
        &self,
        label: &str,
        address: Address,
        signers: Vec<Address>,
        threshold: u32,
    ) -> WalletResult<()> {
        self.multisigs
            .lock()
            .push((label.to_string(), address, signers, threshold));
        Ok(())
    }

    fn is_multisig(&self, address: &Address) -> bool {
        self.multisigs.lock().iter().any(|entry| entry.1 == *address)
    }

    fn resolve(&self, label: &str) -> Option<Address> {
        self.multisigs
            .lock()
            .iter()
            .find(|entry| entry.0 == label)
            .map(|entry| entry.1)
    }
}

pub struct Harness {
    pub ledger: Arc<FakeLedger>,
    pub keyring: Arc<FakeKeyring>,
    pub store: Arc<JsonServiceStore>,
    pub manager: ServiceManager,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(world: World) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(JsonServiceStore::open(dir.path().join("services.json")).expect("store"));
        let ledger = FakeLedger::new(world);
        let keyring = Arc::new(FakeKeyring::default());
        let contracts = OlasContracts {
            registry: REGISTRY,
            manager: MANAGER,
            token_utility: Some(UTILITY),
            multisig_implementation: Some(SAFE_FACTORY),
        };
        let settings = OlasConfig {
            agent_funding_wei: 100,
            checkpoint_grace_secs: 600,
            ..OlasConfig::default()
        };
        let manager = ServiceManager::new(
            ledger.clone(),
            keyring.clone(),
            store.clone(),
            contracts,
            settings,
            OPERATOR,
        );
        Self {
            ledger,
            keyring,
            store,
            manager,
            _dir: dir,
        }
    }

    /// Local record matching the world's current service.
    pub fn service(&self) -> Service {
        let w = self.ledger.world.lock();
        Service {
            name: "trader".to_string(),
            network: "gnosis".to_string(),
            service_id: SERVICE_ID,
            agent_ids: w.agent_ids.clone(),
            owner: OPERATOR,
            state: w.state,
            agent_address: w.instances.first().copied(),
            multisig_address: (w.multisig != Address::ZERO).then_some(w.multisig),
            bonding_token: (w.bond_token != NATIVE_TOKEN).then_some(w.bond_token),
            bond: w.agent_bond,
            staking_contract: (w.staking_state != StakingState::NotStaked).then_some(STAKING),
        }
    }
}
