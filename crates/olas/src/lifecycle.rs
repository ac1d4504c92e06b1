//! Service lifecycle orchestration.
//!
//! Every atomic transition follows the same protocol: read the registry state
//! and refuse unless it matches the source state, submit one transaction,
//! require the event that proves the transition in the receipt, then re-read
//! the registry and require the destination state. Pre-flight checks run
//! before anything is signed, so a rejected transition costs no gas.
//!
//! [`ServiceManager::spin_up`] and [`ServiceManager::wind_down`] chain the
//! atomic transitions. They are idempotent and stop at the first failing
//! step. Completed steps are irreversible and are never rolled back.

use crate::contracts::registry::{self, RegistryService};
use crate::contracts::staking::{self as staking_abi, getter};
use crate::contracts::{
    decode_address, decode_uint, decode_uint_array, decode_uint_saturating, erc20, manager, NATIVE_TOKEN,
};
use crate::error::{LifecycleError, LifecycleResult, Precondition};
use crate::events::{self, Event};
use crate::gateway::LedgerGateway;
use crate::service::{Service, ServiceState, StakingState};
use crate::staking::{StakingStatus, StakingStatusReader};
use crate::store::ServiceStore;
use chainpilot_chain::TxIntent;
use chainpilot_config::networks::{
    MULTISIG_IMPLEMENTATION, SERVICE_MANAGER, SERVICE_REGISTRY, SERVICE_REGISTRY_TOKEN_UTILITY,
};
use chainpilot_config::{NetworkConfig, OlasConfig};
use chainpilot_core::{Address, Wei, H256};
use chainpilot_rpc_client::Receipt;
use chainpilot_wallets::Keyring;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Upper bound on forward transitions in one spin-up.
const MAX_FORWARD_STEPS: usize = 3;

/// Protocol contract addresses on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OlasContracts {
    /// ServiceRegistry (ERC-721 of services)
    pub registry: Address,
    /// ServiceManagerToken
    pub manager: Address,
    /// ServiceRegistryTokenUtility, needed for token-bonded services and staking
    pub token_utility: Option<Address>,
    /// Safe multisig factory used by `deploy`
    pub multisig_implementation: Option<Address>,
}

impl OlasContracts {
    /// Reads the contract table of `network`.
    pub fn from_network(network: &NetworkConfig) -> LifecycleResult<Self> {
        let required = |name: &str| {
            network
                .contract_address(name)
                .ok_or_else(|| LifecycleError::MissingContract(name.to_string()))
        };
        Ok(Self {
            registry: required(SERVICE_REGISTRY)?,
            manager: required(SERVICE_MANAGER)?,
            token_utility: network.contract_address(SERVICE_REGISTRY_TOKEN_UTILITY),
            multisig_implementation: network.contract_address(MULTISIG_IMPLEMENTATION),
        })
    }
}

/// Parameters of a new service.
#[derive(Debug, Clone, Default)]
pub struct ServiceRequest {
    /// Local name; defaults to `service_<id>`
    pub name: Option<String>,
    /// Agent ids; empty means the configured default agent
    pub agent_ids: Vec<u32>,
    /// ERC-20 bond token; `None` bonds in native currency
    pub bonding_token: Option<Address>,
    /// Bond per agent instance
    pub bond: Wei,
}

/// One atomic step of a composite workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Reading on-chain state between steps
    Inspect,
    /// `activate_registration`
    ActivateRegistration,
    /// `register_agent`
    RegisterAgent,
    /// `deploy`
    Deploy,
    /// `stake`
    Stake,
    /// `unstake`
    Unstake,
    /// `terminate`
    Terminate,
    /// `unbond`
    Unbond,
}

impl Step {
    /// Snake-case name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inspect => "inspect",
            Self::ActivateRegistration => "activate_registration",
            Self::RegisterAgent => "register_agent",
            Self::Deploy => "deploy",
            Self::Stake => "stake",
            Self::Unstake => "unstake",
            Self::Terminate => "terminate",
            Self::Unbond => "unbond",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful composite workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    /// Service the workflow ran on
    pub service_id: u64,
    /// Steps that sent transactions, in order
    pub completed: Vec<Step>,
    /// Registry state at the end
    pub state: ServiceState,
    /// Staking contract holding the service at the end
    pub staking_contract: Option<Address>,
}

impl WorkflowReport {
    fn new(service: &Service, completed: Vec<Step>) -> Self {
        Self {
            service_id: service.service_id,
            completed,
            state: service.state,
            staking_contract: service.staking_contract,
        }
    }

    /// True when nothing had to be done.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.completed.is_empty()
    }
}

/// A composite workflow stopped at `step`.
#[derive(Error, Debug)]
#[error("{step} failed for service {service_id}: {source}")]
pub struct StepFailure {
    /// Service the workflow ran on
    pub service_id: u64,
    /// Step that failed
    pub step: Step,
    /// Steps that completed before the failure and stay in effect
    pub completed: Vec<Step>,
    /// Cause
    #[source]
    pub source: LifecycleError,
}

impl StepFailure {
    fn new(service_id: u64, step: Step, completed: &[Step], source: LifecycleError) -> Self {
        if source.is_rejection() {
            warn!(service_id, %step, error = %source, "workflow step rejected");
        } else {
            error!(service_id, %step, error = %source, "workflow step failed");
        }
        Self {
            service_id,
            step,
            completed: completed.to_vec(),
            source,
        }
    }
}

/// Result of [`ServiceManager::call_checkpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// The epoch has not ended, or its grace period is still running.
    NotNeeded {
        /// Unix time of the next reward checkpoint
        next_checkpoint: u64,
    },
    /// The epoch was closed.
    Closed {
        /// Checkpoint transaction
        tx_hash: H256,
        /// Epoch that was closed
        epoch: u128,
        /// Rewards left in the contract
        available_rewards: Wei,
        /// Services flagged for inactivity
        inactive_services: Vec<u128>,
    },
}

/// Drives services through the registry lifecycle and staking.
pub struct ServiceManager {
    gateway: Arc<dyn LedgerGateway>,
    keyring: Arc<dyn Keyring>,
    store: Arc<dyn ServiceStore>,
    contracts: OlasContracts,
    settings: OlasConfig,
    operator: Address,
}

impl ServiceManager {
    /// Creates a manager acting as `operator`, which owns created services and
    /// pays every deposit.
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        keyring: Arc<dyn Keyring>,
        store: Arc<dyn ServiceStore>,
        contracts: OlasContracts,
        settings: OlasConfig,
        operator: Address,
    ) -> Self {
        Self {
            gateway,
            keyring,
            store,
            contracts,
            settings,
            operator,
        }
    }

    /// Operator address.
    #[must_use]
    pub const fn operator(&self) -> Address {
        self.operator
    }

    /// Service store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ServiceStore> {
        &self.store
    }

    fn network(&self) -> &str {
        self.gateway.network()
    }

    fn token_utility(&self) -> LifecycleResult<Address> {
        self.contracts
            .token_utility
            .ok_or_else(|| LifecycleError::MissingContract(SERVICE_REGISTRY_TOKEN_UTILITY.to_string()))
    }

    fn persist(&self, service: &Service) -> LifecycleResult<()> {
        self.store.save(service)
    }

    async fn read_service(&self, service_id: u64) -> LifecycleResult<RegistryService> {
        let data = self
            .gateway
            .call(self.contracts.registry, registry::get_service(service_id))
            .await?;
        registry::decode_service(&data)
    }

    /// Registry state of `service_id`.
    pub async fn state(&self, service_id: u64) -> LifecycleResult<ServiceState> {
        Ok(self.read_service(service_id).await?.state)
    }

    /// Re-reads the registry state into `service`, persisting it when it changed.
    pub async fn refresh(&self, service: &mut Service) -> LifecycleResult<ServiceState> {
        let state = self.state(service.service_id).await?;
        if state != service.state {
            debug!(service_id = service.service_id, from = %service.state, to = %state, "cached state updated");
            service.state = state;
            self.persist(service)?;
        }
        Ok(state)
    }

    async fn require_state(&self, service: &Service, expected: ServiceState) -> LifecycleResult<RegistryService> {
        let info = self.read_service(service.service_id).await?;
        if info.state == expected {
            return Ok(info);
        }
        if info.state == ServiceState::NonExistent {
            return Err(Precondition::ServiceNotFound.into());
        }
        Err(Precondition::WrongState {
            expected,
            actual: info.state,
        }
        .into())
    }

    async fn confirm_state(
        &self,
        transition: &'static str,
        service: &mut Service,
        expected: ServiceState,
    ) -> LifecycleResult<RegistryService> {
        let info = self.read_service(service.service_id).await?;
        service.state = info.state;
        self.persist(service)?;
        if info.state != expected {
            return Err(LifecycleError::UnexpectedState {
                transition,
                service_id: service.service_id,
                expected: expected.to_string(),
                actual: info.state.to_string(),
            });
        }
        info!(
            network = %self.network(),
            service_id = service.service_id,
            transition,
            state = %info.state,
            "transition confirmed"
        );
        Ok(info)
    }

    /// Sends `intent` and requires `event` among the receipt's events.
    async fn submit(
        &self,
        transition: &'static str,
        intent: TxIntent,
        event: &'static str,
    ) -> LifecycleResult<(Receipt, Vec<Event>)> {
        let receipt = self.gateway.send(intent).await?;
        let extracted = events::extract_events(&receipt);
        if events::find(&extracted, event).is_none() {
            return Err(LifecycleError::MissingEvent {
                transition,
                event,
                tx_hash: receipt.transaction_hash,
            });
        }
        debug!(transition, tx_hash = %receipt.transaction_hash, events = extracted.len(), "transition mined");
        Ok((receipt, extracted))
    }

    async fn token_balance(&self, token: Address, holder: Address) -> LifecycleResult<Wei> {
        if token == NATIVE_TOKEN {
            return self.gateway.native_balance(holder).await;
        }
        decode_uint_saturating(&self.gateway.call(token, erc20::balance_of(holder)).await?)
    }

    async fn require_token_balance(&self, token: Address, required: Wei) -> LifecycleResult<()> {
        let balance = self.token_balance(token, self.operator).await?;
        if balance < required {
            return Err(Precondition::InsufficientTokenBalance { balance, required }.into());
        }
        Ok(())
    }

    /// Approves `spender` for `amount` of `token` unless the allowance already covers it.
    async fn ensure_allowance(&self, token: Address, spender: Address, amount: Wei, tag: &str) -> LifecycleResult<()> {
        let current = decode_uint_saturating(
            &self
                .gateway
                .call(token, erc20::allowance(self.operator, spender))
                .await?,
        )?;
        if current >= amount {
            debug!(token = %token, spender = %spender, allowance = current, "allowance already sufficient");
            return Ok(());
        }
        let intent = TxIntent::call(self.operator, token, erc20::approve(spender, amount)).tagged(tag);
        self.gateway.send(intent).await?;
        Ok(())
    }

    async fn agent_bond(&self, service_id: u64, agent_id: u32) -> LifecycleResult<Wei> {
        let utility = self.token_utility()?;
        decode_uint(
            &self
                .gateway
                .call(utility, registry::get_agent_bond(service_id, agent_id))
                .await?,
        )
    }

    async fn staking_state(&self, staking: Address, service_id: u64) -> LifecycleResult<StakingState> {
        staking_abi::decode_staking_state(
            &self
                .gateway
                .call(staking, staking_abi::get_staking_state(service_id))
                .await?,
        )
    }

    async fn staking_uint(&self, staking: Address, signature: &str) -> LifecycleResult<u128> {
        decode_uint(&self.gateway.call(staking, getter(signature)).await?)
    }

    /// Registers a new service owned by the operator (`NON_EXISTENT → PRE_REGISTRATION`).
    ///
    /// For token-bonded services the token utility is approved for twice the
    /// bond, covering both the security deposit and the agent bond.
    pub async fn create(&self, request: ServiceRequest) -> LifecycleResult<Service> {
        let agent_ids = if request.agent_ids.is_empty() {
            vec![self.settings.agent_id]
        } else {
            request.agent_ids
        };
        let token = request.bonding_token.unwrap_or(NATIVE_TOKEN);
        let data = manager::create(
            self.operator,
            token,
            self.settings.config_hash,
            &agent_ids,
            request.bond,
            self.settings.threshold,
        );
        let intent = TxIntent::call(self.operator, self.contracts.manager, data).tagged("olas_create_service");
        let (receipt, extracted) = self.submit("create", intent, events::CREATE_SERVICE).await?;

        let raw_id = events::find(&extracted, events::CREATE_SERVICE)
            .and_then(|event| event.uint("serviceId"))
            .ok_or_else(|| LifecycleError::decode("CreateService without serviceId"))?;
        let service_id = u64::try_from(raw_id)
            .map_err(|_| LifecycleError::decode(format!("service id out of range: {raw_id}")))?;
        info!(network = %self.network(), service_id, tx_hash = %receipt.transaction_hash, "service created");

        let mut service = Service {
            name: request.name.unwrap_or_else(|| format!("service_{service_id}")),
            network: self.network().to_string(),
            service_id,
            agent_ids,
            owner: self.operator,
            state: ServiceState::NonExistent,
            agent_address: None,
            multisig_address: None,
            bonding_token: request.bonding_token,
            bond: request.bond,
            staking_contract: None,
        };
        self.confirm_state("create", &mut service, ServiceState::PreRegistration)
            .await?;
        self.store.set_active(&service.key())?;

        if let Some(token) = request.bonding_token {
            let utility = self.token_utility()?;
            self.ensure_allowance(
                token,
                utility,
                request.bond.saturating_mul(2),
                "olas_approve_token_utility",
            )
            .await?;
        }
        Ok(service)
    }

    /// Opens agent registration (`PRE_REGISTRATION → ACTIVE_REGISTRATION`).
    ///
    /// The security deposit is always attached as native value; token-bonded
    /// services also move the token deposit through the token utility.
    pub async fn activate_registration(&self, service: &mut Service) -> LifecycleResult<H256> {
        let info = self.require_state(service, ServiceState::PreRegistration).await?;

        if let Some(token) = service.bonding_token {
            let utility = self.token_utility()?;
            let (_, deposit) = registry::decode_token_deposit(
                &self
                    .gateway
                    .call(utility, registry::map_service_id_token_deposit(service.service_id))
                    .await?,
            )?;
            self.require_token_balance(token, deposit).await?;
            self.ensure_allowance(token, utility, deposit, "olas_approve_deposit")
                .await?;
        }

        let intent = TxIntent::call(
            service.owner,
            self.contracts.manager,
            manager::activate_registration(service.service_id),
        )
        .with_value(info.security_deposit)
        .tagged("olas_activate_registration");
        let (receipt, _) = self
            .submit("activate_registration", intent, events::ACTIVATE_REGISTRATION)
            .await?;
        self.confirm_state("activate_registration", service, ServiceState::ActiveRegistration)
            .await?;
        Ok(receipt.transaction_hash)
    }

    /// Returns the agent account of `service`, topping it up with native
    /// currency for gas when it holds less than the configured funding.
    async fn provision_agent(&self, service: &Service) -> LifecycleResult<Address> {
        let label = format!("service_{}_agent", service.service_id);
        let agent = self.keyring.agent_account(&label).await?;

        let funding = Wei::from(self.settings.agent_funding_wei);
        let balance = self.gateway.native_balance(agent).await?;
        if balance < funding {
            let top_up = funding - balance;
            info!(agent = %agent, amount = top_up, "funding agent account");
            let intent = TxIntent::transfer(self.operator, agent, top_up).tagged("olas_fund_agent");
            self.gateway.send(intent).await?;
        }
        Ok(agent)
    }

    /// Registers one agent instance per agent id
    /// (`ACTIVE_REGISTRATION → FINISHED_REGISTRATION`).
    ///
    /// Without an explicit `agent` an account is provisioned from the keyring.
    pub async fn register_agent(&self, service: &mut Service, agent: Option<Address>) -> LifecycleResult<Address> {
        let info = self.require_state(service, ServiceState::ActiveRegistration).await?;
        let agent_ids = if info.agent_ids.is_empty() {
            service.agent_ids.clone()
        } else {
            info.agent_ids.clone()
        };
        if agent_ids.is_empty() {
            return Err(Precondition::NoAgents.into());
        }

        if let Some(token) = service.bonding_token {
            let utility = self.token_utility()?;
            let bond = self.agent_bond(service.service_id, agent_ids[0]).await?;
            let required = bond.saturating_mul(agent_ids.len() as Wei);
            self.require_token_balance(token, required).await?;
            self.ensure_allowance(token, utility, required, "olas_approve_bond")
                .await?;
        }

        let agent = match agent {
            Some(agent) => agent,
            None => self.provision_agent(service).await?,
        };

        let instances = vec![agent; agent_ids.len()];
        let value = info.security_deposit.saturating_mul(agent_ids.len() as Wei);
        let intent = TxIntent::call(
            self.operator,
            self.contracts.manager,
            manager::register_agents(service.service_id, &instances, &agent_ids),
        )
        .with_value(value)
        .tagged("olas_register_agent");
        self.submit("register_agent", intent, events::REGISTER_INSTANCE)
            .await?;

        service.agent_address = Some(agent);
        self.confirm_state("register_agent", service, ServiceState::FinishedRegistration)
            .await?;
        Ok(agent)
    }

    /// Deploys the service Safe (`FINISHED_REGISTRATION → DEPLOYED`) and
    /// returns its address.
    pub async fn deploy(&self, service: &mut Service) -> LifecycleResult<Address> {
        self.require_state(service, ServiceState::FinishedRegistration)
            .await?;
        let implementation = self
            .contracts
            .multisig_implementation
            .ok_or_else(|| LifecycleError::MissingContract(MULTISIG_IMPLEMENTATION.to_string()))?;

        let now = self.gateway.timestamp().await?;
        let payload = manager::deploy_payload(self.settings.fallback_handler, now);
        let intent = TxIntent::call(
            service.owner,
            self.contracts.manager,
            manager::deploy(service.service_id, implementation, payload),
        )
        .tagged("olas_deploy_service");
        let (receipt, extracted) = self.submit("deploy", intent, events::DEPLOY_SERVICE).await?;

        let multisig = events::find(&extracted, events::CREATE_MULTISIG)
            .and_then(|event| event.address("multisig"))
            .ok_or(LifecycleError::MissingEvent {
                transition: "deploy",
                event: events::CREATE_MULTISIG,
                tx_hash: receipt.transaction_hash,
            })?;
        service.multisig_address = Some(multisig);
        let info = self
            .confirm_state("deploy", service, ServiceState::Deployed)
            .await?;

        if let Err(err) = self.register_multisig(service, multisig, info.threshold).await {
            warn!(service_id = service.service_id, multisig = %multisig, error = %err, "could not record multisig in keyring");
        }
        Ok(multisig)
    }

    async fn register_multisig(&self, service: &Service, multisig: Address, threshold: u32) -> LifecycleResult<()> {
        let signers = registry::decode_agent_instances(
            &self
                .gateway
                .call(self.contracts.registry, registry::get_agent_instances(service.service_id))
                .await?,
        )?;
        self.keyring.register_multisig(
            &format!("service_{}_multisig", service.service_id),
            multisig,
            signers,
            threshold,
        )?;
        Ok(())
    }

    /// Terminates a deployed service (`DEPLOYED → TERMINATED_BONDED`).
    ///
    /// Refused while the service NFT is held by anyone but the owner, which
    /// is the case while it sits in a staking contract.
    pub async fn terminate(&self, service: &mut Service) -> LifecycleResult<H256> {
        self.require_state(service, ServiceState::Deployed).await?;
        let holder = decode_address(
            &self
                .gateway
                .call(self.contracts.registry, registry::owner_of(service.service_id))
                .await?,
        )?;
        if holder != service.owner {
            return Err(Precondition::Staked(holder).into());
        }
        if service.staking_contract.take().is_some() {
            debug!(service_id = service.service_id, "dropping stale staking contract");
            self.persist(service)?;
        }

        let intent = TxIntent::call(
            service.owner,
            self.contracts.manager,
            manager::terminate(service.service_id),
        )
        .tagged("olas_terminate_service");
        let (receipt, _) = self
            .submit("terminate", intent, events::TERMINATE_SERVICE)
            .await?;
        self.confirm_state("terminate", service, ServiceState::TerminatedBonded)
            .await?;
        Ok(receipt.transaction_hash)
    }

    /// Releases operator bonds (`TERMINATED_BONDED → PRE_REGISTRATION`).
    pub async fn unbond(&self, service: &mut Service) -> LifecycleResult<H256> {
        self.require_state(service, ServiceState::TerminatedBonded)
            .await?;

        let intent = TxIntent::call(
            service.owner,
            self.contracts.manager,
            manager::unbond(service.service_id),
        )
        .tagged("olas_unbond_service");
        let (receipt, _) = self.submit("unbond", intent, events::OPERATOR_UNBOND).await?;
        self.confirm_state("unbond", service, ServiceState::PreRegistration)
            .await?;
        Ok(receipt.transaction_hash)
    }

    /// Stakes a deployed service in `staking`.
    ///
    /// Pre-flight, in order: the service is `DEPLOYED` and not staked, its bond
    /// token is the staking token, its agent bond covers the minimum deposit,
    /// the contract has a free slot and the operator holds the deposit. Then the
    /// service NFT and the deposit are approved and `stake` is sent.
    pub async fn stake(&self, service: &mut Service, staking: Address) -> LifecycleResult<H256> {
        let info = self.require_state(service, ServiceState::Deployed).await?;
        if let Some(current) = service.staking_contract {
            if self.staking_state(current, service.service_id).await? != StakingState::NotStaked {
                return Err(Precondition::Staked(current).into());
            }
            debug!(service_id = service.service_id, staking = %current, "dropping stale staking contract");
            service.staking_contract = None;
            self.persist(service)?;
        }
        if self.staking_state(staking, service.service_id).await? != StakingState::NotStaked {
            return Err(Precondition::Staked(staking).into());
        }

        let staking_token = decode_address(
            &self
                .gateway
                .call(staking, getter(staking_abi::STAKING_TOKEN))
                .await?,
        )?;
        let service_token = service.bonding_token.unwrap_or(NATIVE_TOKEN);
        if service_token != staking_token {
            return Err(Precondition::TokenMismatch {
                service: service_token,
                staking: staking_token,
            }
            .into());
        }

        let min_deposit = self
            .staking_uint(staking, staking_abi::MIN_STAKING_DEPOSIT)
            .await?;
        let agent_id = info
            .agent_ids
            .first()
            .copied()
            .or_else(|| service.primary_agent_id())
            .ok_or(Precondition::NoAgents)?;
        let bond = self.agent_bond(service.service_id, agent_id).await?;
        if bond < min_deposit {
            return Err(Precondition::BondTooLow {
                bond,
                required: min_deposit,
            }
            .into());
        }

        let staked = decode_uint_array(
            &self
                .gateway
                .call(staking, getter(staking_abi::GET_SERVICE_IDS))
                .await?,
        )?
        .len();
        let max = self.staking_uint(staking, staking_abi::MAX_NUM_SERVICES).await?;
        if staked as u128 >= max {
            return Err(Precondition::NoFreeSlots { staked, max }.into());
        }

        self.require_token_balance(staking_token, min_deposit).await?;

        let approve_nft = TxIntent::call(
            self.operator,
            self.contracts.registry,
            registry::approve(staking, service.service_id),
        )
        .tagged("olas_approve_service_nft");
        self.gateway.send(approve_nft).await?;
        if staking_token != NATIVE_TOKEN {
            let approve_deposit =
                TxIntent::call(self.operator, staking_token, erc20::approve(staking, min_deposit))
                    .tagged("olas_approve_staking_deposit");
            self.gateway.send(approve_deposit).await?;
        }

        let intent = TxIntent::call(self.operator, staking, staking_abi::stake(service.service_id))
            .tagged("olas_stake_service");
        let (receipt, _) = self.submit("stake", intent, events::SERVICE_STAKED).await?;

        let state = self.staking_state(staking, service.service_id).await?;
        if state != StakingState::Staked {
            return Err(LifecycleError::UnexpectedState {
                transition: "stake",
                service_id: service.service_id,
                expected: StakingState::Staked.to_string(),
                actual: state.to_string(),
            });
        }
        service.staking_contract = Some(staking);
        self.persist(service)?;
        info!(network = %self.network(), service_id = service.service_id, staking = %staking, "service staked");
        Ok(receipt.transaction_hash)
    }

    /// Removes a staked or evicted service from `staking`, refusing before
    /// `ts_start + minStakingDuration`.
    pub async fn unstake(&self, service: &mut Service, staking: Address) -> LifecycleResult<H256> {
        let state = self.staking_state(staking, service.service_id).await?;
        if state == StakingState::NotStaked {
            return Err(Precondition::NotStaked(state).into());
        }

        let info = staking_abi::decode_service_info(
            &self
                .gateway
                .call(staking, staking_abi::get_service_info(service.service_id))
                .await?,
        )?;
        if info.ts_start > 0 {
            let min_duration = self
                .staking_uint(staking, staking_abi::MIN_STAKING_DURATION)
                .await?;
            let unlocks_at = info
                .ts_start
                .saturating_add(u64::try_from(min_duration).unwrap_or(u64::MAX));
            let now = self.gateway.timestamp().await?;
            if now < unlocks_at {
                return Err(Precondition::MinimumDurationNotMet { unlocks_at }.into());
            }
        }

        let intent = TxIntent::call(self.operator, staking, staking_abi::unstake(service.service_id))
            .tagged("olas_unstake_service");
        let (receipt, _) = self
            .submit("unstake", intent, events::SERVICE_UNSTAKED)
            .await?;

        let state = self.staking_state(staking, service.service_id).await?;
        if state != StakingState::NotStaked {
            return Err(LifecycleError::UnexpectedState {
                transition: "unstake",
                service_id: service.service_id,
                expected: StakingState::NotStaked.to_string(),
                actual: state.to_string(),
            });
        }
        service.staking_contract = None;
        self.persist(service)?;
        info!(network = %self.network(), service_id = service.service_id, staking = %staking, "service unstaked");
        Ok(receipt.transaction_hash)
    }

    /// Closes the current epoch of `staking` once its checkpoint time plus the
    /// configured grace period has passed.
    pub async fn call_checkpoint(&self, staking: Address) -> LifecycleResult<CheckpointOutcome> {
        let raw_next = self
            .staking_uint(staking, staking_abi::NEXT_REWARD_CHECKPOINT)
            .await?;
        let next_checkpoint = u64::try_from(raw_next)
            .map_err(|_| LifecycleError::decode(format!("checkpoint time out of range: {raw_next}")))?;
        let now = self.gateway.timestamp().await?;
        if now < next_checkpoint.saturating_add(self.settings.checkpoint_grace_secs) {
            debug!(staking = %staking, next_checkpoint, now, "checkpoint not needed");
            return Ok(CheckpointOutcome::NotNeeded { next_checkpoint });
        }

        let intent = TxIntent::call(self.operator, staking, staking_abi::checkpoint())
            .tagged("olas_checkpoint");
        let (receipt, extracted) = self
            .submit("checkpoint", intent, events::CHECKPOINT)
            .await?;
        let checkpoint = events::find(&extracted, events::CHECKPOINT);
        let epoch = checkpoint.and_then(|e| e.uint("epoch")).unwrap_or_default();
        let available_rewards = checkpoint
            .and_then(|e| e.uint("availableRewards"))
            .unwrap_or_default();
        let inactive_services: Vec<u128> = extracted
            .iter()
            .filter(|event| event.name == events::INACTIVITY_WARNING)
            .filter_map(|event| event.uint("serviceId"))
            .collect();
        if !inactive_services.is_empty() {
            warn!(staking = %staking, epoch, services = ?inactive_services, "inactivity warnings issued");
        }
        info!(staking = %staking, epoch, available_rewards, tx_hash = %receipt.transaction_hash, "epoch closed");

        Ok(CheckpointOutcome::Closed {
            tx_hash: receipt.transaction_hash,
            epoch,
            available_rewards,
            inactive_services,
        })
    }

    /// Staking position of `service` in its recorded staking contract.
    pub async fn staking_status(&self, service: &Service) -> LifecycleResult<StakingStatus> {
        StakingStatusReader::new(Arc::clone(&self.gateway))
            .status(service.service_id, service.staking_contract)
            .await
    }

    /// Loads `service_id` from the store, or imports it from the registry
    /// when this agent has not seen it before.
    pub async fn load_or_adopt(&self, service_id: u64) -> LifecycleResult<Service> {
        let key = crate::service::service_key(self.network(), service_id);
        match self.store.load(&key) {
            Some(mut service) => {
                self.refresh(&mut service).await?;
                Ok(service)
            }
            None => self.adopt(service_id).await,
        }
    }

    /// Imports an existing on-chain service into the store.
    pub async fn adopt(&self, service_id: u64) -> LifecycleResult<Service> {
        let info = self.read_service(service_id).await?;
        if info.state == ServiceState::NonExistent {
            return Err(Precondition::ServiceNotFound.into());
        }

        let token = match self.contracts.token_utility {
            Some(utility) => {
                let (token, _) = registry::decode_token_deposit(
                    &self
                        .gateway
                        .call(utility, registry::map_service_id_token_deposit(service_id))
                        .await?,
                )?;
                (token != Address::ZERO && token != NATIVE_TOKEN).then_some(token)
            }
            None => None,
        };
        let bond = match (token, info.agent_ids.first()) {
            (Some(_), Some(agent_id)) => self.agent_bond(service_id, *agent_id).await?,
            _ => registry::decode_agent_params(
                &self
                    .gateway
                    .call(self.contracts.registry, registry::get_agent_params(service_id))
                    .await?,
            )?
            .first()
            .map(|params| params.bond)
            .unwrap_or_default(),
        };
        let instances = registry::decode_agent_instances(
            &self
                .gateway
                .call(self.contracts.registry, registry::get_agent_instances(service_id))
                .await?,
        )?;

        let service = Service {
            name: format!("service_{service_id}"),
            network: self.network().to_string(),
            service_id,
            agent_ids: info.agent_ids,
            owner: self.operator,
            state: info.state,
            agent_address: instances.first().copied(),
            multisig_address: (info.multisig != Address::ZERO).then_some(info.multisig),
            bonding_token: token,
            bond,
            staking_contract: None,
        };
        self.persist(&service)?;
        info!(network = %self.network(), service_id, state = %service.state, "service adopted");
        Ok(service)
    }

    /// Moves `service` forward to `target`, staking in `staking` afterwards
    /// when the target is `DEPLOYED`.
    ///
    /// Steps already behind the service are skipped, so re-running a
    /// finished spin-up sends nothing.
    pub async fn spin_up(
        &self,
        service: &mut Service,
        target: ServiceState,
        staking: Option<Address>,
    ) -> Result<WorkflowReport, StepFailure> {
        let id = service.service_id;
        let mut completed = Vec::new();
        if !matches!(
            target,
            ServiceState::ActiveRegistration | ServiceState::FinishedRegistration | ServiceState::Deployed
        ) {
            return Err(StepFailure::new(id, Step::Inspect, &completed, LifecycleError::InvalidTarget(target)));
        }
        info!(network = %self.network(), service_id = id, %target, "spinning up service");

        let mut forward_steps = 0;
        loop {
            let state = self
                .refresh(service)
                .await
                .map_err(|e| StepFailure::new(id, Step::Inspect, &completed, e))?;
            if (target..=ServiceState::Deployed).contains(&state) {
                break;
            }
            forward_steps += 1;
            if forward_steps > MAX_FORWARD_STEPS {
                let stuck = LifecycleError::UnexpectedState {
                    transition: "spin_up",
                    service_id: id,
                    expected: target.to_string(),
                    actual: state.to_string(),
                };
                return Err(StepFailure::new(id, Step::Inspect, &completed, stuck));
            }

            let (step, outcome) = match state {
                ServiceState::PreRegistration => (
                    Step::ActivateRegistration,
                    self.activate_registration(service).await.map(drop),
                ),
                ServiceState::ActiveRegistration => {
                    (Step::RegisterAgent, self.register_agent(service, None).await.map(drop))
                }
                ServiceState::FinishedRegistration => (Step::Deploy, self.deploy(service).await.map(drop)),
                ServiceState::NonExistent => {
                    (Step::Inspect, Err(Precondition::ServiceNotFound.into()))
                }
                actual => (
                    Step::Inspect,
                    Err(Precondition::WrongState {
                        expected: ServiceState::PreRegistration,
                        actual,
                    }
                    .into()),
                ),
            };
            outcome.map_err(|e| StepFailure::new(id, step, &completed, e))?;
            completed.push(step);
        }

        if let Some(staking) = staking.filter(|_| target == ServiceState::Deployed) {
            let on_chain = self
                .staking_state(staking, id)
                .await
                .map_err(|e| StepFailure::new(id, Step::Inspect, &completed, e))?;
            match on_chain {
                StakingState::NotStaked => {
                    self.stake(service, staking)
                        .await
                        .map_err(|e| StepFailure::new(id, Step::Stake, &completed, e))?;
                    completed.push(Step::Stake);
                }
                StakingState::Staked | StakingState::Evicted => {
                    if on_chain == StakingState::Evicted {
                        warn!(service_id = id, staking = %staking, "service is evicted; unstake before restaking");
                    }
                    if service.staking_contract != Some(staking) {
                        service.staking_contract = Some(staking);
                        self.persist(service)
                            .map_err(|e| StepFailure::new(id, Step::Inspect, &completed, e))?;
                    }
                }
            }
        }

        info!(service_id = id, state = %service.state, steps = completed.len(), "spin up complete");
        Ok(WorkflowReport::new(service, completed))
    }

    /// Returns `service` to `PRE_REGISTRATION`: unstake when staked, then
    /// terminate and unbond.
    ///
    /// The staking contract is `staking` when given, otherwise the one recorded
    /// on the service.
    pub async fn wind_down(&self, service: &mut Service, staking: Option<Address>) -> Result<WorkflowReport, StepFailure> {
        let id = service.service_id;
        let mut completed = Vec::new();
        let inspect_failed = |completed: &[Step], e| StepFailure::new(id, Step::Inspect, completed, e);

        let mut state = self
            .refresh(service)
            .await
            .map_err(|e| inspect_failed(&completed, e))?;
        info!(network = %self.network(), service_id = id, %state, "winding down service");
        match state {
            ServiceState::NonExistent => {
                return Err(inspect_failed(&completed, Precondition::ServiceNotFound.into()));
            }
            ServiceState::PreRegistration => return Ok(WorkflowReport::new(service, completed)),
            ServiceState::ActiveRegistration | ServiceState::FinishedRegistration => {
                let wrong = Precondition::WrongState {
                    expected: ServiceState::Deployed,
                    actual: state,
                };
                return Err(inspect_failed(&completed, wrong.into()));
            }
            ServiceState::Deployed | ServiceState::TerminatedBonded => {}
        }

        if state == ServiceState::Deployed {
            if let Some(contract) = staking.or(service.staking_contract) {
                let on_chain = self
                    .staking_state(contract, id)
                    .await
                    .map_err(|e| inspect_failed(&completed, e))?;
                if on_chain == StakingState::NotStaked {
                    if service.staking_contract.take().is_some() {
                        self.persist(service)
                            .map_err(|e| inspect_failed(&completed, e))?;
                    }
                } else {
                    self.unstake(service, contract)
                        .await
                        .map_err(|e| StepFailure::new(id, Step::Unstake, &completed, e))?;
                    completed.push(Step::Unstake);
                }
            }

            self.terminate(service)
                .await
                .map_err(|e| StepFailure::new(id, Step::Terminate, &completed, e))?;
            completed.push(Step::Terminate);
            state = service.state;
        }

        if state == ServiceState::TerminatedBonded {
            self.unbond(service)
                .await
                .map_err(|e| StepFailure::new(id, Step::Unbond, &completed, e))?;
            completed.push(Step::Unbond);
        }

        info!(service_id = id, state = %service.state, steps = completed.len(), "wind down complete");
        Ok(WorkflowReport::new(service, completed))
    }
}
