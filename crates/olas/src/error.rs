use crate::service::{ServiceState, StakingState};
use chainpilot_chain::ChainError;
use chainpilot_core::{Address, CoreError, Wei, H256};
use chainpilot_wallets::WalletError;
use thiserror::Error;

/// Result type for lifecycle operations
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// A pre-flight check that failed before any transaction was sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The registry reports a different state than the transition needs.
    #[error("service is {actual}, expected {expected}")]
    WrongState {
        /// Required source state
        expected: ServiceState,
        /// Observed state
        actual: ServiceState,
    },

    /// The registry does not know the service.
    #[error("service does not exist")]
    ServiceNotFound,

    /// The service is staked and must be unstaked first. Carries the staking
    /// contract, or whoever holds the service NFT.
    #[error("service is staked in {0}")]
    Staked(Address),

    /// The service is not staked in the given contract.
    #[error("service is {0} in the staking contract")]
    NotStaked(StakingState),

    /// Bond token differs from the staking token.
    #[error("service bonds {service} but staking requires {staking}")]
    TokenMismatch {
        /// Token the service was created with
        service: Address,
        /// Token the staking contract expects
        staking: Address,
    },

    /// Agent bond is below the staking deposit.
    #[error("agent bond {bond} is below the required {required}")]
    BondTooLow {
        /// Current bond
        bond: Wei,
        /// Required bond
        required: Wei,
    },

    /// The staking contract is full.
    #[error("staking contract is full ({staked}/{max})")]
    NoFreeSlots {
        /// Services currently staked
        staked: usize,
        /// Capacity
        max: u128,
    },

    /// The payer lacks tokens.
    #[error("token balance {balance} is below the required {required}")]
    InsufficientTokenBalance {
        /// Balance held
        balance: Wei,
        /// Amount required
        required: Wei,
    },

    /// The minimum staking duration has not elapsed.
    #[error("minimum staking duration not met, unstake possible at {unlocks_at}")]
    MinimumDurationNotMet {
        /// Unix time after which unstaking is allowed
        unlocks_at: u64,
    },

    /// The service has no agent ids.
    #[error("service has no agent ids")]
    NoAgents,
}

/// Lifecycle errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A pre-flight check failed; nothing was sent.
    #[error("rejected: {0}")]
    Rejected(#[from] Precondition),

    /// A mined transaction lacked the event that proves the transition.
    #[error("{transition} transaction {tx_hash} emitted no {event} event")]
    MissingEvent {
        /// Transition name
        transition: &'static str,
        /// Expected event
        event: &'static str,
        /// Transaction hash
        tx_hash: H256,
    },

    /// The registry did not reach the expected state after a transition.
    #[error("after {transition} service {service_id} is {actual}, expected {expected}")]
    UnexpectedState {
        /// Transition name
        transition: &'static str,
        /// Service id
        service_id: u64,
        /// Expected destination state
        expected: String,
        /// Observed state
        actual: String,
    },

    /// A spin-up target that is not reachable going forward.
    #[error("cannot spin up to {0}")]
    InvalidTarget(ServiceState),

    /// A contract the operation needs is not configured for the network.
    #[error("contract '{0}' is not configured")]
    MissingContract(String),

    /// A contract returned data that does not match its ABI.
    #[error("unexpected contract output: {0}")]
    Decode(String),

    /// The service store failed.
    #[error("service store error: {0}")]
    Store(String),

    /// Execution layer failure.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Keyring failure.
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl LifecycleError {
    /// Creates a decode error.
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode(message.into())
    }

    /// Creates a store error.
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store(message.into())
    }

    /// True for pre-flight rejections, which are expected outcomes rather than faults.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The precondition that failed, if any.
    #[must_use]
    pub const fn precondition(&self) -> Option<&Precondition> {
        match self {
            Self::Rejected(precondition) => Some(precondition),
            _ => None,
        }
    }
}

impl From<CoreError> for LifecycleError {
    fn from(err: CoreError) -> Self {
        Self::Decode(err.to_string())
    }
}
