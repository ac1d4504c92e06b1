//! Locally tracked services and their on-chain states.

use chainpilot_core::{Address, Wei};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry state of a service.
///
/// The discriminants match the registry's `uint8` encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    /// Unknown id.
    NonExistent = 0,
    /// Created, registration not yet open.
    PreRegistration = 1,
    /// Accepting agent instances.
    ActiveRegistration = 2,
    /// Every agent slot is filled.
    FinishedRegistration = 3,
    /// Multisig deployed.
    Deployed = 4,
    /// Terminated, bonds still locked.
    TerminatedBonded = 5,
}

impl ServiceState {
    /// Decodes the registry representation.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NonExistent),
            1 => Some(Self::PreRegistration),
            2 => Some(Self::ActiveRegistration),
            3 => Some(Self::FinishedRegistration),
            4 => Some(Self::Deployed),
            5 => Some(Self::TerminatedBonded),
            _ => None,
        }
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NonExistent => "NON_EXISTENT",
            Self::PreRegistration => "PRE_REGISTRATION",
            Self::ActiveRegistration => "ACTIVE_REGISTRATION",
            Self::FinishedRegistration => "FINISHED_REGISTRATION",
            Self::Deployed => "DEPLOYED",
            Self::TerminatedBonded => "TERMINATED_BONDED",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staking sub-state of a deployed service.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StakingState {
    /// Not in the staking contract.
    NotStaked = 0,
    /// Staked and earning.
    Staked = 1,
    /// Removed for inactivity; still holds its deposit.
    Evicted = 2,
}

impl StakingState {
    /// Decodes the staking contract representation.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotStaked),
            1 => Some(Self::Staked),
            2 => Some(Self::Evicted),
            _ => None,
        }
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStaked => "NOT_STAKED",
            Self::Staked => "STAKED",
            Self::Evicted => "EVICTED",
        }
    }
}

impl fmt::Display for StakingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service the agent created or adopted.
///
/// `state` is a cache of the registry; transitions always re-read the chain
/// before relying on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Human readable name
    pub name: String,
    /// Network the service lives on
    pub network: String,
    /// Registry id
    pub service_id: u64,
    /// Agent ids, one instance each
    pub agent_ids: Vec<u32>,
    /// Service owner
    pub owner: Address,
    /// Last observed registry state
    pub state: ServiceState,
    /// Registered agent instance
    #[serde(default)]
    pub agent_address: Option<Address>,
    /// Deployed Safe
    #[serde(default)]
    pub multisig_address: Option<Address>,
    /// ERC-20 bond token; `None` for native-bonded services
    #[serde(default)]
    pub bonding_token: Option<Address>,
    /// Bond per agent instance
    #[serde(default)]
    pub bond: Wei,
    /// Staking contract holding the service
    #[serde(default)]
    pub staking_contract: Option<Address>,
}

impl Service {
    /// Store key, `network:service_id`.
    #[must_use]
    pub fn key(&self) -> String {
        service_key(&self.network, self.service_id)
    }

    /// True when bonds are paid in an ERC-20 token.
    #[must_use]
    pub const fn is_token_bonded(&self) -> bool {
        self.bonding_token.is_some()
    }

    /// First agent id, used for bond lookups.
    #[must_use]
    pub fn primary_agent_id(&self) -> Option<u32> {
        self.agent_ids.first().copied()
    }
}

/// Builds the store key of a service.
#[must_use]
pub fn service_key(network: &str, service_id: u64) -> String {
    format!("{network}:{service_id}")
}
