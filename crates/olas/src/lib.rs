//! # chainpilot olas
//!
//! Olas service lifecycle on top of the chainpilot execution layer.
//!
//! A service moves through the registry states
//! `NON_EXISTENT → PRE_REGISTRATION → ACTIVE_REGISTRATION → FINISHED_REGISTRATION
//! → DEPLOYED → TERMINATED_BONDED → PRE_REGISTRATION`, and while deployed it can
//! be staked in a staking contract. [`ServiceManager`] performs each transition
//! with pre-flight checks, event verification and a state re-read, and chains
//! them into idempotent spin-up and wind-down workflows.
//! [`StakingStatusReader`] reports liveness and rewards of a staked service.

#![warn(missing_docs)]

pub mod contracts;
mod error;
pub mod events;
pub mod gateway;
pub mod lifecycle;
pub mod service;
pub mod staking;
pub mod store;

pub use error::{LifecycleError, LifecycleResult, Precondition};
pub use gateway::{EvmGateway, LedgerGateway};
pub use lifecycle::{
    CheckpointOutcome, OlasContracts, ServiceManager, ServiceRequest, Step, StepFailure,
    WorkflowReport,
};
pub use service::{service_key, Service, ServiceState, StakingState};
pub use staking::{EpochActivity, StakingStatus, StakingStatusReader};
pub use store::{JsonServiceStore, ServiceStore};
