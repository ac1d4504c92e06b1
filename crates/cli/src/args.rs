use chainpilot_core::{Address, Wei};
use chainpilot_olas::ServiceState;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for chainpilot
#[derive(Parser, Debug, Clone)]
#[command(
    name = "chainpilot",
    version = env!("CARGO_PKG_VERSION"),
    about = "Resilient EVM ledger agent and Olas service operator",
    long_about = "chainpilot executes ledger operations through rate-limited, rotating RPC endpoints and drives Olas services through registration, deployment and staking."
)]
pub struct CliArgs {
    /// Specifies the config file
    #[arg(short = 'c', long = "config", value_name = "FILE", default_value = "chainpilot.toml")]
    pub config: PathBuf,

    /// Network to operate on; defaults to the configured default network
    #[arg(short = 'n', long = "network", value_name = "NAME")]
    pub network: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long = "log-json")]
    pub log_json: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Checks that the active RPC endpoint serves blocks
    Health,

    /// Prints the current fee estimate
    Fees,

    /// Shows a service, importing it from the registry if needed
    Status {
        /// Service id; defaults to the last created service
        #[arg(long = "service", value_name = "ID")]
        service: Option<u64>,
    },

    /// Shows liveness and rewards of a staked service
    StakingStatus {
        /// Service id
        #[arg(long = "service", value_name = "ID")]
        service: u64,
        /// Staking contract
        #[arg(long = "staking", value_name = "ADDRESS")]
        staking: Address,
    },

    /// Registers a new service
    Create {
        /// Local name
        #[arg(long = "name")]
        name: Option<String>,
        /// Agent ids (repeatable); defaults to the configured agent
        #[arg(long = "agent-id", value_name = "ID")]
        agent_ids: Vec<u32>,
        /// Bond token symbol or address; native currency when omitted
        #[arg(long = "token", value_name = "TOKEN")]
        token: Option<String>,
        /// Bond per agent instance in wei
        #[arg(long = "bond", value_name = "WEI")]
        bond: Wei,
    },

    /// Moves a service forward to the target state, optionally staking it
    SpinUp {
        /// Service id
        #[arg(long = "service", value_name = "ID")]
        service: u64,
        /// Target state
        #[arg(long = "target", value_enum, default_value = "deployed")]
        target: Target,
        /// Staking contract to stake in once deployed
        #[arg(long = "staking", value_name = "ADDRESS")]
        staking: Option<Address>,
    },

    /// Unstakes, terminates and unbonds a service
    WindDown {
        /// Service id
        #[arg(long = "service", value_name = "ID")]
        service: u64,
        /// Staking contract holding the service
        #[arg(long = "staking", value_name = "ADDRESS")]
        staking: Option<Address>,
    },

    /// Closes the current staking epoch when it is due
    Checkpoint {
        /// Staking contract
        #[arg(long = "staking", value_name = "ADDRESS")]
        staking: Address,
    },
}

/// Spin-up targets
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Registration open
    ActiveRegistration,
    /// Agents registered
    FinishedRegistration,
    /// Multisig deployed
    Deployed,
}

impl From<Target> for ServiceState {
    fn from(target: Target) -> Self {
        match target {
            Target::ActiveRegistration => ServiceState::ActiveRegistration,
            Target::FinishedRegistration => ServiceState::FinishedRegistration,
            Target::Deployed => ServiceState::Deployed,
        }
    }
}
