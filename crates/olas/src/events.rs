//! Event extraction from transaction receipts.
//!
//! Logs are matched on `topic0 = keccak(signature)` against a fixed table of
//! registry, manager and staking events. Indexed arguments are read from the
//! remaining topics and the rest are ABI-decoded from the log data.

use chainpilot_core::abi::{self, ParamType, Token};
use chainpilot_core::{event_topic, Address, Bytes, H256};
use chainpilot_rpc_client::{Log, Receipt};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// `CreateService`
pub const CREATE_SERVICE: &str = "CreateService";
/// `ActivateRegistration`
pub const ACTIVATE_REGISTRATION: &str = "ActivateRegistration";
/// `RegisterInstance`
pub const REGISTER_INSTANCE: &str = "RegisterInstance";
/// `DeployService`
pub const DEPLOY_SERVICE: &str = "DeployService";
/// `CreateMultisigWithAgents`
pub const CREATE_MULTISIG: &str = "CreateMultisigWithAgents";
/// `TerminateService`
pub const TERMINATE_SERVICE: &str = "TerminateService";
/// `OperatorUnbond`
pub const OPERATOR_UNBOND: &str = "OperatorUnbond";
/// `ServiceStaked`
pub const SERVICE_STAKED: &str = "ServiceStaked";
/// `ServiceUnstaked`
pub const SERVICE_UNSTAKED: &str = "ServiceUnstaked";
/// `Checkpoint`
pub const CHECKPOINT: &str = "Checkpoint";
/// `ServiceInactivityWarning`
pub const INACTIVITY_WARNING: &str = "ServiceInactivityWarning";

struct EventParam {
    name: &'static str,
    kind: ParamType,
    indexed: bool,
}

struct EventDef {
    name: &'static str,
    topic: H256,
    params: Vec<EventParam>,
}

fn param(name: &'static str, kind: ParamType, indexed: bool) -> EventParam {
    EventParam { name, kind, indexed }
}

fn def(name: &'static str, signature: &str, params: Vec<EventParam>) -> EventDef {
    EventDef {
        name,
        topic: event_topic(signature),
        params,
    }
}

static EVENTS: Lazy<HashMap<H256, EventDef>> = Lazy::new(|| {
    use ParamType::{Address as Addr, FixedBytes, Uint};
    let uints = ParamType::uint_array;
    [
        def(
            CREATE_SERVICE,
            "CreateService(uint256,bytes32)",
            vec![param("serviceId", Uint, true), param("configHash", FixedBytes, false)],
        ),
        def(
            ACTIVATE_REGISTRATION,
            "ActivateRegistration(uint256)",
            vec![param("serviceId", Uint, true)],
        ),
        def(
            REGISTER_INSTANCE,
            "RegisterInstance(address,uint256,address,uint256)",
            vec![
                param("operator", Addr, true),
                param("serviceId", Uint, true),
                param("agentInstance", Addr, true),
                param("agentId", Uint, false),
            ],
        ),
        def(
            DEPLOY_SERVICE,
            "DeployService(uint256)",
            vec![param("serviceId", Uint, true)],
        ),
        def(
            CREATE_MULTISIG,
            "CreateMultisigWithAgents(uint256,address)",
            vec![param("serviceId", Uint, true), param("multisig", Addr, true)],
        ),
        def(
            TERMINATE_SERVICE,
            "TerminateService(uint256)",
            vec![param("serviceId", Uint, true)],
        ),
        def(
            OPERATOR_UNBOND,
            "OperatorUnbond(address,uint256)",
            vec![param("operator", Addr, true), param("serviceId", Uint, true)],
        ),
        def(
            SERVICE_STAKED,
            "ServiceStaked(uint256,uint256,address,address,uint256[])",
            vec![
                param("epoch", Uint, false),
                param("serviceId", Uint, true),
                param("owner", Addr, true),
                param("multisig", Addr, true),
                param("nonces", uints(), false),
            ],
        ),
        def(
            SERVICE_UNSTAKED,
            "ServiceUnstaked(uint256,uint256,address,address,uint256[],uint256)",
            vec![
                param("epoch", Uint, false),
                param("serviceId", Uint, true),
                param("owner", Addr, true),
                param("multisig", Addr, true),
                param("nonces", uints(), false),
                param("reward", Uint, false),
            ],
        ),
        def(
            CHECKPOINT,
            "Checkpoint(uint256,uint256,uint256[],uint256[],uint256)",
            vec![
                param("epoch", Uint, true),
                param("availableRewards", Uint, false),
                param("serviceIds", uints(), false),
                param("rewards", uints(), false),
                param("epochLength", Uint, false),
            ],
        ),
        def(
            INACTIVITY_WARNING,
            "ServiceInactivityWarning(uint256,uint256,uint256)",
            vec![
                param("epoch", Uint, false),
                param("serviceId", Uint, true),
                param("serviceInactivity", Uint, false),
            ],
        ),
    ]
    .into_iter()
    .map(|event| (event.topic, event))
    .collect()
});

/// A decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event name
    pub name: &'static str,
    /// Emitting contract
    pub address: Address,
    /// Arguments by name
    pub args: BTreeMap<&'static str, Token>,
}

impl Event {
    /// Unsigned integer argument.
    #[must_use]
    pub fn uint(&self, arg: &str) -> Option<u128> {
        self.args.get(arg).and_then(Token::as_uint)
    }

    /// Address argument.
    #[must_use]
    pub fn address(&self, arg: &str) -> Option<Address> {
        self.args.get(arg).and_then(Token::as_address)
    }

    /// `uint256[]` argument.
    #[must_use]
    pub fn uint_array(&self, arg: &str) -> Option<Vec<u128>> {
        self.args.get(arg).and_then(Token::as_uint_array)
    }
}

fn decode_topic(kind: &ParamType, topic: &H256) -> Option<Token> {
    abi::decode(std::slice::from_ref(kind), topic.as_bytes())
        .ok()?
        .into_iter()
        .next()
}

fn decode_log(log: &Log) -> Option<Event> {
    let definition = EVENTS.get(log.topics.first()?)?;

    let mut topics = log.topics.iter().skip(1);
    let mut args = BTreeMap::new();
    for p in definition.params.iter().filter(|p| p.indexed) {
        args.insert(p.name, decode_topic(&p.kind, topics.next()?)?);
    }

    let (names, kinds): (Vec<_>, Vec<_>) = definition
        .params
        .iter()
        .filter(|p| !p.indexed)
        .map(|p| (p.name, p.kind.clone()))
        .unzip();
    let values = abi::decode(&kinds, &log.data).ok()?;
    args.extend(names.into_iter().zip(values));

    Some(Event {
        name: definition.name,
        address: log.address,
        args,
    })
}

/// Decodes every known event in `receipt`, in log order.
///
/// Logs with unknown signatures or malformed payloads are skipped.
#[must_use]
pub fn extract_events(receipt: &Receipt) -> Vec<Event> {
    receipt
        .logs
        .iter()
        .filter_map(|log| {
            let event = decode_log(log);
            if event.is_none() {
                debug!(tx_hash = %receipt.transaction_hash, address = %log.address, "skipping unknown log");
            }
            event
        })
        .collect()
}

/// First event named `name`.
#[must_use]
pub fn find<'a>(events: &'a [Event], name: &str) -> Option<&'a Event> {
    events.iter().find(|event| event.name == name)
}

/// Builds the log `contract` would emit for event `name` with `args` in
/// declaration order. Returns `None` for unknown events or an argument count
/// mismatch.
#[must_use]
pub fn encode_log(name: &str, contract: Address, args: &[Token]) -> Option<Log> {
    let definition = EVENTS.values().find(|event| event.name == name)?;
    if definition.params.len() != args.len() {
        return None;
    }

    let mut topics = vec![definition.topic];
    let mut data = Vec::new();
    for (p, value) in definition.params.iter().zip(args) {
        if p.indexed {
            topics.push(H256::from_slice(&abi::encode(std::slice::from_ref(value))).ok()?);
        } else {
            data.push(value.clone());
        }
    }

    Some(Log {
        address: contract,
        topics,
        data: Bytes(abi::encode(&data)),
    })
}
