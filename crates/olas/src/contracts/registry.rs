//! ServiceRegistry and ServiceRegistryTokenUtility.

use super::{field, uint};
use crate::error::{LifecycleError, LifecycleResult};
use crate::service::ServiceState;
use chainpilot_core::abi::{self, encode_call, ParamType, Token};
use chainpilot_core::{Address, Wei, H256};

/// `getService(uint256)`
pub const GET_SERVICE: &str = "getService(uint256)";
/// `getAgentInstances(uint256)`
pub const GET_AGENT_INSTANCES: &str = "getAgentInstances(uint256)";
/// `getAgentParams(uint256)`
pub const GET_AGENT_PARAMS: &str = "getAgentParams(uint256)";
/// ERC-721 `ownerOf(uint256)`
pub const OWNER_OF: &str = "ownerOf(uint256)";
/// ERC-721 `approve(address,uint256)`
pub const APPROVE: &str = "approve(address,uint256)";
/// `mapServiceIdTokenDeposit(uint256)`
pub const MAP_SERVICE_ID_TOKEN_DEPOSIT: &str = "mapServiceIdTokenDeposit(uint256)";
/// `getAgentBond(uint256,uint256)`
pub const GET_AGENT_BOND: &str = "getAgentBond(uint256,uint256)";

/// Registry view of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryService {
    /// Security deposit (native value for registration calls)
    pub security_deposit: Wei,
    /// Deployed Safe, zero before deployment
    pub multisig: Address,
    /// Configuration hash
    pub config_hash: H256,
    /// Multisig threshold
    pub threshold: u32,
    /// Total agent slots
    pub max_num_agent_instances: u32,
    /// Filled agent slots
    pub num_agent_instances: u32,
    /// Lifecycle state
    pub state: ServiceState,
    /// Agent ids
    pub agent_ids: Vec<u32>,
}

/// Slots and bond of one agent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentParams {
    /// Instances of this agent
    pub slots: u32,
    /// Bond per instance
    pub bond: Wei,
}

fn service_tuple() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint,
        ParamType::Address,
        ParamType::FixedBytes,
        ParamType::Uint,
        ParamType::Uint,
        ParamType::Uint,
        ParamType::Uint,
        ParamType::Array(Box::new(ParamType::Uint)),
    ])
}

fn narrow(value: u128, what: &str) -> LifecycleResult<u32> {
    u32::try_from(value).map_err(|_| LifecycleError::decode(format!("{what} out of range: {value}")))
}

/// Calldata for `getService`.
#[must_use]
pub fn get_service(service_id: u64) -> Vec<u8> {
    encode_call(GET_SERVICE, &[uint(service_id)])
}

/// Decodes the `getService` struct.
pub fn decode_service(data: &[u8]) -> LifecycleResult<RegistryService> {
    let decoded = abi::decode(&[service_tuple()], data)?;
    let tokens = field(&decoded, 0, "service struct", |t| t.as_slice().map(<[Token]>::to_vec))?;

    let raw_state = field(&tokens, 6, "state", Token::as_uint)?;
    let state = u8::try_from(raw_state)
        .ok()
        .and_then(ServiceState::from_u8)
        .ok_or_else(|| LifecycleError::decode(format!("unknown service state {raw_state}")))?;
    let agent_ids = field(&tokens, 7, "agent ids", Token::as_uint_array)?
        .into_iter()
        .map(|id| narrow(id, "agent id"))
        .collect::<LifecycleResult<Vec<_>>>()?;

    Ok(RegistryService {
        security_deposit: field(&tokens, 0, "security deposit", Token::as_uint)?,
        multisig: field(&tokens, 1, "multisig", Token::as_address)?,
        config_hash: field(&tokens, 2, "config hash", Token::as_fixed_bytes)?,
        threshold: narrow(field(&tokens, 3, "threshold", Token::as_uint)?, "threshold")?,
        max_num_agent_instances: narrow(field(&tokens, 4, "max instances", Token::as_uint)?, "max instances")?,
        num_agent_instances: narrow(field(&tokens, 5, "instances", Token::as_uint)?, "instances")?,
        state,
        agent_ids,
    })
}

/// Encodes a `getService` result; the inverse of [`decode_service`].
#[must_use]
pub fn encode_service(service: &RegistryService) -> Vec<u8> {
    abi::encode(&[Token::Tuple(vec![
        Token::Uint(service.security_deposit),
        Token::Address(service.multisig),
        Token::FixedBytes(service.config_hash),
        Token::Uint(u128::from(service.threshold)),
        Token::Uint(u128::from(service.max_num_agent_instances)),
        Token::Uint(u128::from(service.num_agent_instances)),
        Token::Uint(service.state as u128),
        Token::Array(
            service
                .agent_ids
                .iter()
                .map(|id| Token::Uint(u128::from(*id)))
                .collect(),
        ),
    ])])
}

/// Calldata for `getAgentInstances`.
#[must_use]
pub fn get_agent_instances(service_id: u64) -> Vec<u8> {
    encode_call(GET_AGENT_INSTANCES, &[uint(service_id)])
}

/// Decodes `(uint256 numAgentInstances, address[] agentInstances)`.
pub fn decode_agent_instances(data: &[u8]) -> LifecycleResult<Vec<Address>> {
    let tokens = abi::decode(&[ParamType::Uint, ParamType::address_array()], data)?;
    field(&tokens, 1, "agent instances", Token::as_address_array)
}

/// Calldata for `getAgentParams`.
#[must_use]
pub fn get_agent_params(service_id: u64) -> Vec<u8> {
    encode_call(GET_AGENT_PARAMS, &[uint(service_id)])
}

/// Decodes `(uint256 numAgentIds, (uint32 slots, uint96 bond)[] agentParams)`.
pub fn decode_agent_params(data: &[u8]) -> LifecycleResult<Vec<AgentParams>> {
    let params = ParamType::Array(Box::new(ParamType::Tuple(vec![ParamType::Uint, ParamType::Uint])));
    let tokens = abi::decode(&[ParamType::Uint, params], data)?;
    field(&tokens, 1, "agent params", |t| t.as_slice().map(<[Token]>::to_vec))?
        .iter()
        .map(|entry| {
            let pair = entry
                .as_slice()
                .ok_or_else(|| LifecycleError::decode("agent params entry is not a tuple"))?;
            Ok(AgentParams {
                slots: narrow(field(pair, 0, "slots", Token::as_uint)?, "slots")?,
                bond: field(pair, 1, "bond", Token::as_uint)?,
            })
        })
        .collect()
}

/// Calldata for the service NFT's `ownerOf`.
#[must_use]
pub fn owner_of(service_id: u64) -> Vec<u8> {
    encode_call(OWNER_OF, &[uint(service_id)])
}

/// Calldata approving `spender` to transfer the service NFT.
#[must_use]
pub fn approve(spender: Address, service_id: u64) -> Vec<u8> {
    encode_call(APPROVE, &[Token::Address(spender), uint(service_id)])
}

/// Calldata for the token utility's `mapServiceIdTokenDeposit`.
#[must_use]
pub fn map_service_id_token_deposit(service_id: u64) -> Vec<u8> {
    encode_call(MAP_SERVICE_ID_TOKEN_DEPOSIT, &[uint(service_id)])
}

/// Decodes `(address token, uint96 securityDeposit)`.
pub fn decode_token_deposit(data: &[u8]) -> LifecycleResult<(Address, Wei)> {
    let tokens = abi::decode(&[ParamType::Address, ParamType::Uint], data)?;
    Ok((
        field(&tokens, 0, "token", Token::as_address)?,
        field(&tokens, 1, "deposit", Token::as_uint)?,
    ))
}

/// Calldata for the token utility's `getAgentBond`.
#[must_use]
pub fn get_agent_bond(service_id: u64, agent_id: u32) -> Vec<u8> {
    encode_call(
        GET_AGENT_BOND,
        &[uint(service_id), Token::Uint(u128::from(agent_id))],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegistryService {
        RegistryService {
            security_deposit: 1,
            multisig: Address::ZERO,
            config_hash: H256::new([3; 32]),
            threshold: 1,
            max_num_agent_instances: 1,
            num_agent_instances: 0,
            state: ServiceState::ActiveRegistration,
            agent_ids: vec![25],
        }
    }

    #[test]
    fn service_struct_is_a_dynamic_tuple() {
        let data = encode_service(&sample());
        // Offset word pointing at the struct body.
        assert_eq!(data[31], 0x20);
        assert_eq!(decode_service(&data).unwrap(), sample());
    }

    #[test]
    fn unknown_state_is_rejected() {
        let mut data = encode_service(&sample());
        // state is the seventh head word of the struct body
        data[32 + 6 * 32 + 31] = 9;
        assert!(decode_service(&data).is_err());
    }

    #[test]
    fn agent_params_decode() {
        let data = abi::encode(&[
            Token::Uint(1),
            Token::Array(vec![Token::Tuple(vec![Token::Uint(1), Token::Uint(50)])]),
        ]);
        assert_eq!(
            decode_agent_params(&data).unwrap(),
            vec![AgentParams { slots: 1, bond: 50 }]
        );
    }

    #[test]
    fn calldata_starts_with_selector() {
        let data = get_agent_bond(7, 25);
        assert_eq!(&data[..4], &chainpilot_core::selector(GET_AGENT_BOND));
        assert_eq!(data.len(), 4 + 64);
    }
}
