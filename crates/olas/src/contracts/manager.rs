//! ServiceManagerToken, the entry point for every lifecycle write.

use super::uint;
use chainpilot_core::abi::{encode_call, Token};
use chainpilot_core::{Address, Wei, H256};

/// `create(address,address,bytes32,uint32[],(uint32,uint96)[],uint32)`
pub const CREATE: &str = "create(address,address,bytes32,uint32[],(uint32,uint96)[],uint32)";
/// `activateRegistration(uint256)`
pub const ACTIVATE_REGISTRATION: &str = "activateRegistration(uint256)";
/// `registerAgents(uint256,address[],uint32[])`
pub const REGISTER_AGENTS: &str = "registerAgents(uint256,address[],uint32[])";
/// `deploy(uint256,address,bytes)`
pub const DEPLOY: &str = "deploy(uint256,address,bytes)";
/// `terminate(uint256)`
pub const TERMINATE: &str = "terminate(uint256)";
/// `unbond(uint256)`
pub const UNBOND: &str = "unbond(uint256)";

fn uint32_array(values: &[u32]) -> Token {
    Token::Array(values.iter().map(|v| Token::Uint(u128::from(*v))).collect())
}

/// Calldata registering a new service with one instance per agent id.
#[must_use]
pub fn create(
    owner: Address,
    token: Address,
    config_hash: H256,
    agent_ids: &[u32],
    bond: Wei,
    threshold: u32,
) -> Vec<u8> {
    let params = agent_ids
        .iter()
        .map(|_| Token::Tuple(vec![Token::Uint(1), Token::Uint(bond)]))
        .collect();
    encode_call(
        CREATE,
        &[
            Token::Address(owner),
            Token::Address(token),
            Token::FixedBytes(config_hash),
            uint32_array(agent_ids),
            Token::Array(params),
            Token::Uint(u128::from(threshold)),
        ],
    )
}

/// Calldata opening agent registration.
#[must_use]
pub fn activate_registration(service_id: u64) -> Vec<u8> {
    encode_call(ACTIVATE_REGISTRATION, &[uint(service_id)])
}

/// Calldata registering agent instances.
#[must_use]
pub fn register_agents(service_id: u64, instances: &[Address], agent_ids: &[u32]) -> Vec<u8> {
    encode_call(
        REGISTER_AGENTS,
        &[
            uint(service_id),
            Token::Array(instances.iter().copied().map(Token::Address).collect()),
            uint32_array(agent_ids),
        ],
    )
}

/// Calldata deploying the service multisig.
#[must_use]
pub fn deploy(service_id: u64, multisig_implementation: Address, payload: Vec<u8>) -> Vec<u8> {
    encode_call(
        DEPLOY,
        &[
            uint(service_id),
            Token::Address(multisig_implementation),
            Token::Bytes(payload),
        ],
    )
}

/// Safe creation payload: no module target, the fallback handler, zeroed
/// payment fields and a timestamp nonce.
#[must_use]
pub fn deploy_payload(fallback_handler: Address, timestamp: u64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(20 + 20 + 128 + 32);
    payload.extend_from_slice(Address::ZERO.as_bytes());
    payload.extend_from_slice(fallback_handler.as_bytes());
    payload.extend_from_slice(&[0u8; 128]);
    let mut nonce = [0u8; 32];
    nonce[24..].copy_from_slice(&timestamp.to_be_bytes());
    payload.extend_from_slice(&nonce);
    payload
}

/// Calldata terminating a deployed service.
#[must_use]
pub fn terminate(service_id: u64) -> Vec<u8> {
    encode_call(TERMINATE, &[uint(service_id)])
}

/// Calldata releasing operator bonds.
#[must_use]
pub fn unbond(service_id: u64) -> Vec<u8> {
    encode_call(UNBOND, &[uint(service_id)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpilot_core::abi::{decode, ParamType};

    #[test]
    fn deploy_payload_layout() {
        let handler = Address::new([0xf4; 20]);
        let payload = deploy_payload(handler, 0x6553_f100);
        assert_eq!(payload.len(), 200);
        assert!(payload[..20].iter().all(|b| *b == 0));
        assert_eq!(&payload[20..40], handler.as_bytes());
        assert!(payload[40..192].iter().all(|b| *b == 0));
        assert_eq!(&payload[192..], &0x6553_f100u64.to_be_bytes());
    }

    #[test]
    fn create_encodes_agent_params_as_static_tuples() {
        let data = create(
            Address::new([1; 20]),
            Address::new([2; 20]),
            H256::new([3; 32]),
            &[25],
            50,
            1,
        );
        let tokens = decode(
            &[
                ParamType::Address,
                ParamType::Address,
                ParamType::FixedBytes,
                ParamType::uint_array(),
                ParamType::Array(Box::new(ParamType::Tuple(vec![ParamType::Uint, ParamType::Uint]))),
                ParamType::Uint,
            ],
            &data[4..],
        )
        .unwrap();
        assert_eq!(tokens[3].as_uint_array(), Some(vec![25]));
        assert_eq!(
            tokens[4],
            Token::Array(vec![Token::Tuple(vec![Token::Uint(1), Token::Uint(50)])])
        );
        assert_eq!(tokens[5].as_uint(), Some(1));
    }
}
