//! Staking contracts and their activity checkers.

use super::{field, uint};
use crate::error::{LifecycleError, LifecycleResult};
use crate::service::StakingState;
use chainpilot_core::abi::{self, encode_call, ParamType, Token};
use chainpilot_core::{Address, Wei};

/// `activityChecker()`
pub const ACTIVITY_CHECKER: &str = "activityChecker()";
/// `availableRewards()`
pub const AVAILABLE_REWARDS: &str = "availableRewards()";
/// `livenessPeriod()`
pub const LIVENESS_PERIOD: &str = "livenessPeriod()";
/// `maxNumServices()`
pub const MAX_NUM_SERVICES: &str = "maxNumServices()";
/// `minStakingDeposit()`
pub const MIN_STAKING_DEPOSIT: &str = "minStakingDeposit()";
/// `minStakingDuration()`
pub const MIN_STAKING_DURATION: &str = "minStakingDuration()";
/// `stakingToken()`
pub const STAKING_TOKEN: &str = "stakingToken()";
/// `epochCounter()`
pub const EPOCH_COUNTER: &str = "epochCounter()";
/// `getNextRewardCheckpointTimestamp()`
pub const NEXT_REWARD_CHECKPOINT: &str = "getNextRewardCheckpointTimestamp()";
/// `getServiceIds()`
pub const GET_SERVICE_IDS: &str = "getServiceIds()";
/// `tsCheckpoint()`
pub const TS_CHECKPOINT: &str = "tsCheckpoint()";
/// `calculateStakingReward(uint256)`
pub const CALCULATE_STAKING_REWARD: &str = "calculateStakingReward(uint256)";
/// `getStakingState(uint256)`
pub const GET_STAKING_STATE: &str = "getStakingState(uint256)";
/// `getServiceInfo(uint256)`
pub const GET_SERVICE_INFO: &str = "getServiceInfo(uint256)";
/// `stake(uint256)`
pub const STAKE: &str = "stake(uint256)";
/// `unstake(uint256)`
pub const UNSTAKE: &str = "unstake(uint256)";
/// `checkpoint()`
pub const CHECKPOINT: &str = "checkpoint()";
/// Activity checker `getMultisigNonces(address)`
pub const GET_MULTISIG_NONCES: &str = "getMultisigNonces(address)";
/// Activity checker `livenessRatio()`
pub const LIVENESS_RATIO: &str = "livenessRatio()";

/// Calldata for an argument-less getter such as [`MAX_NUM_SERVICES`].
#[must_use]
pub fn getter(signature: &str) -> Vec<u8> {
    encode_call(signature, &[])
}

/// Staking record of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakedServiceInfo {
    /// Service Safe
    pub multisig: Address,
    /// Service owner at stake time
    pub owner: Address,
    /// Activity nonces at the last checkpoint
    pub nonces: Vec<u128>,
    /// Stake timestamp
    pub ts_start: u64,
    /// Reward accrued so far
    pub reward: Wei,
    /// Accumulated inactivity
    pub inactivity: u128,
}

/// Calldata for `calculateStakingReward`.
#[must_use]
pub fn calculate_staking_reward(service_id: u64) -> Vec<u8> {
    encode_call(CALCULATE_STAKING_REWARD, &[uint(service_id)])
}

/// Calldata for `getStakingState`.
#[must_use]
pub fn get_staking_state(service_id: u64) -> Vec<u8> {
    encode_call(GET_STAKING_STATE, &[uint(service_id)])
}

/// Decodes the `uint8` staking state.
pub fn decode_staking_state(data: &[u8]) -> LifecycleResult<StakingState> {
    let raw = super::decode_uint(data)?;
    u8::try_from(raw)
        .ok()
        .and_then(StakingState::from_u8)
        .ok_or_else(|| LifecycleError::decode(format!("unknown staking state {raw}")))
}

/// Calldata for `getServiceInfo`.
#[must_use]
pub fn get_service_info(service_id: u64) -> Vec<u8> {
    encode_call(GET_SERVICE_INFO, &[uint(service_id)])
}

fn service_info_tuple() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Address,
        ParamType::Address,
        ParamType::uint_array(),
        ParamType::Uint,
        ParamType::Uint,
        ParamType::Uint,
    ])
}

/// Decodes the `getServiceInfo` struct.
pub fn decode_service_info(data: &[u8]) -> LifecycleResult<StakedServiceInfo> {
    let decoded = abi::decode(&[service_info_tuple()], data)?;
    let tokens = field(&decoded, 0, "service info", |t| t.as_slice().map(<[Token]>::to_vec))?;
    let ts_start = field(&tokens, 3, "tsStart", Token::as_uint)?;
    Ok(StakedServiceInfo {
        multisig: field(&tokens, 0, "multisig", Token::as_address)?,
        owner: field(&tokens, 1, "owner", Token::as_address)?,
        nonces: field(&tokens, 2, "nonces", Token::as_uint_array)?,
        ts_start: u64::try_from(ts_start)
            .map_err(|_| LifecycleError::decode(format!("tsStart out of range: {ts_start}")))?,
        reward: field(&tokens, 4, "reward", Token::as_uint)?,
        inactivity: field(&tokens, 5, "inactivity", Token::as_uint)?,
    })
}

/// Encodes a `getServiceInfo` result; the inverse of [`decode_service_info`].
#[must_use]
pub fn encode_service_info(info: &StakedServiceInfo) -> Vec<u8> {
    abi::encode(&[Token::Tuple(vec![
        Token::Address(info.multisig),
        Token::Address(info.owner),
        Token::Array(info.nonces.iter().copied().map(Token::Uint).collect()),
        Token::Uint(u128::from(info.ts_start)),
        Token::Uint(info.reward),
        Token::Uint(info.inactivity),
    ])])
}

/// Calldata for `stake`.
#[must_use]
pub fn stake(service_id: u64) -> Vec<u8> {
    encode_call(STAKE, &[uint(service_id)])
}

/// Calldata for `unstake`.
#[must_use]
pub fn unstake(service_id: u64) -> Vec<u8> {
    encode_call(UNSTAKE, &[uint(service_id)])
}

/// Calldata for `checkpoint`.
#[must_use]
pub fn checkpoint() -> Vec<u8> {
    getter(CHECKPOINT)
}

/// Calldata for the activity checker's `getMultisigNonces`.
#[must_use]
pub fn get_multisig_nonces(multisig: Address) -> Vec<u8> {
    encode_call(GET_MULTISIG_NONCES, &[Token::Address(multisig)])
}

/// Requests needed in the current epoch to pass the liveness check.
///
/// `ceil(max(liveness_period, now - ts_checkpoint) * liveness_ratio / 1e18) + 1`,
/// where the ratio is scaled by 1e18.
#[must_use]
pub fn required_requests(liveness_period: u64, ts_checkpoint: u64, now: u64, liveness_ratio: u128) -> u128 {
    const SCALE: u128 = 1_000_000_000_000_000_000;
    let window = u128::from(liveness_period.max(now.saturating_sub(ts_checkpoint)));
    window.saturating_mul(liveness_ratio).div_ceil(SCALE) + 1
}

/// Activity counter used for liveness; checkers report `(safe nonce, requests)`
/// and older ones only the Safe nonce.
#[must_use]
pub fn activity_count(nonces: &[u128]) -> u128 {
    nonces.get(1).or_else(|| nonces.first()).copied().unwrap_or(0)
}
