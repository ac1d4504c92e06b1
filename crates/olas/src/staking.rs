//! Read-only staking status.

use crate::contracts::staking::{
    self as staking_abi, activity_count, decode_service_info, decode_staking_state, getter,
    required_requests,
};
use crate::contracts::{decode_address, decode_uint, decode_uint_array};
use crate::error::{LifecycleError, LifecycleResult};
use crate::gateway::LedgerGateway;
use crate::service::StakingState;
use chainpilot_core::{Address, Wei};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Staking position of a service, recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StakingStatus {
    /// True only in the `STAKED` sub-state
    pub is_staked: bool,
    /// Sub-state reported by the staking contract
    pub staking_state: StakingState,
    /// Contract that was queried
    pub staking_contract: Option<Address>,
    /// Activity checker liveness ratio, scaled by 1e18
    pub liveness_ratio: Option<u128>,
    /// Current epoch details, present while staked
    pub epoch: Option<EpochActivity>,
}

impl StakingStatus {
    fn not_staked(staking_contract: Option<Address>) -> Self {
        Self {
            is_staked: false,
            staking_state: StakingState::NotStaked,
            staking_contract,
            liveness_ratio: None,
            epoch: None,
        }
    }
}

/// Liveness and reward counters of the current epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpochActivity {
    /// Epoch counter
    pub epoch_number: u128,
    /// Next reward checkpoint
    pub epoch_end: Option<DateTime<Utc>>,
    /// Seconds until the checkpoint; negative once it is overdue
    pub remaining_epoch_seconds: i64,
    /// Reward accrued so far
    pub accrued_reward: Wei,
    /// Requests counted since the last checkpoint
    pub requests_this_epoch: u128,
    /// Requests needed to pass the liveness check
    pub required_requests: u128,
    /// `requests_this_epoch >= required_requests`
    pub has_enough_requests: bool,
    /// Stake timestamp
    pub ts_start: u64,
    /// Minimum staking duration in seconds
    pub min_staking_duration: u64,
    /// Earliest unstake time
    pub unstake_available_at: Option<DateTime<Utc>>,
}

fn to_u64(value: u128, what: &str) -> LifecycleResult<u64> {
    u64::try_from(value).map_err(|_| LifecycleError::decode(format!("{what} out of range: {value}")))
}

fn utc(secs: u64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(i64::try_from(secs).ok()?, 0).single()
}

/// Reads staking positions through a [`LedgerGateway`].
pub struct StakingStatusReader {
    gateway: Arc<dyn LedgerGateway>,
}

impl StakingStatusReader {
    /// Creates a reader.
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self { gateway }
    }

    async fn uint(&self, contract: Address, signature: &str) -> LifecycleResult<u128> {
        decode_uint(&self.gateway.call(contract, getter(signature)).await?)
    }

    /// Status of `service_id` in `staking`; a service without a staking
    /// contract is reported as not staked without any call.
    pub async fn status(&self, service_id: u64, staking: Option<Address>) -> LifecycleResult<StakingStatus> {
        let Some(contract) = staking else {
            return Ok(StakingStatus::not_staked(None));
        };

        let state = decode_staking_state(
            &self
                .gateway
                .call(contract, staking_abi::get_staking_state(service_id))
                .await?,
        )?;
        let checker = decode_address(
            &self
                .gateway
                .call(contract, getter(staking_abi::ACTIVITY_CHECKER))
                .await?,
        )?;
        let liveness_ratio = self.uint(checker, staking_abi::LIVENESS_RATIO).await?;

        if state != StakingState::Staked {
            return Ok(StakingStatus {
                is_staked: false,
                staking_state: state,
                staking_contract: Some(contract),
                liveness_ratio: Some(liveness_ratio),
                epoch: None,
            });
        }

        let info = decode_service_info(
            &self
                .gateway
                .call(contract, staking_abi::get_service_info(service_id))
                .await?,
        )?;
        let epoch_number = self.uint(contract, staking_abi::EPOCH_COUNTER).await?;
        let next_checkpoint = to_u64(
            self.uint(contract, staking_abi::NEXT_REWARD_CHECKPOINT).await?,
            "next checkpoint",
        )?;
        let ts_checkpoint = to_u64(self.uint(contract, staking_abi::TS_CHECKPOINT).await?, "tsCheckpoint")?;
        let liveness_period = to_u64(
            self.uint(contract, staking_abi::LIVENESS_PERIOD).await?,
            "liveness period",
        )?;
        let min_staking_duration = to_u64(
            self.uint(contract, staking_abi::MIN_STAKING_DURATION).await?,
            "min staking duration",
        )?;
        let accrued_reward = decode_uint(
            &self
                .gateway
                .call(contract, staking_abi::calculate_staking_reward(service_id))
                .await?,
        )?;
        let nonces = decode_uint_array(
            &self
                .gateway
                .call(checker, staking_abi::get_multisig_nonces(info.multisig))
                .await?,
        )?;
        let now = self.gateway.timestamp().await?;

        let requests_this_epoch = activity_count(&nonces).saturating_sub(activity_count(&info.nonces));
        let required = required_requests(liveness_period, ts_checkpoint, now, liveness_ratio);
        let remaining_epoch_seconds = i64::try_from(next_checkpoint)
            .unwrap_or(i64::MAX)
            .saturating_sub(i64::try_from(now).unwrap_or(i64::MAX));
        let unstake_available_at = (info.ts_start > 0)
            .then(|| utc(info.ts_start.saturating_add(min_staking_duration)))
            .flatten();

        debug!(
            service_id,
            staking = %contract,
            epoch = epoch_number,
            requests = requests_this_epoch,
            required,
            "staking status read"
        );

        Ok(StakingStatus {
            is_staked: true,
            staking_state: state,
            staking_contract: Some(contract),
            liveness_ratio: Some(liveness_ratio),
            epoch: Some(EpochActivity {
                epoch_number,
                epoch_end: utc(next_checkpoint),
                remaining_epoch_seconds,
                accrued_reward,
                requests_this_epoch,
                required_requests: required,
                has_enough_requests: requests_this_epoch >= required,
                ts_start: info.ts_start,
                min_staking_duration,
                unstake_available_at,
            }),
        })
    }
}
