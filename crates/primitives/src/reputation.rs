//! Reputation-related types

use crate::utils::as_checksum_addr;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// All possible reputation statuses
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReputationStatus {
    #[default]
    OK,
    THROTTLED,
    BANNED,
}

/// Reputation entry for entities
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationEntry {
    #[serde(serialize_with = "as_checksum_addr")]
    pub address: Address,
    #[serde(rename = "opsSeen")]
    pub uo_seen: u64,
    #[serde(rename = "opsIncluded")]
    pub uo_included: u64,
    #[serde(default)]
    pub status: ReputationStatus,
}

impl ReputationEntry {
    pub fn default_with_addr(address: Address) -> Self {
        Self { address, uo_seen: 0, uo_included: 0, status: ReputationStatus::default() }
    }
}

/// Stake info, as reported by the entry point's `getDepositInfo`
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInfo {
    #[serde(serialize_with = "as_checksum_addr")]
    pub address: Address,
    pub stake: U256,
    #[serde(rename = "unstakeDelaySec")]
    pub unstake_delay: U256,
}

impl StakeInfo {
    pub fn is_staked(&self) -> bool {
        self.stake > U256::zero() && self.unstake_delay > U256::zero()
    }
}

/// Response of the debug_bundler_getStakeStatus RPC endpoint
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInfoResponse {
    pub stake_info: StakeInfo,
    pub is_staked: bool,
}
