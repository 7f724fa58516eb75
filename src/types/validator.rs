use std::fmt;

use serde::{Deserialize, Serialize};

use super::ledger::{Address, AppId, Asset, AssetId, MicroAlgos, Round};
use crate::name_service::NameRecord;

pub type ValidatorId = u64;

/// Number of gating asset slots carried by a validator config.
pub const GATING_ASSET_SLOTS: usize = 4;

/// Commission and moving averages are exposed scaled by this denominator.
pub const BASIS_POINTS: u64 = 10_000;

/// Commission is stored on-ledger in parts per million.
pub const PARTS_PER_MILLION: u64 = 1_000_000;

/// Rule restricting who may stake with a validator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatingType {
    #[default]
    None,
    AssetCreatedBy,
    AssetHeld,
    NamedAccountList,
    NameSegment,
}

impl GatingType {
    pub fn as_u8(&self) -> u8 {
        match self {
            GatingType::None => 0,
            GatingType::AssetCreatedBy => 1,
            GatingType::AssetHeld => 2,
            GatingType::NamedAccountList => 3,
            GatingType::NameSegment => 4,
        }
    }
}

impl TryFrom<u8> for GatingType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GatingType::None),
            1 => Ok(GatingType::AssetCreatedBy),
            2 => Ok(GatingType::AssetHeld),
            3 => Ok(GatingType::NamedAccountList),
            4 => Ok(GatingType::NameSegment),
            other => Err(other),
        }
    }
}

/// Parameters of a validator, changed only through explicit admin calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub id: ValidatorId,
    pub owner: Address,
    pub manager: Address,
    /// Name-service application linked for display, zero when unset.
    pub nfd_for_info: AppId,
    pub entry_gating_type: GatingType,
    pub entry_gating_address: Address,
    pub entry_gating_assets: [AssetId; GATING_ASSET_SLOTS],
    pub gating_asset_min_balance: u64,
    pub reward_token_id: AssetId,
    pub reward_per_payout: u64,
    pub epoch_round_length: u32,
    /// Commission in parts per million.
    pub percent_to_validator: u32,
    pub validator_commission_address: Address,
    pub min_entry_stake: MicroAlgos,
    pub max_algo_per_pool: MicroAlgos,
    pub pools_per_node: u8,
    /// Unix timestamp after which new stake is refused, zero when unset.
    pub sunsetting_on: u64,
    /// Validator stakers are asked to migrate to, zero when unset.
    pub sunsetting_to: ValidatorId,
}

impl ValidatorConfig {
    /// Non-zero gating asset ids, in slot order.
    pub fn gating_asset_ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.entry_gating_assets.iter().copied().filter(|id| *id > 0)
    }

    pub fn commission_bps(&self) -> u64 {
        u64::from(self.percent_to_validator) * BASIS_POINTS / PARTS_PER_MILLION
    }
}

/// Mutable counters, only ever replaced wholesale from the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorState {
    pub num_pools: u16,
    pub total_stakers: u64,
    pub total_algo_staked: MicroAlgos,
    pub reward_token_held_back: u64,
}

/// Raw pool record as returned by the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub pool_app_id: AppId,
    pub total_stakers: u16,
    pub total_algo_staked: MicroAlgos,
}

/// Pool record enriched with its ledger address and reported node version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPoolInfo {
    /// One-based pool sequence id within the validator.
    pub pool_id: u64,
    pub pool_app_id: AppId,
    pub total_stakers: u64,
    pub total_algo_staked: MicroAlgos,
    pub pool_address: Address,
    pub algod_version: Option<String>,
}

/// Node slot to pool application mapping. Zero entries are free slots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolAssignment {
    pub nodes: Vec<Vec<AppId>>,
}

impl NodePoolAssignment {
    /// One-based node number hosting `pool_app_id`.
    pub fn node_for_pool(&self, pool_app_id: AppId) -> Option<usize> {
        self.nodes
            .iter()
            .position(|slots| slots.contains(&pool_app_id))
            .map(|index| index + 1)
    }

    /// A node has room when its first free slot sits below `pools_per_node`.
    pub fn has_available_slots(&self, pools_per_node: u8) -> bool {
        self.nodes.iter().any(|slots| {
            slots
                .iter()
                .position(|app_id| *app_id == 0)
                .is_some_and(|slot| slot < usize::from(pools_per_node))
        })
    }

    pub fn occupied_slots(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|slots| slots.iter())
            .filter(|app_id| **app_id != 0)
            .count()
    }
}

/// Composite key locating one pool of one validator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatorPoolKey {
    pub id: ValidatorId,
    pub pool_id: u64,
    pub pool_app_id: AppId,
}

impl ValidatorPoolKey {
    pub fn new(id: ValidatorId, pool_id: u64, pool_app_id: AppId) -> Self {
        Self {
            id,
            pool_id,
            pool_app_id,
        }
    }
}

impl fmt::Display for ValidatorPoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validator={} pool={} app={}",
            self.id, self.pool_id, self.pool_app_id
        )
    }
}

/// Protocol-wide limits, immutable for the lifetime of a registry version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub epoch_payout_rounds_min: u64,
    pub epoch_payout_rounds_max: u64,
    pub min_pct_to_validator: u64,
    pub max_pct_to_validator: u64,
    pub min_entry_stake: MicroAlgos,
    pub max_algo_per_pool: MicroAlgos,
    pub max_algo_per_validator: MicroAlgos,
    pub amt_considered_saturated: MicroAlgos,
    pub max_nodes: u64,
    pub max_pools_per_node: u64,
    pub max_stakers_per_pool: u64,
}

/// Minimum balance requirements charged by the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbrAmounts {
    pub add_validator_mbr: MicroAlgos,
    pub add_pool_mbr: MicroAlgos,
    pub pool_init_mbr: MicroAlgos,
    pub add_staker_mbr: MicroAlgos,
}

/// Global state of a staking pool application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolGlobalState {
    pub last_payout: Option<Round>,
    /// Exponentially weighted APY in parts per ten thousand.
    pub weighted_moving_average: Option<u64>,
    pub algod_version: Option<String>,
}

/// Derived reward figures for a validator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorMetrics {
    pub rewards_balance: MicroAlgos,
    pub rounds_since_last_payout: Option<Round>,
    /// Balance-weighted pool APY in parts per ten thousand.
    pub apy_bps: u64,
}

/// Payout liveness indicator derived from [`ValidatorMetrics`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorHealth {
    Normal,
    Watch,
    Warning,
    Error,
}

impl ValidatorHealth {
    pub fn label(&self) -> &'static str {
        match self {
            ValidatorHealth::Normal => "Fully operational",
            ValidatorHealth::Watch => "Payouts Lagging",
            ValidatorHealth::Warning => "Payouts Stopped",
            ValidatorHealth::Error => "Rewards not compounding",
        }
    }
}

/// Composed validator view. Built from a full set of reads, never patched in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub id: ValidatorId,
    pub config: ValidatorConfig,
    pub state: ValidatorState,
    pub pools: Vec<LocalPoolInfo>,
    pub node_pool_assignment: NodePoolAssignment,
    pub reward_token: Option<Asset>,
    pub gating_assets: Option<Vec<Asset>>,
    pub nfd: Option<NameRecord>,
    pub metrics: Option<ValidatorMetrics>,
}

impl Validator {
    pub fn node_for_pool(&self, pool_app_id: AppId) -> Option<usize> {
        self.node_pool_assignment.node_for_pool(pool_app_id)
    }

    pub fn has_available_slots(&self) -> bool {
        self.node_pool_assignment
            .has_available_slots(self.config.pools_per_node)
    }

    pub fn max_stakers(&self, constraints: &Constraints) -> u64 {
        u64::from(self.state.num_pools) * constraints.max_stakers_per_pool
    }

    pub fn max_pools(&self, constraints: &Constraints) -> u64 {
        u64::from(self.config.pools_per_node) * constraints.max_nodes
    }

    /// Whether adding stake is already disabled at unix time `now`.
    pub fn is_sunsetted(&self, now: u64) -> bool {
        self.config.sunsetting_on > 0 && self.config.sunsetting_on <= now
    }

    pub fn is_migration_set(&self) -> bool {
        self.config.sunsetting_to > 0
    }
}
