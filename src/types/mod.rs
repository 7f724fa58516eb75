mod ledger;
mod staking;
mod validator;

pub use ledger::{
    AccountInfo, Address, AppId, Asset, AssetHolding, AssetId, AssetParams, Exclude, MicroAlgos,
    Round, SuggestedParams, ZERO_ADDRESS,
};
pub use staking::{
    pool_index_from_name, pool_name_from_index, ParsePoolFilterError, PoolFilter, StakedInfo,
    StakerChartEntry, StakerPoolData, StakerTotals, StakerValidatorData,
};
pub use validator::{
    Constraints, GatingType, LocalPoolInfo, MbrAmounts, NodePoolAssignment, PoolGlobalState,
    PoolInfo, Validator, ValidatorConfig, ValidatorHealth, ValidatorId, ValidatorMetrics,
    ValidatorPoolKey, ValidatorState, BASIS_POINTS, GATING_ASSET_SLOTS, PARTS_PER_MILLION,
};
