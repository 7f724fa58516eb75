use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ledger::{Address, MicroAlgos, Round};
use super::validator::{ValidatorId, ValidatorPoolKey};

/// One staker slot inside a pool's staker box.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakedInfo {
    pub account: Address,
    pub balance: MicroAlgos,
    pub total_rewarded: MicroAlgos,
    pub reward_token_balance: u64,
    pub entry_round: Round,
    /// Round until which the position is locked, zero when unlocked.
    #[serde(default)]
    pub locked_until: Round,
}

impl StakedInfo {
    pub fn is_empty_slot(&self) -> bool {
        self.account.is_zero()
    }
}

/// A staker's position in one pool, tagged with the pool's last payout round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerPoolData {
    pub info: StakedInfo,
    pub pool_key: ValidatorPoolKey,
    pub last_payout: Round,
}

/// Totals of one account's positions under one validator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerValidatorData {
    pub validator_id: ValidatorId,
    pub balance: MicroAlgos,
    pub total_rewarded: MicroAlgos,
    pub reward_token_balance: u64,
    pub entry_round: Round,
    pub last_payout: Round,
    pub pools: Vec<StakerPoolData>,
}

impl StakerValidatorData {
    pub fn from_pool(pool: StakerPoolData) -> Self {
        Self {
            validator_id: pool.pool_key.id,
            balance: pool.info.balance,
            total_rewarded: pool.info.total_rewarded,
            reward_token_balance: pool.info.reward_token_balance,
            entry_round: pool.info.entry_round,
            last_payout: pool.last_payout,
            pools: vec![pool],
        }
    }

    /// Folds another pool of the same validator into the totals.
    pub fn absorb(&mut self, pool: StakerPoolData) {
        self.balance = self.balance.saturating_add(pool.info.balance);
        self.total_rewarded = self.total_rewarded.saturating_add(pool.info.total_rewarded);
        self.reward_token_balance = self
            .reward_token_balance
            .saturating_add(pool.info.reward_token_balance);
        self.entry_round = self.entry_round.max(pool.info.entry_round);
        self.last_payout = self.last_payout.max(pool.last_payout);
        self.pools.push(pool);
    }
}

/// One account's stake summed across the pools in scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerTotals {
    pub account: Address,
    pub balance: MicroAlgos,
    pub total_rewarded: MicroAlgos,
    pub reward_token_balance: u64,
}

impl StakerTotals {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            ..Self::default()
        }
    }

    pub fn add(&mut self, info: &StakedInfo) {
        self.balance = self.balance.saturating_add(info.balance);
        self.total_rewarded = self.total_rewarded.saturating_add(info.total_rewarded);
        self.reward_token_balance = self
            .reward_token_balance
            .saturating_add(info.reward_token_balance);
    }
}

/// One slice of the stakers chart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerChartEntry {
    pub account: Address,
    /// Resolved name, or the raw account when no name is linked.
    pub name: String,
    /// Charted amount: the summed balance.
    pub value: MicroAlgos,
    pub total_rewarded: MicroAlgos,
    pub reward_token_balance: u64,
    pub href: String,
}

/// Which pools of a validator the stakers chart covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolFilter {
    #[default]
    All,
    /// Zero-based position in the validator's pool list.
    Pool(usize),
}

impl PoolFilter {
    pub fn includes(&self, index: usize) -> bool {
        match self {
            PoolFilter::All => true,
            PoolFilter::Pool(selected) => *selected == index,
        }
    }
}

impl fmt::Display for PoolFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolFilter::All => f.write_str("all"),
            PoolFilter::Pool(index) => write!(f, "{index}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid pool filter `{0}`")]
pub struct ParsePoolFilterError(pub String);

impl FromStr for PoolFilter {
    type Err = ParsePoolFilterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(PoolFilter::All);
        }
        trimmed
            .parse::<usize>()
            .map(PoolFilter::Pool)
            .map_err(|_| ParsePoolFilterError(value.to_string()))
    }
}

/// Display name of the pool at zero-based `index`.
pub fn pool_name_from_index(index: usize) -> String {
    format!("Pool {}", index + 1)
}

/// Zero-based index encoded in a `Pool N` display name.
pub fn pool_index_from_name(name: &str) -> Option<usize> {
    name.trim()
        .strip_prefix("Pool ")?
        .trim()
        .parse::<usize>()
        .ok()?
        .checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(validator: ValidatorId, pool_id: u64, balance: u64, entry: Round, payout: Round) -> StakerPoolData {
        StakerPoolData {
            info: StakedInfo {
                account: Address::new("STAKER"),
                balance,
                total_rewarded: balance / 10,
                reward_token_balance: 1,
                entry_round: entry,
                locked_until: 0,
            },
            pool_key: ValidatorPoolKey::new(validator, pool_id, 100 + pool_id),
            last_payout: payout,
        }
    }

    #[test]
    fn absorb_sums_amounts_and_keeps_later_rounds() {
        let mut data = StakerValidatorData::from_pool(pool(1, 1, 1_000, 50, 900));
        data.absorb(pool(1, 2, 3_000, 40, 950));

        assert_eq!(data.balance, 4_000);
        assert_eq!(data.total_rewarded, 400);
        assert_eq!(data.reward_token_balance, 2);
        assert_eq!(data.entry_round, 50);
        assert_eq!(data.last_payout, 950);
        assert_eq!(data.pools.len(), 2);
    }

    #[test]
    fn pool_filter_parses_all_and_indices() {
        assert_eq!("all".parse::<PoolFilter>(), Ok(PoolFilter::All));
        assert_eq!("2".parse::<PoolFilter>(), Ok(PoolFilter::Pool(2)));
        assert!("pool".parse::<PoolFilter>().is_err());
        assert!(PoolFilter::All.includes(7));
        assert!(!PoolFilter::Pool(1).includes(0));
    }

    #[test]
    fn bad_pool_filter_reports_the_input() {
        let err = " pool 2".parse::<PoolFilter>().expect_err("not an index");
        assert_eq!(err, ParsePoolFilterError(" pool 2".into()));
        assert_eq!(err.to_string(), "invalid pool filter ` pool 2`");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn pool_names_map_to_zero_based_indices() {
        assert_eq!(pool_name_from_index(0), "Pool 1");
        assert_eq!(pool_index_from_name("Pool 3"), Some(2));
        assert_eq!(pool_index_from_name("Pool 0"), None);
        assert_eq!(pool_index_from_name("Node 1"), None);
    }
}
