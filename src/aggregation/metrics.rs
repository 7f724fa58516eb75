use futures::future::try_join_all;

use crate::config::HealthConfig;
use crate::errors::EngineResult;
use crate::node_client::LedgerReader;
use crate::registry::RegistryReader;
use crate::types::{LocalPoolInfo, MicroAlgos, Round, ValidatorHealth, ValidatorMetrics};

/// Balance and payout figures read for one funded pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolSample {
    pub balance: MicroAlgos,
    pub last_payout: Option<Round>,
    /// Moving-average APY in parts per ten thousand.
    pub apy_bps: Option<u64>,
}

/// Reads every pool's balance and payout state and derives the validator figures.
///
/// Pools without a spendable balance are skipped before their program state is read.
pub async fn fetch_validator_metrics(
    ledger: &dyn LedgerReader,
    registry: &dyn RegistryReader,
    pools: &[LocalPoolInfo],
    total_staked: MicroAlgos,
) -> EngineResult<ValidatorMetrics> {
    let params = ledger.suggested_params().await?;
    let samples = try_join_all(pools.iter().map(|pool| sample_pool(ledger, registry, pool))).await?;
    let samples: Vec<PoolSample> = samples.into_iter().flatten().collect();
    Ok(compute_metrics(&samples, total_staked, params.last_round))
}

async fn sample_pool(
    ledger: &dyn LedgerReader,
    registry: &dyn RegistryReader,
    pool: &LocalPoolInfo,
) -> EngineResult<Option<PoolSample>> {
    let balance = ledger.spendable_balance(&pool.pool_address).await?;
    if balance == 0 {
        return Ok(None);
    }
    let state = registry.pool_global_state(pool.pool_app_id).await?;
    Ok(Some(PoolSample {
        balance,
        last_payout: state.last_payout,
        apy_bps: state.weighted_moving_average,
    }))
}

pub fn compute_metrics(
    samples: &[PoolSample],
    total_staked: MicroAlgos,
    current_round: Round,
) -> ValidatorMetrics {
    let total_balance: MicroAlgos = samples.iter().map(|sample| sample.balance).sum();
    let rewards_balance = total_balance.saturating_sub(total_staked);

    let rounds_since_last_payout = samples
        .iter()
        .filter_map(|sample| sample.last_payout)
        .max()
        .map(|last| current_round.saturating_sub(last));

    let (weighted, weight) = samples
        .iter()
        .filter_map(|sample| match sample.apy_bps {
            Some(apy) if apy > 0 => Some((u128::from(apy), u128::from(sample.balance))),
            _ => None,
        })
        .fold((0u128, 0u128), |(sum, total), (apy, balance)| {
            (sum + apy * balance, total + balance)
        });
    let apy_bps = if weight == 0 {
        0
    } else {
        u64::try_from(weighted / weight).unwrap_or(u64::MAX)
    };

    ValidatorMetrics {
        rewards_balance,
        rounds_since_last_payout,
        apy_bps,
    }
}

/// Classifies payout liveness. Unknown payout history counts as the worst case.
pub fn validator_health(metrics: Option<&ValidatorMetrics>, thresholds: &HealthConfig) -> ValidatorHealth {
    let Some(rounds) = metrics.and_then(|metrics| metrics.rounds_since_last_payout) else {
        return ValidatorHealth::Error;
    };
    if rounds >= thresholds.error_after_rounds {
        ValidatorHealth::Error
    } else if rounds >= thresholds.warning_after_rounds {
        ValidatorHealth::Warning
    } else if rounds >= thresholds.watch_after_rounds {
        ValidatorHealth::Watch
    } else {
        ValidatorHealth::Normal
    }
}
