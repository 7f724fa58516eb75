use std::collections::HashSet;

use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::errors::EngineResult;
use crate::registry::RegistryReader;
use crate::types::{
    Address, AppId, StakedInfo, StakerPoolData, StakerValidatorData, ValidatorPoolKey,
};

/// Drops repeated pool keys, keeping the first occurrence of each triple.
pub fn dedupe_pool_keys(keys: Vec<ValidatorPoolKey>) -> Vec<ValidatorPoolKey> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|key| seen.insert(*key)).collect()
}

/// Pool keys recorded for `staker`, with duplicate entries collapsed.
pub async fn fetch_staked_pools_for_account(
    registry: &dyn RegistryReader,
    staker: &Address,
) -> EngineResult<Vec<ValidatorPoolKey>> {
    let raw = registry.staked_pools_for_account(staker).await?;
    let raw_len = raw.len();
    let keys = dedupe_pool_keys(raw);
    if keys.len() != raw_len {
        // The registry has been seen returning the same pool twice for one staker.
        warn!(
            %staker,
            duplicates = raw_len - keys.len(),
            "collapsed duplicate staked pool entries"
        );
    }
    Ok(keys)
}

/// One staker's position in the pool at `key`, with the pool's last payout round.
pub async fn fetch_staker_pool_data(
    registry: &dyn RegistryReader,
    key: ValidatorPoolKey,
    staker: &Address,
) -> EngineResult<StakerPoolData> {
    let (global_state, info) = tokio::try_join!(
        registry.pool_global_state(key.pool_app_id),
        registry.staker_info(key.pool_app_id, staker),
    )?;
    Ok(StakerPoolData {
        info,
        pool_key: key,
        last_payout: global_state.last_payout.unwrap_or(0),
    })
}

/// One entry per validator, in order of first appearance.
pub fn fold_by_validator(pools: Vec<StakerPoolData>) -> Vec<StakerValidatorData> {
    let mut folded: Vec<StakerValidatorData> = Vec::new();
    for pool in pools {
        match folded
            .iter_mut()
            .find(|entry| entry.validator_id == pool.pool_key.id)
        {
            Some(entry) => entry.absorb(pool),
            None => folded.push(StakerValidatorData::from_pool(pool)),
        }
    }
    folded
}

/// Per-validator totals of every position `staker` holds.
///
/// Pools are read `batch_size` at a time; a batch must fully resolve before
/// the next one is issued.
pub async fn fetch_staker_validator_data(
    registry: &dyn RegistryReader,
    staker: &Address,
    batch_size: usize,
) -> EngineResult<Vec<StakerValidatorData>> {
    let keys = fetch_staked_pools_for_account(registry, staker).await?;
    let mut pools = Vec::with_capacity(keys.len());
    for (batch, chunk) in keys.chunks(batch_size.max(1)).enumerate() {
        debug!(%staker, batch, size = chunk.len(), "reading staker pool batch");
        let results = try_join_all(
            chunk
                .iter()
                .map(|key| fetch_staker_pool_data(registry, *key, staker)),
        )
        .await?;
        pools.extend(results);
    }
    Ok(fold_by_validator(pools))
}

/// Occupied staker slots of one pool.
pub async fn fetch_staked_info_for_pool(
    registry: &dyn RegistryReader,
    pool_app_id: AppId,
) -> EngineResult<Vec<StakedInfo>> {
    let stakers = registry.pool_stakers(pool_app_id).await?;
    Ok(stakers
        .into_iter()
        .filter(|staker| !staker.is_empty_slot())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::errors::EngineError;
    use crate::registry::{RegistryCall, StubRegistry};
    use crate::types::PoolGlobalState;

    const STAKER: &str = "STAKER";

    fn position(balance: u64, entry_round: u64) -> StakedInfo {
        StakedInfo {
            account: Address::new(STAKER),
            balance,
            total_rewarded: balance / 100,
            reward_token_balance: 3,
            entry_round,
            locked_until: 0,
        }
    }

    fn payout(round: u64) -> PoolGlobalState {
        PoolGlobalState {
            last_payout: Some(round),
            ..PoolGlobalState::default()
        }
    }

    #[test]
    fn duplicate_triples_collapse_to_first_occurrence() {
        let keys = vec![
            ValidatorPoolKey::new(1, 1, 100),
            ValidatorPoolKey::new(2, 1, 200),
            ValidatorPoolKey::new(1, 1, 100),
            ValidatorPoolKey::new(1, 2, 101),
        ];
        assert_eq!(
            dedupe_pool_keys(keys),
            vec![
                ValidatorPoolKey::new(1, 1, 100),
                ValidatorPoolKey::new(2, 1, 200),
                ValidatorPoolKey::new(1, 2, 101),
            ]
        );
    }

    #[tokio::test]
    async fn positions_fold_into_one_entry_per_validator() {
        let registry = StubRegistry::new()
            .with_staked_pools(
                STAKER,
                vec![
                    ValidatorPoolKey::new(1, 1, 100),
                    ValidatorPoolKey::new(2, 1, 200),
                    ValidatorPoolKey::new(1, 2, 101),
                ],
            )
            .with_stakers(100, vec![position(1_000_000, 500)])
            .with_stakers(101, vec![position(2_000_000, 700)])
            .with_stakers(200, vec![position(5_000_000, 300)])
            .with_global_state(100, payout(900))
            .with_global_state(101, payout(950))
            .with_global_state(200, payout(800));

        let data = fetch_staker_validator_data(&registry, &Address::new(STAKER), 10)
            .await
            .expect("staker data");

        assert_eq!(data.len(), 2);
        let v1 = &data[0];
        assert_eq!(v1.validator_id, 1);
        assert_eq!(v1.balance, 3_000_000);
        assert_eq!(v1.total_rewarded, 30_000);
        assert_eq!(v1.reward_token_balance, 6);
        assert_eq!(v1.entry_round, 700);
        assert_eq!(v1.last_payout, 950);
        assert_eq!(v1.pools.len(), 2);

        let v2 = &data[1];
        assert_eq!(v2.validator_id, 2);
        assert_eq!(v2.balance, 5_000_000);
        assert_eq!(v2.pools.len(), 1);
    }

    #[tokio::test]
    async fn duplicated_registry_entries_are_read_once() {
        let registry = StubRegistry::new()
            .with_staked_pools(
                STAKER,
                vec![ValidatorPoolKey::new(1, 1, 100), ValidatorPoolKey::new(1, 1, 100)],
            )
            .with_stakers(100, vec![position(1_000, 1)]);

        let data = fetch_staker_validator_data(&registry, &Address::new(STAKER), 10)
            .await
            .expect("staker data");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].balance, 1_000);
        assert_eq!(data[0].pools.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_never_overlap() {
        let keys: Vec<_> = (0..23)
            .map(|index| ValidatorPoolKey::new(1 + index % 3, index, 1_000 + index))
            .collect();
        let mut registry = StubRegistry::new()
            .with_staked_pools(STAKER, keys.clone())
            .with_latency(Duration::from_millis(100));
        for key in &keys {
            registry = registry.with_stakers(key.pool_app_id, vec![position(10, key.pool_id)]);
        }

        let data = fetch_staker_validator_data(&registry, &Address::new(STAKER), 10)
            .await
            .expect("staker data");
        assert_eq!(registry.max_in_flight(), 10);
        assert_eq!(data.len(), 3);
        assert_eq!(data.iter().map(|entry| entry.pools.len()).sum::<usize>(), 23);
    }

    #[tokio::test]
    async fn a_failed_pool_read_fails_the_aggregation() {
        let registry = StubRegistry::new()
            .with_staked_pools(STAKER, vec![ValidatorPoolKey::new(1, 1, 100)])
            .with_stakers(100, vec![position(1, 1)])
            .with_failure(RegistryCall::StakerInfo, 100);
        let err = fetch_staker_validator_data(&registry, &Address::new(STAKER), 10)
            .await
            .expect_err("read failure");
        assert!(matches!(err, EngineError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_slots_are_filtered_from_pool_stakers() {
        let registry = StubRegistry::new().with_stakers(
            100,
            vec![
                position(1, 1),
                StakedInfo::default(),
                StakedInfo {
                    account: Address::new("OTHER"),
                    ..StakedInfo::default()
                },
            ],
        );
        let stakers = fetch_staked_info_for_pool(&registry, 100).await.expect("stakers");
        assert_eq!(stakers.len(), 2);
        assert!(stakers.iter().all(|staker| !staker.account.is_zero()));
    }
}
