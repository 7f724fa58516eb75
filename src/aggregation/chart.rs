use std::collections::HashMap;

use futures::future::{join_all, try_join_all};
use tracing::debug;

use super::staker::fetch_staked_info_for_pool;
use super::Readers;
use crate::config::{ExplorerConfig, NameServiceConfig};
use crate::errors::EngineResult;
use crate::name_service::NameView;
use crate::types::{Address, PoolFilter, StakedInfo, StakerChartEntry, StakerTotals, ValidatorId};

/// Builds per-account stake slices for one validator.
#[derive(Clone)]
pub struct StakersChart {
    readers: Readers,
    explorer: ExplorerConfig,
    name_service: NameServiceConfig,
}

impl StakersChart {
    pub fn new(readers: Readers, explorer: ExplorerConfig, name_service: NameServiceConfig) -> Self {
        Self {
            readers,
            explorer,
            name_service,
        }
    }

    pub async fn load(
        &self,
        validator_id: ValidatorId,
        filter: PoolFilter,
    ) -> EngineResult<Vec<StakerChartEntry>> {
        let registry = self.readers.registry.as_ref();
        let pools = registry.validator_pools(validator_id).await?;
        let in_scope: Vec<_> = pools
            .iter()
            .enumerate()
            .filter(|(index, _)| filter.includes(*index))
            .map(|(_, pool)| pool.pool_app_id)
            .collect();
        let per_pool = try_join_all(
            in_scope
                .iter()
                .map(|app_id| fetch_staked_info_for_pool(registry, *app_id)),
        )
        .await?;

        let totals = sum_by_account(per_pool.iter().flatten());
        let names = self.resolve_names(totals.iter().map(|totals| &totals.account)).await;
        Ok(totals
            .into_iter()
            .map(|totals| self.entry(totals, &names))
            .collect())
    }

    /// Reverse lookups that fail are treated as "no name".
    async fn resolve_names<'a>(
        &self,
        accounts: impl Iterator<Item = &'a Address>,
    ) -> HashMap<Address, String> {
        let names = self.readers.names.as_ref();
        let lookups = accounts.map(|account| async move {
            match names.reverse_lookup(account, NameView::Tiny).await {
                Ok(record) => record.map(|record| (account.clone(), record.name)),
                Err(err) => {
                    debug!(%account, error = %err, "reverse lookup failed");
                    None
                }
            }
        });
        join_all(lookups).await.into_iter().flatten().collect()
    }

    fn entry(&self, totals: StakerTotals, names: &HashMap<Address, String>) -> StakerChartEntry {
        let (name, href) = match names.get(&totals.account) {
            Some(name) => (name.clone(), self.name_service.profile_url(name)),
            None => (
                totals.account.to_string(),
                self.explorer.account_link(totals.account.as_str()),
            ),
        };
        StakerChartEntry {
            name,
            href,
            value: totals.balance,
            total_rewarded: totals.total_rewarded,
            reward_token_balance: totals.reward_token_balance,
            account: totals.account,
        }
    }
}

/// Sums balances and rewards per account, in order of first appearance.
pub fn sum_by_account<'a>(stakers: impl IntoIterator<Item = &'a StakedInfo>) -> Vec<StakerTotals> {
    let mut order: Vec<StakerTotals> = Vec::new();
    let mut index: HashMap<Address, usize> = HashMap::new();
    for staker in stakers {
        let position = *index.entry(staker.account.clone()).or_insert_with(|| {
            order.push(StakerTotals::new(staker.account.clone()));
            order.len() - 1
        });
        order[position].add(staker);
    }
    order
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::name_service::{NameRecord, StubNameService};
    use crate::node_client::StubLedger;
    use crate::registry::{StubRegistry, StubValidator};
    use crate::types::LocalPoolInfo;

    fn staker(account: &str, balance: u64) -> StakedInfo {
        StakedInfo {
            account: Address::new(account),
            balance,
            total_rewarded: balance / 10,
            reward_token_balance: 1,
            ..StakedInfo::default()
        }
    }

    fn chart() -> StakersChart {
        let pools = vec![
            LocalPoolInfo {
                pool_id: 1,
                pool_app_id: 100,
                ..LocalPoolInfo::default()
            },
            LocalPoolInfo {
                pool_id: 2,
                pool_app_id: 101,
                ..LocalPoolInfo::default()
            },
        ];
        let registry = StubRegistry::new()
            .with_validator(StubValidator::new(1, pools))
            .with_stakers(
                100,
                vec![staker("ALICE", 1_000), StakedInfo::default(), staker("BOB", 500)],
            )
            .with_stakers(101, vec![staker("BOB", 250), staker("CAROL", 75)]);
        let names = StubNameService::new()
            .with_record(NameRecord::new("bob.algo").with_verified("BOB"))
            .with_failing_address("CAROL");
        let readers = Readers::new(
            Arc::new(StubLedger::new()),
            Arc::new(registry),
            Arc::new(names),
        );
        StakersChart::new(
            readers,
            ExplorerConfig {
                account_url: "https://explorer.test/account".into(),
            },
            NameServiceConfig {
                app_url: "https://names.test".into(),
                ..NameServiceConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn all_pools_are_summed_per_account() {
        let entries = chart().load(1, PoolFilter::All).await.expect("chart");
        let summary: Vec<_> = entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.value, entry.href.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("ALICE", 1_000, "https://explorer.test/account/ALICE"),
                ("bob.algo", 750, "https://names.test/name/bob.algo"),
                ("CAROL", 75, "https://explorer.test/account/CAROL"),
            ]
        );
    }

    #[tokio::test]
    async fn single_pool_filter_limits_scope() {
        let entries = chart().load(1, PoolFilter::Pool(1)).await.expect("chart");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].account, Address::new("BOB"));
        assert_eq!(entries[0].value, 250);
        assert_eq!(entries[1].name, "CAROL");
    }

    #[tokio::test]
    async fn entries_carry_summed_rewards() {
        let entries = chart().load(1, PoolFilter::All).await.expect("chart");
        let bob = entries
            .iter()
            .find(|entry| entry.account == Address::new("BOB"))
            .expect("bob");
        assert_eq!(bob.value, 750);
        assert_eq!(bob.total_rewarded, 50 + 25);
        assert_eq!(bob.reward_token_balance, 2);
    }

    #[test]
    fn sums_keep_first_appearance_order() {
        let stakers = [staker("B", 10), staker("A", 20), staker("B", 30)];
        let totals = sum_by_account(stakers.iter());
        let summary: Vec<_> = totals
            .iter()
            .map(|totals| (totals.account.as_str(), totals.balance, totals.total_rewarded))
            .collect();
        assert_eq!(summary, vec![("B", 40, 4), ("A", 20, 2)]);
        assert_eq!(totals[0].reward_token_balance, 2);
    }
}
