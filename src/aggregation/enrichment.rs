//! Optional metadata attached to a validator view.
//!
//! The validator config decides which lookups apply. Each lookup is a
//! separate [`EnrichmentRequest`] so it can be resolved and tested on its own;
//! a failed lookup is logged and leaves its field empty.

use futures::future::join_all;
use tracing::warn;

use crate::name_service::{NameRecord, NameService, NameView};
use crate::node_client::LedgerReader;
use crate::types::{AppId, Asset, AssetId, GatingType, ValidatorConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnrichmentRequest {
    RewardToken(AssetId),
    GatingAsset(AssetId),
    NameRecord(AppId),
}

impl EnrichmentRequest {
    /// Lookups signalled by `config`, in a stable order.
    pub fn plan(config: &ValidatorConfig) -> Vec<EnrichmentRequest> {
        let mut requests = Vec::new();
        if config.reward_token_id > 0 {
            requests.push(EnrichmentRequest::RewardToken(config.reward_token_id));
        }
        if config.entry_gating_type == GatingType::AssetHeld {
            requests.extend(config.gating_asset_ids().map(EnrichmentRequest::GatingAsset));
        }
        if config.nfd_for_info > 0 {
            requests.push(EnrichmentRequest::NameRecord(config.nfd_for_info));
        }
        requests
    }

    pub async fn resolve(
        self,
        ledger: &dyn LedgerReader,
        names: &dyn NameService,
    ) -> Option<EnrichmentResult> {
        match self {
            EnrichmentRequest::RewardToken(asset_id) => match ledger.asset(asset_id).await {
                Ok(asset) => Some(EnrichmentResult::RewardToken(asset)),
                Err(err) => {
                    warn!(asset_id, error = %err, "reward token lookup failed");
                    None
                }
            },
            EnrichmentRequest::GatingAsset(asset_id) => match ledger.asset(asset_id).await {
                Ok(asset) => Some(EnrichmentResult::GatingAsset(asset)),
                Err(err) => {
                    warn!(asset_id, error = %err, "gating asset lookup failed");
                    None
                }
            },
            EnrichmentRequest::NameRecord(app_id) => {
                match names.lookup(&app_id.to_string(), NameView::Full).await {
                    Ok(record) => Some(EnrichmentResult::NameRecord(record)),
                    Err(err) => {
                        warn!(app_id, error = %err, "name record lookup failed");
                        None
                    }
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnrichmentResult {
    RewardToken(Asset),
    GatingAsset(Asset),
    NameRecord(NameRecord),
}

/// Resolved optional fields of a validator view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub reward_token: Option<Asset>,
    /// `None` unless at least one gating asset resolved.
    pub gating_assets: Option<Vec<Asset>>,
    pub nfd: Option<NameRecord>,
}

impl Enrichment {
    /// Folds results in request order, so gating assets keep slot order.
    pub fn from_results(results: impl IntoIterator<Item = EnrichmentResult>) -> Self {
        let mut enrichment = Enrichment::default();
        for result in results {
            match result {
                EnrichmentResult::RewardToken(asset) => enrichment.reward_token = Some(asset),
                EnrichmentResult::GatingAsset(asset) => enrichment
                    .gating_assets
                    .get_or_insert_with(Vec::new)
                    .push(asset),
                EnrichmentResult::NameRecord(record) => enrichment.nfd = Some(record),
            }
        }
        enrichment
    }
}

/// Resolves every lookup `config` calls for, concurrently.
pub async fn enrich(
    config: &ValidatorConfig,
    ledger: &dyn LedgerReader,
    names: &dyn NameService,
) -> Enrichment {
    let requests = EnrichmentRequest::plan(config);
    let results = join_all(
        requests
            .into_iter()
            .map(|request| request.resolve(ledger, names)),
    )
    .await;
    Enrichment::from_results(results.into_iter().flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name_service::StubNameService;
    use crate::node_client::StubLedger;
    use crate::types::AssetParams;

    fn asset(index: AssetId) -> Asset {
        Asset {
            index,
            params: AssetParams {
                unit_name: Some(format!("TKN{index}")),
                ..AssetParams::default()
            },
        }
    }

    #[test]
    fn plan_skips_gating_assets_unless_asset_held() {
        let mut config = ValidatorConfig {
            reward_token_id: 7,
            entry_gating_type: GatingType::AssetCreatedBy,
            entry_gating_assets: [11, 0, 12, 0],
            nfd_for_info: 99,
            ..ValidatorConfig::default()
        };
        assert_eq!(
            EnrichmentRequest::plan(&config),
            vec![
                EnrichmentRequest::RewardToken(7),
                EnrichmentRequest::NameRecord(99)
            ]
        );

        config.entry_gating_type = GatingType::AssetHeld;
        assert_eq!(
            EnrichmentRequest::plan(&config),
            vec![
                EnrichmentRequest::RewardToken(7),
                EnrichmentRequest::GatingAsset(11),
                EnrichmentRequest::GatingAsset(12),
                EnrichmentRequest::NameRecord(99)
            ]
        );

        assert!(EnrichmentRequest::plan(&ValidatorConfig::default()).is_empty());
    }

    #[tokio::test]
    async fn failed_lookups_leave_fields_empty() {
        let ledger = StubLedger::new()
            .with_asset(asset(11))
            .with_failing_asset(7)
            .with_failing_asset(12);
        let names = StubNameService::new();
        let config = ValidatorConfig {
            reward_token_id: 7,
            entry_gating_type: GatingType::AssetHeld,
            entry_gating_assets: [11, 12, 0, 0],
            nfd_for_info: 99,
            ..ValidatorConfig::default()
        };

        let enrichment = enrich(&config, &ledger, &names).await;
        assert!(enrichment.reward_token.is_none());
        assert!(enrichment.nfd.is_none());
        assert_eq!(enrichment.gating_assets, Some(vec![asset(11)]));
    }

    #[tokio::test]
    async fn name_record_resolves_by_app_id() {
        let ledger = StubLedger::new();
        let names = StubNameService::new()
            .with_record(NameRecord::new("validator.algo").with_app_id(99));

        let result = EnrichmentRequest::NameRecord(99)
            .resolve(&ledger, &names)
            .await;
        assert!(matches!(result, Some(EnrichmentResult::NameRecord(ref record)) if record.name == "validator.algo"));
    }
}
