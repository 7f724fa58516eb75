use tracing::{debug, warn};

use super::enrichment::{enrich, Enrichment};
use super::metrics::fetch_validator_metrics;
use super::Readers;
use crate::errors::{EngineError, EngineResult};
use crate::types::{
    LocalPoolInfo, NodePoolAssignment, Validator, ValidatorConfig, ValidatorId, ValidatorMetrics,
    ValidatorState,
};

/// The four core reads a validator view is built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorRecords {
    pub config: ValidatorConfig,
    pub state: ValidatorState,
    pub pools: Vec<LocalPoolInfo>,
    pub node_pool_assignment: NodePoolAssignment,
}

impl ValidatorRecords {
    /// Gathers records read separately. Any absent record means the
    /// validator cannot be produced this cycle.
    pub fn from_parts(
        id: ValidatorId,
        config: Option<ValidatorConfig>,
        state: Option<ValidatorState>,
        pools: Option<Vec<LocalPoolInfo>>,
        node_pool_assignment: Option<NodePoolAssignment>,
    ) -> EngineResult<Self> {
        let missing: Vec<&str> = [
            ("config", config.is_none()),
            ("state", state.is_none()),
            ("pools", pools.is_none()),
            ("node pool assignment", node_pool_assignment.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (config, state, pools, node_pool_assignment) {
            (Some(config), Some(state), Some(pools), Some(node_pool_assignment)) => Ok(Self {
                config,
                state,
                pools,
                node_pool_assignment,
            }),
            _ => Err(EngineError::validator_not_found(
                id,
                format!("missing {}", missing.join(", ")),
            )),
        }
    }
}

/// Issues the four core reads concurrently; the first failure wins.
pub async fn fetch_validator_records(
    readers: &Readers,
    id: ValidatorId,
) -> EngineResult<ValidatorRecords> {
    let registry = readers.registry.as_ref();
    let result = tokio::try_join!(
        registry.validator_config(id),
        registry.validator_state(id),
        registry.validator_pools(id),
        registry.node_pool_assignments(id),
    );
    match result {
        Ok((config, state, pools, node_pool_assignment)) => Ok(ValidatorRecords {
            config,
            state,
            pools,
            node_pool_assignment,
        }),
        Err(err) => {
            debug!(validator_id = id, error = %err, "validator records unavailable");
            Err(EngineError::validator_not_found(id, err))
        }
    }
}

/// Composes the view. Pure, so identical inputs always give identical views.
pub fn assemble_validator(
    id: ValidatorId,
    records: ValidatorRecords,
    enrichment: Enrichment,
    metrics: Option<ValidatorMetrics>,
) -> EngineResult<Validator> {
    if records.config.id != 0 && records.config.id != id {
        return Err(EngineError::AggregationInconsistency {
            view: "validator",
            missing: format!("config for {id} (got {})", records.config.id),
        });
    }
    Ok(Validator {
        id,
        config: records.config,
        state: records.state,
        pools: records.pools,
        node_pool_assignment: records.node_pool_assignment,
        reward_token: enrichment.reward_token,
        gating_assets: enrichment.gating_assets,
        nfd: enrichment.nfd,
        metrics,
    })
}

/// Reads, enriches and assembles one validator.
pub async fn fetch_validator(readers: &Readers, id: ValidatorId) -> EngineResult<Validator> {
    let records = fetch_validator_records(readers, id).await?;
    let (enrichment, metrics) = tokio::join!(
        enrich(&records.config, readers.ledger.as_ref(), readers.names.as_ref()),
        fetch_validator_metrics(
            readers.ledger.as_ref(),
            readers.registry.as_ref(),
            &records.pools,
            records.state.total_algo_staked,
        ),
    );
    let metrics = match metrics {
        Ok(metrics) => Some(metrics),
        Err(err) => {
            warn!(validator_id = id, error = %err, "validator metrics unavailable");
            None
        }
    };
    assemble_validator(id, records, enrichment, metrics)
}
