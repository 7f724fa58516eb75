use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use tokio::time::Instant;
use tracing::{info, warn};

use super::enrichment::enrich;
use super::metrics::fetch_validator_metrics;
use super::validator::{assemble_validator, ValidatorRecords};
use super::Readers;
use crate::cache::{EntityKind, QueryCache, QueryKey};
use crate::config::{CacheConfig, SchedulerConfig};
use crate::errors::{EngineError, EngineResult};
use crate::node_client::NodeClientResult;
use crate::registry::RegistryReader;
use crate::scheduler::{QueryDescriptor, QueryScheduler};
use crate::types::{
    LocalPoolInfo, NodePoolAssignment, Validator, ValidatorConfig, ValidatorId, ValidatorMetrics,
    ValidatorState,
};

/// Caches backing the directory, one per record kind.
#[derive(Debug)]
pub struct DirectoryCaches {
    pub config: Arc<QueryCache<ValidatorConfig>>,
    pub state: Arc<QueryCache<ValidatorState>>,
    pub pools: Arc<QueryCache<Vec<LocalPoolInfo>>>,
    pub node_pool_assignments: Arc<QueryCache<NodePoolAssignment>>,
    pub metrics: Arc<QueryCache<ValidatorMetrics>>,
}

impl DirectoryCaches {
    pub fn new(policies: &CacheConfig) -> Self {
        Self {
            config: Arc::new(QueryCache::new(policies.clone())),
            state: Arc::new(QueryCache::new(policies.clone())),
            pools: Arc::new(QueryCache::new(policies.clone())),
            node_pool_assignments: Arc::new(QueryCache::new(policies.clone())),
            metrics: Arc::new(QueryCache::new(policies.clone())),
        }
    }
}

/// Result of one directory load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryLoad {
    /// Assembled validators, ordered by id.
    pub validators: Vec<Validator>,
    /// Validators left out because a core record was unavailable.
    pub skipped: Vec<ValidatorId>,
}

/// Loads every registered validator through the query scheduler.
pub struct ValidatorDirectory {
    readers: Readers,
    scheduler: QueryScheduler,
    metrics_scheduler: QueryScheduler,
    caches: DirectoryCaches,
}

impl ValidatorDirectory {
    pub fn new(readers: Readers, scheduler: SchedulerConfig, cache: &CacheConfig) -> Self {
        let scheduler = scheduler.sanitized();
        let metrics_batch_size = scheduler.metrics_batch_size;
        Self {
            readers,
            metrics_scheduler: QueryScheduler::new(scheduler.clone().with_batch_size(metrics_batch_size)),
            scheduler: QueryScheduler::new(scheduler),
            caches: DirectoryCaches::new(cache),
        }
    }

    pub fn caches(&self) -> &DirectoryCaches {
        &self.caches
    }

    pub async fn load_all(&self) -> EngineResult<DirectoryLoad> {
        let count = self.readers.registry.num_validators().await?;
        let ids: Vec<ValidatorId> = (1..=count).collect();
        let registry = &self.readers.registry;

        let configs = self.scheduler.schedule(
            descriptors(&ids, EntityKind::ValidatorConfig, &self.caches.config, registry, |r, id| {
                Box::pin(async move { r.validator_config(id).await })
            }),
            Arc::clone(&self.caches.config),
        );
        let states = self.scheduler.schedule(
            descriptors(&ids, EntityKind::ValidatorState, &self.caches.state, registry, |r, id| {
                Box::pin(async move { r.validator_state(id).await })
            }),
            Arc::clone(&self.caches.state),
        );
        let pools = self.scheduler.schedule(
            descriptors(&ids, EntityKind::ValidatorPools, &self.caches.pools, registry, |r, id| {
                Box::pin(async move { r.validator_pools(id).await })
            }),
            Arc::clone(&self.caches.pools),
        );
        let assignments = self.scheduler.schedule(
            descriptors(
                &ids,
                EntityKind::NodePoolAssignments,
                &self.caches.node_pool_assignments,
                registry,
                |r, id| Box::pin(async move { r.node_pool_assignments(id).await }),
            ),
            Arc::clone(&self.caches.node_pool_assignments),
        );

        let (configs, states, pools, assignments) = tokio::join!(
            configs.wait_complete(),
            states.wait_complete(),
            pools.wait_complete(),
            assignments.wait_complete(),
        );

        let mut assembled = Vec::new();
        let mut skipped = Vec::new();
        let columns = configs
            .data
            .into_iter()
            .zip(states.data)
            .zip(pools.data)
            .zip(assignments.data);
        for (id, (((config, state), pools), assignment)) in ids.iter().copied().zip(columns) {
            match ValidatorRecords::from_parts(id, config, state, pools, assignment) {
                Ok(records) => assembled.push((id, records)),
                Err(err) => {
                    warn!(validator_id = id, error = %err, "skipping validator");
                    skipped.push(id);
                }
            }
        }

        let (metrics, enrichments) = tokio::join!(
            self.load_metrics(&assembled),
            join_all(assembled.iter().map(|(_, records)| {
                enrich(
                    &records.config,
                    self.readers.ledger.as_ref(),
                    self.readers.names.as_ref(),
                )
            })),
        );

        let mut validators = Vec::with_capacity(assembled.len());
        for ((id, records), enrichment) in assembled.into_iter().zip(enrichments) {
            let metrics = metrics.get(&id).cloned();
            validators.push(assemble_validator(id, records, enrichment, metrics)?);
        }
        info!(
            loaded = validators.len(),
            skipped = skipped.len(),
            "validator directory loaded"
        );
        Ok(DirectoryLoad {
            validators,
            skipped,
        })
    }

    /// Metrics fan out per pool, so they are released in smaller waves.
    async fn load_metrics(
        &self,
        assembled: &[(ValidatorId, ValidatorRecords)],
    ) -> HashMap<ValidatorId, ValidatorMetrics> {
        let now = Instant::now();
        let descriptors: Vec<_> = assembled
            .iter()
            .map(|(id, records)| {
                let key = QueryKey::new(EntityKind::ValidatorMetrics, id);
                if self.caches.metrics.needs_refetch(&key, now) {
                    self.caches.metrics.invalidate(&key);
                }
                let readers = self.readers.clone();
                let pools = records.pools.clone();
                let total_staked = records.state.total_algo_staked;
                QueryDescriptor::new(key, move || {
                    let readers = readers.clone();
                    let pools = pools.clone();
                    async move {
                        fetch_validator_metrics(
                            readers.ledger.as_ref(),
                            readers.registry.as_ref(),
                            &pools,
                            total_staked,
                        )
                        .await
                    }
                })
            })
            .collect();

        let queries = self
            .metrics_scheduler
            .schedule(descriptors, Arc::clone(&self.caches.metrics));
        let snapshot = queries.wait_complete().await;
        assembled
            .iter()
            .zip(snapshot.data)
            .filter_map(|((id, _), metrics)| metrics.map(|metrics| (*id, metrics)))
            .collect()
    }
}

type RecordFuture<V> = BoxFuture<'static, NodeClientResult<V>>;

/// One descriptor per id. Entries the cache policy wants re-read are evicted first.
fn descriptors<V, F>(
    ids: &[ValidatorId],
    kind: EntityKind,
    cache: &Arc<QueryCache<V>>,
    registry: &Arc<dyn RegistryReader>,
    read: F,
) -> Vec<QueryDescriptor<V>>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(Arc<dyn RegistryReader>, ValidatorId) -> RecordFuture<V> + Copy + Send + Sync + 'static,
{
    let now = Instant::now();
    ids.iter()
        .map(|id| {
            let id = *id;
            let key = QueryKey::new(kind, id);
            if cache.needs_refetch(&key, now) {
                cache.invalidate(&key);
            }
            let registry = Arc::clone(registry);
            QueryDescriptor::new(key, move || {
                let pending = read(Arc::clone(&registry), id);
                async move { pending.await.map_err(EngineError::from) }
            })
        })
        .collect()
}
