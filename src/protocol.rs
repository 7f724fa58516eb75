//! Protocol-wide parameters read from the registry and kept in a cache.
//!
//! Minimum balance amounts never go stale; constraints expire after the
//! configured interval and are re-read when the consumer resumes.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::cache::{EntityKind, QueryCache, QueryKey};
use crate::config::CacheConfig;
use crate::errors::EngineResult;
use crate::node_client::NodeClientResult;
use crate::registry::RegistryReader;
use crate::types::{Constraints, MbrAmounts};

const REGISTRY_SCOPE: &str = "registry";

/// Read-through access to [`MbrAmounts`] and [`Constraints`].
pub struct ProtocolParams {
    registry: Arc<dyn RegistryReader>,
    mbr: QueryCache<MbrAmounts>,
    constraints: QueryCache<Constraints>,
}

impl ProtocolParams {
    pub fn new(registry: Arc<dyn RegistryReader>, policies: &CacheConfig) -> Self {
        Self {
            registry,
            mbr: QueryCache::new(policies.clone()),
            constraints: QueryCache::new(policies.clone()),
        }
    }

    pub async fn fetch_mbr_amounts(&self) -> EngineResult<MbrAmounts> {
        read_through(&self.mbr, EntityKind::MbrAmounts, || {
            self.registry.mbr_amounts()
        })
        .await
    }

    pub async fn fetch_protocol_constraints(&self) -> EngineResult<Constraints> {
        read_through(&self.constraints, EntityKind::Constraints, || {
            self.registry.protocol_constraints()
        })
        .await
    }

    /// Forwards a foreground resume to both caches.
    pub fn mark_resumed(&self) {
        self.mbr.mark_resumed();
        self.constraints.mark_resumed();
    }

    /// Drops both cached values, e.g. after a registry upgrade.
    pub fn invalidate(&self) {
        self.mbr.invalidate_kind(EntityKind::MbrAmounts);
        self.constraints.invalidate_kind(EntityKind::Constraints);
    }
}

async fn read_through<V, F, Fut>(
    cache: &QueryCache<V>,
    kind: EntityKind,
    fetch: F,
) -> EngineResult<V>
where
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = NodeClientResult<V>>,
{
    let key = QueryKey::new(kind, REGISTRY_SCOPE);
    if !cache.needs_refetch(&key, Instant::now()) {
        if let Some(value) = cache.get(&key) {
            debug!(%key, "protocol parameter served from cache");
            return Ok(value);
        }
    }
    let value = fetch().await?;
    cache.insert(key, value.clone());
    Ok(value)
}
