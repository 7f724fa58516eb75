use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CacheConfig;

/// Kind of remote entity a cached value was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    NumValidators,
    ValidatorConfig,
    ValidatorState,
    ValidatorPools,
    NodePoolAssignments,
    ValidatorMetrics,
    StakedInfo,
    Stakes,
    Asset,
    NameRecord,
    NameLookup,
    Constraints,
    MbrAmounts,
    AccountBalance,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::NumValidators => "num-validators",
            EntityKind::ValidatorConfig => "validator-config",
            EntityKind::ValidatorState => "validator-state",
            EntityKind::ValidatorPools => "validator-pools",
            EntityKind::NodePoolAssignments => "validator-node-pool-assignments",
            EntityKind::ValidatorMetrics => "validator-metrics",
            EntityKind::StakedInfo => "staked-info",
            EntityKind::Stakes => "stakes",
            EntityKind::Asset => "asset",
            EntityKind::NameRecord => "nfd",
            EntityKind::NameLookup => "nfd-lookup",
            EntityKind::Constraints => "constraints",
            EntityKind::MbrAmounts => "mbr",
            EntityKind::AccountBalance => "account-balance",
        }
    }
}

/// Identity of a cached read: entity kind, identifier and view parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    pub kind: EntityKind,
    pub id: String,
    pub view: Option<String>,
}

impl QueryKey {
    pub fn new(kind: EntityKind, id: impl ToString) -> Self {
        Self {
            kind,
            id: id.to_string(),
            view: None,
        }
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.view {
            Some(view) => write!(f, "{}/{}?{view}", self.kind.as_str(), self.id),
            None => write!(f, "{}/{}", self.kind.as_str(), self.id),
        }
    }
}

/// When a cached value stops being served as fresh and when it is re-read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// `None` keeps the value fresh until explicitly invalidated.
    pub stale_after: Option<Duration>,
    pub refetch_interval: Option<Duration>,
    pub refetch_on_resume: bool,
}

impl FreshnessPolicy {
    pub const NEVER_STALE: FreshnessPolicy = FreshnessPolicy {
        stale_after: None,
        refetch_interval: None,
        refetch_on_resume: false,
    };

    fn is_stale(&self, age: Duration) -> bool {
        self.stale_after.is_some_and(|limit| age >= limit)
    }
}

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
}

/// Last-known results keyed by [`QueryKey`], with per-kind freshness rules.
#[derive(Debug)]
pub struct QueryCache<V> {
    policies: CacheConfig,
    entries: RwLock<HashMap<QueryKey, CacheEntry<V>>>,
    resumed_at: RwLock<Option<Instant>>,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(policies: CacheConfig) -> Self {
        Self {
            policies,
            entries: RwLock::new(HashMap::new()),
            resumed_at: RwLock::new(None),
        }
    }

    pub fn policy(&self, kind: EntityKind) -> FreshnessPolicy {
        self.policies.policy_for(kind)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Last-known value regardless of age.
    pub fn get(&self, key: &QueryKey) -> Option<V> {
        self.entries.read().get(key).map(|entry| entry.value.clone())
    }

    /// Value only while its kind's policy still considers it fresh.
    pub fn get_fresh(&self, key: &QueryKey, now: Instant) -> Option<V> {
        let policy = self.policy(key.kind);
        self.entries.read().get(key).and_then(|entry| {
            let age = now.saturating_duration_since(entry.fetched_at);
            (!policy.is_stale(age)).then(|| entry.value.clone())
        })
    }

    pub fn insert(&self, key: QueryKey, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: QueryKey, value: V, fetched_at: Instant) {
        self.entries
            .write()
            .insert(key, CacheEntry { value, fetched_at });
    }

    pub fn invalidate(&self, key: &QueryKey) -> Option<V> {
        self.entries.write().remove(key).map(|entry| entry.value)
    }

    /// Drops every entry of `kind`, returning how many were removed.
    pub fn invalidate_kind(&self, kind: EntityKind) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key.kind != kind);
        before - entries.len()
    }

    /// Records that the consumer came back to the foreground.
    pub fn mark_resumed(&self) {
        *self.resumed_at.write() = Some(Instant::now());
    }

    /// Whether `key` should be read again at `now`.
    pub fn needs_refetch(&self, key: &QueryKey, now: Instant) -> bool {
        let policy = self.policy(key.kind);
        let entries = self.entries.read();
        let Some(entry) = entries.get(key) else {
            return true;
        };
        let age = now.saturating_duration_since(entry.fetched_at);
        if policy.is_stale(age) {
            return true;
        }
        if policy.refetch_interval.is_some_and(|interval| age >= interval) {
            return true;
        }
        policy.refetch_on_resume
            && self
                .resumed_at
                .read()
                .is_some_and(|resumed| resumed > entry.fetched_at)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V: Clone> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: EntityKind, id: u64) -> QueryKey {
        QueryKey::new(kind, id)
    }

    #[tokio::test(start_paused = true)]
    async fn config_entries_never_go_stale_but_refetch_every_two_hours() {
        let cache: QueryCache<u64> = QueryCache::default();
        let config_key = key(EntityKind::ValidatorConfig, 1);
        cache.insert(config_key.clone(), 7);

        tokio::time::advance(Duration::from_secs(3_600)).await;
        assert_eq!(cache.get_fresh(&config_key, Instant::now()), Some(7));
        assert!(!cache.needs_refetch(&config_key, Instant::now()));

        tokio::time::advance(Duration::from_secs(3_600)).await;
        assert_eq!(cache.get_fresh(&config_key, Instant::now()), Some(7));
        assert!(cache.needs_refetch(&config_key, Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn name_records_expire_after_five_minutes() {
        let cache: QueryCache<String> = QueryCache::default();
        let name_key = key(EntityKind::NameRecord, 99).with_view("full");
        cache.insert(name_key.clone(), "validator.algo".into());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get_fresh(&name_key, Instant::now()).is_some());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get_fresh(&name_key, Instant::now()).is_none());
        assert_eq!(cache.get(&name_key).as_deref(), Some("validator.algo"));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_triggers_refetch_only_for_opted_in_kinds() {
        let cache: QueryCache<u64> = QueryCache::default();
        let asset_key = key(EntityKind::Asset, 5);
        let constraints_key = key(EntityKind::Constraints, 0);
        cache.insert(asset_key.clone(), 1);
        cache.insert(constraints_key.clone(), 2);

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.mark_resumed();
        assert!(!cache.needs_refetch(&asset_key, Instant::now()));
        assert!(cache.needs_refetch(&constraints_key, Instant::now()));
    }

    #[test]
    fn invalidate_kind_leaves_other_kinds() {
        let cache: QueryCache<u64> = QueryCache::default();
        cache.insert(key(EntityKind::ValidatorState, 1), 1);
        cache.insert(key(EntityKind::ValidatorState, 2), 2);
        cache.insert(key(EntityKind::ValidatorPools, 1), 3);

        assert_eq!(cache.invalidate_kind(EntityKind::ValidatorState), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate(&key(EntityKind::ValidatorPools, 1)), Some(3));
        assert!(cache.is_empty());
        assert!(cache.needs_refetch(&key(EntityKind::ValidatorPools, 1), Instant::now()));
    }

    #[test]
    fn key_display_includes_view() {
        let plain = key(EntityKind::ValidatorConfig, 3);
        assert_eq!(plain.to_string(), "validator-config/3");
        assert_eq!(
            key(EntityKind::NameLookup, 1).with_view("tiny").to_string(),
            "nfd-lookup/1?tiny"
        );
    }
}
