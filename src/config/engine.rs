use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigResult};
use crate::cache::{EntityKind, FreshnessPolicy};

const DEFAULT_ALGOD_URL: &str = "http://localhost:4001";
const DEFAULT_ALGOD_TIMEOUT_SECS: u64 = 15;
const DEFAULT_NFD_URL: &str = "https://api.nf.domains";
const DEFAULT_NFD_APP_URL: &str = "https://app.nf.domains";
const DEFAULT_NFD_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EXPLORER_ACCOUNT_URL: &str = "https://allo.info/account";
const DEFAULT_BATCH_SIZE: usize = 8;
const DEFAULT_BATCH_INTERVAL_MS: u64 = 1_000;
const MIN_BATCH_INTERVAL_MS: u64 = 50;
const DEFAULT_METRICS_BATCH_SIZE: usize = 4;
const DEFAULT_STAKER_POOL_BATCH_SIZE: usize = 10;
const DEFAULT_HEALTH_WATCH_ROUNDS: u64 = 21;
const DEFAULT_HEALTH_WARNING_ROUNDS: u64 = 210;
const DEFAULT_HEALTH_ERROR_ROUNDS: u64 = 1_200;
const DEFAULT_LOG_FILTER: &str = "info";

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;

/// Top-level configuration consumed by the engine and its remote readers.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub node: NodeConfig,
    pub name_service: NameServiceConfig,
    pub explorer: ExplorerConfig,
    pub scheduler: SchedulerConfig,
    pub staker: StakerConfig,
    pub cache: CacheConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|err| ConfigError::Parse(format!("unable to parse config: {err}")))?;
        Ok(config.sanitized())
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| ConfigError::Parse(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    /// Returns a sanitized copy that clamps out-of-range values.
    pub fn sanitized(mut self) -> Self {
        self.scheduler = self.scheduler.sanitized();
        self.staker = self.staker.sanitized();
        self.health = self.health.sanitized();
        self
    }

    /// Rejects values that cannot be clamped into something usable.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.node.algod_url.trim().is_empty() {
            return Err(ConfigError::Invalid("node.algod_url must not be empty".into()));
        }
        if self.name_service.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "name_service.api_url must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Ledger node REST endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    pub algod_url: String,
    /// Sent as `X-Algo-API-Token` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algod_token: Option<String>,
    pub timeout_secs: u64,
}

impl NodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            algod_url: DEFAULT_ALGOD_URL.to_string(),
            algod_token: None,
            timeout_secs: DEFAULT_ALGOD_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NameServiceConfig {
    pub api_url: String,
    /// Base of the public profile page, `{app_url}/name/{name}`.
    pub app_url: String,
    pub timeout_secs: u64,
}

impl NameServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn profile_url(&self, name: &str) -> String {
        format!("{}/name/{name}", self.app_url.trim_end_matches('/'))
    }
}

impl Default for NameServiceConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_NFD_URL.to_string(),
            app_url: DEFAULT_NFD_APP_URL.to_string(),
            timeout_secs: DEFAULT_NFD_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExplorerConfig {
    pub account_url: String,
}

impl ExplorerConfig {
    pub fn account_link(&self, account: &str) -> String {
        format!("{}/{account}", self.account_url.trim_end_matches('/'))
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            account_url: DEFAULT_EXPLORER_ACCOUNT_URL.to_string(),
        }
    }
}

/// Wave sizing for the query scheduler.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Uncached items released per wave.
    pub batch_size: usize,
    pub batch_interval_ms: u64,
    /// Wave size used for validator metrics, which fan out further per pool.
    pub metrics_batch_size: usize,
}

impl SchedulerConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.metrics_batch_size == 0 {
            self.metrics_batch_size = DEFAULT_METRICS_BATCH_SIZE;
        }
        if self.batch_interval_ms < MIN_BATCH_INTERVAL_MS {
            self.batch_interval_ms = MIN_BATCH_INTERVAL_MS;
        }
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval_ms: DEFAULT_BATCH_INTERVAL_MS,
            metrics_batch_size: DEFAULT_METRICS_BATCH_SIZE,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StakerConfig {
    /// Pools queried concurrently while aggregating one account's stakes.
    pub pool_batch_size: usize,
}

impl StakerConfig {
    pub fn sanitized(mut self) -> Self {
        if self.pool_batch_size == 0 {
            self.pool_batch_size = DEFAULT_STAKER_POOL_BATCH_SIZE;
        }
        self
    }
}

impl Default for StakerConfig {
    fn default() -> Self {
        Self {
            pool_batch_size: DEFAULT_STAKER_POOL_BATCH_SIZE,
        }
    }
}

/// Serialized form of a [`FreshnessPolicy`]; absent durations mean "never".
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FreshnessConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refetch_interval_secs: Option<u64>,
    pub refetch_on_resume: bool,
}

impl FreshnessConfig {
    fn new(stale_after: Option<u64>, refetch_interval: Option<u64>, on_resume: bool) -> Self {
        Self {
            stale_after_secs: stale_after,
            refetch_interval_secs: refetch_interval,
            refetch_on_resume: on_resume,
        }
    }

    pub fn policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            stale_after: self.stale_after_secs.map(Duration::from_secs),
            refetch_interval: self.refetch_interval_secs.map(Duration::from_secs),
            refetch_on_resume: self.refetch_on_resume,
        }
    }
}

/// Per-entity freshness policies.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub num_validators: FreshnessConfig,
    pub validator_config: FreshnessConfig,
    pub validator_state: FreshnessConfig,
    pub validator_pools: FreshnessConfig,
    pub node_pool_assignments: FreshnessConfig,
    pub validator_metrics: FreshnessConfig,
    pub staked_info: FreshnessConfig,
    pub stakes: FreshnessConfig,
    pub assets: FreshnessConfig,
    pub name_records: FreshnessConfig,
    pub constraints: FreshnessConfig,
    pub mbr_amounts: FreshnessConfig,
    pub balances: FreshnessConfig,
}

impl CacheConfig {
    pub fn policy_for(&self, kind: EntityKind) -> FreshnessPolicy {
        let entry = match kind {
            EntityKind::NumValidators => &self.num_validators,
            EntityKind::ValidatorConfig => &self.validator_config,
            EntityKind::ValidatorState => &self.validator_state,
            EntityKind::ValidatorPools => &self.validator_pools,
            EntityKind::NodePoolAssignments => &self.node_pool_assignments,
            EntityKind::ValidatorMetrics => &self.validator_metrics,
            EntityKind::StakedInfo => &self.staked_info,
            EntityKind::Stakes => &self.stakes,
            EntityKind::Asset => &self.assets,
            EntityKind::NameRecord | EntityKind::NameLookup => &self.name_records,
            EntityKind::Constraints => &self.constraints,
            EntityKind::MbrAmounts => &self.mbr_amounts,
            EntityKind::AccountBalance => &self.balances,
        };
        entry.policy()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let rarely = FreshnessConfig::new(None, Some(2 * SECS_PER_HOUR), false);
        let polled = FreshnessConfig::new(Some(0), Some(30), true);
        Self {
            num_validators: FreshnessConfig::new(Some(SECS_PER_MINUTE), None, true),
            validator_config: rarely.clone(),
            validator_state: polled.clone(),
            validator_pools: polled,
            node_pool_assignments: rarely,
            validator_metrics: FreshnessConfig::new(Some(30), None, false),
            staked_info: FreshnessConfig::new(Some(0), None, true),
            stakes: FreshnessConfig::new(Some(0), Some(SECS_PER_MINUTE), true),
            assets: FreshnessConfig::new(None, None, false),
            name_records: FreshnessConfig::new(Some(5 * SECS_PER_MINUTE), None, false),
            constraints: FreshnessConfig::new(Some(SECS_PER_HOUR), None, true),
            mbr_amounts: FreshnessConfig::new(None, None, false),
            balances: FreshnessConfig::new(Some(0), Some(30), true),
        }
    }
}

/// Rounds without a payout before a validator is flagged.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthConfig {
    pub watch_after_rounds: u64,
    pub warning_after_rounds: u64,
    pub error_after_rounds: u64,
}

impl HealthConfig {
    /// Thresholds must be strictly increasing; otherwise defaults are restored.
    pub fn sanitized(self) -> Self {
        let ordered = self.watch_after_rounds > 0
            && self.watch_after_rounds < self.warning_after_rounds
            && self.warning_after_rounds < self.error_after_rounds;
        if ordered {
            self
        } else {
            Self::default()
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            watch_after_rounds: DEFAULT_HEALTH_WATCH_ROUNDS,
            warning_after_rounds: DEFAULT_HEALTH_WARNING_ROUNDS,
            error_after_rounds: DEFAULT_HEALTH_ERROR_ROUNDS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            with_target: false,
        }
    }
}
