use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::node_client::{NodeClientError, NodeClientResult};
use crate::types::{
    Address, AppId, Constraints, LocalPoolInfo, MbrAmounts, NodePoolAssignment, PoolGlobalState,
    PoolInfo, StakedInfo, ValidatorConfig, ValidatorId, ValidatorPoolKey, ValidatorState,
};

/// Read-only method calls against the staking registry and its pool programs.
#[async_trait]
pub trait RegistryReader: Send + Sync {
    async fn num_validators(&self) -> NodeClientResult<u64>;
    async fn validator_config(&self, id: ValidatorId) -> NodeClientResult<ValidatorConfig>;
    async fn validator_state(&self, id: ValidatorId) -> NodeClientResult<ValidatorState>;
    /// Pools in sequence order, with ledger addresses resolved.
    async fn validator_pools(&self, id: ValidatorId) -> NodeClientResult<Vec<LocalPoolInfo>>;
    async fn node_pool_assignments(&self, id: ValidatorId)
        -> NodeClientResult<NodePoolAssignment>;
    async fn mbr_amounts(&self) -> NodeClientResult<MbrAmounts>;
    async fn protocol_constraints(&self) -> NodeClientResult<Constraints>;
    /// Raw pool keys recorded for `staker`. May contain duplicates.
    async fn staked_pools_for_account(
        &self,
        staker: &Address,
    ) -> NodeClientResult<Vec<ValidatorPoolKey>>;
    async fn pool_info(&self, key: &ValidatorPoolKey) -> NodeClientResult<PoolInfo>;
    async fn staker_info(&self, pool_app_id: AppId, staker: &Address)
        -> NodeClientResult<StakedInfo>;
    /// Every slot of the pool's staker box, empty slots included.
    async fn pool_stakers(&self, pool_app_id: AppId) -> NodeClientResult<Vec<StakedInfo>>;
    async fn pool_global_state(&self, pool_app_id: AppId) -> NodeClientResult<PoolGlobalState>;
}

/// Registry reads the stub can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistryCall {
    Config,
    State,
    Pools,
    NodeAssignments,
    StakerInfo,
    PoolStakers,
    PoolGlobalState,
    MbrAmounts,
    Constraints,
}

/// Everything the stub knows about one validator.
#[derive(Clone, Debug, Default)]
pub struct StubValidator {
    pub config: ValidatorConfig,
    pub state: ValidatorState,
    pub pools: Vec<LocalPoolInfo>,
    pub assignment: NodePoolAssignment,
}

/// In-memory registry used in tests and local development harnesses.
#[derive(Debug, Default)]
pub struct StubRegistry {
    validators: HashMap<ValidatorId, StubValidator>,
    mbr: MbrAmounts,
    constraints: Constraints,
    staked_pools: HashMap<Address, Vec<ValidatorPoolKey>>,
    stakers: HashMap<AppId, Vec<StakedInfo>>,
    global_state: HashMap<AppId, PoolGlobalState>,
    failing: HashSet<(RegistryCall, u64)>,
    latency: Option<Duration>,
    call_delays: HashMap<RegistryCall, Vec<Duration>>,
    delay_cursor: Mutex<HashMap<RegistryCall, usize>>,
    completed: Mutex<Vec<RegistryCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl StubValidator {
    /// Builds a validator whose pools are hosted one per node.
    pub fn new(id: ValidatorId, pools: Vec<LocalPoolInfo>) -> Self {
        let total_algo_staked = pools.iter().map(|pool| pool.total_algo_staked).sum();
        let total_stakers = pools.iter().map(|pool| pool.total_stakers).sum();
        let assignment = NodePoolAssignment {
            nodes: pools.iter().map(|pool| vec![pool.pool_app_id, 0, 0]).collect(),
        };
        Self {
            config: ValidatorConfig {
                id,
                owner: Address::new(format!("OWNER{id}")),
                manager: Address::new(format!("MANAGER{id}")),
                pools_per_node: 3,
                ..ValidatorConfig::default()
            },
            state: ValidatorState {
                num_pools: u16::try_from(pools.len()).unwrap_or(u16::MAX),
                total_stakers,
                total_algo_staked,
                reward_token_held_back: 0,
            },
            pools,
            assignment,
        }
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(mut self, validator: StubValidator) -> Self {
        self.validators.insert(validator.config.id, validator);
        self
    }

    pub fn with_mbr_amounts(mut self, mbr: MbrAmounts) -> Self {
        self.mbr = mbr;
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_staked_pools(mut self, staker: impl Into<Address>, keys: Vec<ValidatorPoolKey>) -> Self {
        self.staked_pools.insert(staker.into(), keys);
        self
    }

    pub fn with_stakers(mut self, pool_app_id: AppId, stakers: Vec<StakedInfo>) -> Self {
        self.stakers.insert(pool_app_id, stakers);
        self
    }

    pub fn with_global_state(mut self, pool_app_id: AppId, state: PoolGlobalState) -> Self {
        self.global_state.insert(pool_app_id, state);
        self
    }

    /// `call` fails with a transport error for validator or pool app `id`.
    pub fn with_failure(mut self, call: RegistryCall, id: u64) -> Self {
        self.failing.insert((call, id));
        self
    }

    /// Per-pool reads sleep for `latency`, so tests can observe overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Successive `call` reads sleep for successive entries of `delays`,
    /// wrapping around, so completion order can change between cycles.
    pub fn with_call_delays(mut self, call: RegistryCall, delays: Vec<Duration>) -> Self {
        self.call_delays.insert(call, delays);
        self
    }

    /// Core validator reads in the order they finished.
    pub fn completion_order(&self) -> Vec<RegistryCall> {
        self.completed.lock().clone()
    }

    /// Highest number of per-pool reads observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn check(&self, call: RegistryCall, id: u64) -> NodeClientResult<()> {
        self.calls.lock().push(format!("{call:?}:{id}"));
        if self.failing.contains(&(call, id)) {
            return Err(NodeClientError::transport(anyhow::anyhow!(
                "registry read {call:?} failed for {id}"
            )));
        }
        Ok(())
    }

    fn validator(&self, id: ValidatorId) -> NodeClientResult<&StubValidator> {
        self.validators
            .get(&id)
            .ok_or_else(|| NodeClientError::not_found(format!("validator {id}")))
    }

    async fn settle(&self, call: RegistryCall) {
        let delay = self
            .call_delays
            .get(&call)
            .filter(|delays| !delays.is_empty())
            .map(|delays| {
                let mut cursor = self.delay_cursor.lock();
                let slot = cursor.entry(call).or_insert(0);
                let delay = delays[*slot % delays.len()];
                *slot += 1;
                delay
            });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.lock().push(call);
    }

    async fn pool_read<T>(&self, read: impl FnOnce() -> NodeClientResult<T>) -> NodeClientResult<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = read();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl RegistryReader for StubRegistry {
    async fn num_validators(&self) -> NodeClientResult<u64> {
        Ok(self.validators.keys().copied().max().unwrap_or(0))
    }

    async fn validator_config(&self, id: ValidatorId) -> NodeClientResult<ValidatorConfig> {
        self.check(RegistryCall::Config, id)?;
        self.settle(RegistryCall::Config).await;
        Ok(self.validator(id)?.config.clone())
    }

    async fn validator_state(&self, id: ValidatorId) -> NodeClientResult<ValidatorState> {
        self.check(RegistryCall::State, id)?;
        self.settle(RegistryCall::State).await;
        Ok(self.validator(id)?.state.clone())
    }

    async fn validator_pools(&self, id: ValidatorId) -> NodeClientResult<Vec<LocalPoolInfo>> {
        self.check(RegistryCall::Pools, id)?;
        self.settle(RegistryCall::Pools).await;
        Ok(self.validator(id)?.pools.clone())
    }

    async fn node_pool_assignments(
        &self,
        id: ValidatorId,
    ) -> NodeClientResult<NodePoolAssignment> {
        self.check(RegistryCall::NodeAssignments, id)?;
        self.settle(RegistryCall::NodeAssignments).await;
        Ok(self.validator(id)?.assignment.clone())
    }

    async fn mbr_amounts(&self) -> NodeClientResult<MbrAmounts> {
        self.check(RegistryCall::MbrAmounts, 0)?;
        Ok(self.mbr.clone())
    }

    async fn protocol_constraints(&self) -> NodeClientResult<Constraints> {
        self.check(RegistryCall::Constraints, 0)?;
        Ok(self.constraints.clone())
    }

    async fn staked_pools_for_account(
        &self,
        staker: &Address,
    ) -> NodeClientResult<Vec<ValidatorPoolKey>> {
        Ok(self.staked_pools.get(staker).cloned().unwrap_or_default())
    }

    async fn pool_info(&self, key: &ValidatorPoolKey) -> NodeClientResult<PoolInfo> {
        let validator = self.validator(key.id)?;
        validator
            .pools
            .iter()
            .find(|pool| pool.pool_app_id == key.pool_app_id)
            .map(|pool| PoolInfo {
                pool_app_id: pool.pool_app_id,
                total_stakers: u16::try_from(pool.total_stakers).unwrap_or(u16::MAX),
                total_algo_staked: pool.total_algo_staked,
            })
            .ok_or_else(|| NodeClientError::not_found(format!("pool {key}")))
    }

    async fn staker_info(
        &self,
        pool_app_id: AppId,
        staker: &Address,
    ) -> NodeClientResult<StakedInfo> {
        self.check(RegistryCall::StakerInfo, pool_app_id)?;
        self.pool_read(|| {
            self.stakers
                .get(&pool_app_id)
                .and_then(|slots| slots.iter().find(|slot| &slot.account == staker))
                .cloned()
                .ok_or_else(|| {
                    NodeClientError::not_found(format!("staker {staker} in pool {pool_app_id}"))
                })
        })
        .await
    }

    async fn pool_stakers(&self, pool_app_id: AppId) -> NodeClientResult<Vec<StakedInfo>> {
        self.check(RegistryCall::PoolStakers, pool_app_id)?;
        self.pool_read(|| Ok(self.stakers.get(&pool_app_id).cloned().unwrap_or_default()))
            .await
    }

    async fn pool_global_state(&self, pool_app_id: AppId) -> NodeClientResult<PoolGlobalState> {
        self.check(RegistryCall::PoolGlobalState, pool_app_id)?;
        Ok(self
            .global_state
            .get(&pool_app_id)
            .cloned()
            .unwrap_or_default())
    }
}
