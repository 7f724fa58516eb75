use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::actions::{Action, ActionLayout, FeePlan, INNER_CALL_EXTRA_FEE};
use super::balance::BalanceGuard;
use super::executor::GroupExecutor;
use super::fees::derive_extra_fee;
use super::group::{
    AppTarget, MethodArg, MethodReturn, OpKind, OpRole, PlannedOp, PoolPlacement,
    SimulateOptions, SubmitOptions, SubmitResult, TransactionGroup,
};
use super::signer::TransactionSigner;
use crate::errors::{EngineError, EngineResult};
use crate::node_client::LedgerReader;
use crate::protocol::ProtocolParams;
use crate::types::{Address, MbrAmounts, MicroAlgos, ValidatorId, ValidatorPoolKey};

/// Progress of one action. `Committed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionPhase {
    Built,
    Simulated,
    FeeDerived,
    BalanceChecked,
    Committed,
    Failed,
}

impl ActionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionPhase::Built => "built",
            ActionPhase::Simulated => "simulated",
            ActionPhase::FeeDerived => "fee-derived",
            ActionPhase::BalanceChecked => "balance-checked",
            ActionPhase::Committed => "committed",
            ActionPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionPhase::Committed | ActionPhase::Failed)
    }
}

impl fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a committed action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub extra_fee: MicroAlgos,
    pub required_balance: MicroAlgos,
    pub submission: SubmitResult,
    /// Method return at the action's result index, when it has one.
    pub value: Option<MethodReturn>,
}

impl ActionOutcome {
    pub fn pool_key(&self) -> Option<ValidatorPoolKey> {
        match self.value {
            Some(MethodReturn::PoolKey(key)) => Some(key),
            _ => None,
        }
    }

    pub fn validator_id(&self) -> Option<ValidatorId> {
        match self.value {
            Some(MethodReturn::U64(id)) => Some(id),
            _ => None,
        }
    }
}

/// Phase trail plus the final result of one run.
#[derive(Debug)]
pub struct ActionReport {
    pub trail: Vec<ActionPhase>,
    pub result: EngineResult<ActionOutcome>,
}

impl ActionReport {
    pub fn phase(&self) -> ActionPhase {
        self.trail.last().copied().unwrap_or(ActionPhase::Built)
    }

    pub fn into_result(self) -> EngineResult<ActionOutcome> {
        self.result
    }
}

/// Builds, prices, checks and submits action groups.
#[derive(Clone)]
pub struct TransactionComposer {
    ledger: Arc<dyn LedgerReader>,
    executor: Arc<dyn GroupExecutor>,
    registry: AppTarget,
    params: Arc<ProtocolParams>,
}

impl TransactionComposer {
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        executor: Arc<dyn GroupExecutor>,
        registry: AppTarget,
        params: Arc<ProtocolParams>,
    ) -> Self {
        Self {
            ledger,
            executor,
            registry,
            params,
        }
    }

    pub fn registry(&self) -> &AppTarget {
        &self.registry
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Starts an action at [`ActionPhase::Built`]. Actions that fund registry
    /// storage read the cached MBR amounts first.
    pub async fn prepare(&self, action: &Action, sender: Address) -> EngineResult<ActionExecution<'_>> {
        let mbr = if action.requires_mbr() {
            self.params.fetch_mbr_amounts().await?
        } else {
            MbrAmounts::default()
        };
        let layout = action.layout(&self.registry, &mbr);
        debug!(action = layout.label, %sender, ops = layout.ops.len(), "action built");
        Ok(ActionExecution {
            composer: self,
            layout,
            sender,
            trail: vec![ActionPhase::Built],
        })
    }

    /// Runs an action end to end for the signer's account.
    pub async fn execute(
        &self,
        action: &Action,
        signer: &dyn TransactionSigner,
    ) -> EngineResult<ActionOutcome> {
        self.prepare(action, signer.address().clone())
            .await?
            .run(signer)
            .await
            .into_result()
    }

    /// Dry-runs the registry's pool search for a prospective stake.
    pub async fn find_pool_for_staker(
        &self,
        validator_id: ValidatorId,
        staker: &Address,
        amount: MicroAlgos,
    ) -> EngineResult<PoolPlacement> {
        let registry_id = self.registry.app_id;
        let group = TransactionGroup::for_commit(
            staker,
            &[
                PlannedOp::new(OpRole::Standard, OpKind::gas(registry_id)),
                PlannedOp::new(
                    OpRole::FeeCarrier,
                    OpKind::call(
                        registry_id,
                        "findPoolForStaker",
                        vec![
                            MethodArg::U64(validator_id),
                            MethodArg::Address(staker.clone()),
                            MethodArg::U64(amount),
                        ],
                    ),
                ),
            ],
            INNER_CALL_EXTRA_FEE,
        )?;
        let result = self.executor.simulate(&group, SimulateOptions::relaxed()).await?;
        match (result.failure_message.as_deref(), result.return_at(1)) {
            (None, Some(MethodReturn::Placement(placement))) => Ok(*placement),
            (Some(message), _) => Err(EngineError::simulation_failed(format!(
                "finding pool for staker: {message}"
            ))),
            (None, _) => Err(EngineError::simulation_failed(
                "finding pool for staker: no pool found",
            )),
        }
    }

    /// Whether a first stake from `staker` must also cover the staker MBR.
    pub async fn does_staker_need_to_pay_mbr(&self, staker: &Address) -> EngineResult<bool> {
        let group = TransactionGroup::for_commit(
            staker,
            &[PlannedOp::new(
                OpRole::Standard,
                OpKind::call(
                    self.registry.app_id,
                    "doesStakerNeedToPayMbr",
                    vec![MethodArg::Address(staker.clone())],
                ),
            )],
            0,
        )?;
        let result = self.executor.simulate(&group, SimulateOptions::relaxed()).await?;
        if let Some(message) = result.failure_message.as_deref() {
            return Err(EngineError::simulation_failed(message));
        }
        match result.return_at(0) {
            Some(MethodReturn::Bool(needs)) => Ok(*needs),
            _ => Err(EngineError::simulation_failed(
                "checking whether staker needs to pay MBR: no return value",
            )),
        }
    }
}

/// One pass through the phase machine. Consumed by [`ActionExecution::run`],
/// so a failed action cannot be resumed.
pub struct ActionExecution<'a> {
    composer: &'a TransactionComposer,
    layout: ActionLayout,
    sender: Address,
    trail: Vec<ActionPhase>,
}

impl ActionExecution<'_> {
    pub fn layout(&self) -> &ActionLayout {
        &self.layout
    }

    pub fn phase(&self) -> ActionPhase {
        self.trail.last().copied().unwrap_or(ActionPhase::Built)
    }

    pub async fn run(mut self, signer: &dyn TransactionSigner) -> ActionReport {
        let result = self.drive(signer).await;
        if let Err(err) = &result {
            warn!(
                action = self.layout.label,
                phase = %self.phase(),
                error = %err,
                "action failed"
            );
            self.trail.push(ActionPhase::Failed);
        }
        ActionReport {
            trail: self.trail,
            result,
        }
    }

    fn advance(&mut self, phase: ActionPhase) {
        debug!(action = self.layout.label, from = %self.phase(), to = %phase, "action phase");
        self.trail.push(phase);
    }

    async fn drive(&mut self, signer: &dyn TransactionSigner) -> EngineResult<ActionOutcome> {
        let composer = self.composer;
        if self.layout.ops.is_empty() {
            return Err(EngineError::not_found(format!(
                "operations for {}",
                self.layout.label
            )));
        }
        if let Some(asset_id) = self.layout.opt_in_asset {
            let opted_in = composer.ledger.is_opted_in(&self.sender, asset_id).await?;
            if !opted_in {
                debug!(action = self.layout.label, asset_id, "appending reward token opt-in");
                self.layout.ops.push(PlannedOp::new(
                    OpRole::Standard,
                    OpKind::AssetOptIn { asset_id },
                ));
            }
        }

        let extra_fee = match self.layout.fee_plan {
            FeePlan::Simulated { padding_credit } => {
                let group = TransactionGroup::for_simulation(&self.sender, &self.layout.ops);
                let simulated = composer
                    .executor
                    .simulate(&group, SimulateOptions::relaxed())
                    .await?;
                if let Some(message) = simulated.failure_message {
                    return Err(EngineError::SimulationFailed { message });
                }
                self.advance(ActionPhase::Simulated);
                let extra_fee = derive_extra_fee(simulated.app_budget_added, padding_credit)?;
                debug!(
                    action = self.layout.label,
                    budget = simulated.app_budget_added,
                    padding_credit,
                    extra_fee,
                    "derived extra fee"
                );
                extra_fee
            }
            FeePlan::Fixed(extra_fee) => extra_fee,
        };
        self.advance(ActionPhase::FeeDerived);

        let group = TransactionGroup::for_commit(&self.sender, &self.layout.ops, extra_fee)?;
        let required_balance = group.required_balance()?;
        BalanceGuard::new(composer.ledger.as_ref())
            .check(&self.sender, required_balance, self.layout.label)
            .await?;
        self.advance(ActionPhase::BalanceChecked);

        let signed = signer.sign(&group).await?;
        let submission = composer
            .executor
            .submit(&signed, SubmitOptions::default())
            .await?;
        self.advance(ActionPhase::Committed);

        let value = match self.layout.result_index {
            Some(index) => Some(submission.return_at(index).cloned().ok_or_else(|| {
                EngineError::not_found(format!(
                    "return value {index} of {}",
                    self.layout.label
                ))
            })?),
            None => None,
        };
        info!(
            action = self.layout.label,
            sender = %self.sender,
            extra_fee,
            required_balance,
            round = submission.confirmed_round,
            "action committed"
        );
        Ok(ActionOutcome {
            extra_fee,
            required_balance,
            submission,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::executor::StubExecutor;
    use crate::engine::signer::{SignerError, StubSigner};
    use crate::config::CacheConfig;
    use crate::node_client::StubLedger;
    use crate::registry::{RegistryCall, StubRegistry};

    fn mbr() -> MbrAmounts {
        MbrAmounts {
            add_validator_mbr: 1_000_000,
            add_pool_mbr: 1_100_000,
            pool_init_mbr: 341_000,
            add_staker_mbr: 34_100,
        }
    }

    fn composer_with(
        ledger: StubLedger,
        executor: Arc<StubExecutor>,
        registry: Arc<StubRegistry>,
    ) -> TransactionComposer {
        let params = Arc::new(ProtocolParams::new(registry, &CacheConfig::default()));
        TransactionComposer::new(Arc::new(ledger), executor, AppTarget::new(1, "REGISTRY"), params)
    }

    fn composer(ledger: StubLedger, executor: Arc<StubExecutor>) -> TransactionComposer {
        composer_with(ledger, executor, Arc::new(StubRegistry::new().with_mbr_amounts(mbr())))
    }

    fn funded() -> StubLedger {
        StubLedger::new().with_account("ALICE", 100_000_000, 100_000)
    }

    #[tokio::test]
    async fn epoch_update_walks_every_phase() {
        let executor = Arc::new(StubExecutor::new().with_budget(1_400));
        let composer = composer(funded(), Arc::clone(&executor));
        let signer = StubSigner::new("ALICE");

        let report = composer
            .prepare(&Action::EpochBalanceUpdate { pool_app_id: 100 }, Address::new("ALICE"))
            .await
            .expect("built")
            .run(&signer)
            .await;
        assert_eq!(
            report.trail,
            vec![
                ActionPhase::Built,
                ActionPhase::Simulated,
                ActionPhase::FeeDerived,
                ActionPhase::BalanceChecked,
                ActionPhase::Committed,
            ]
        );
        let outcome = report.into_result().expect("committed");
        assert_eq!(outcome.extra_fee, 1_000);
        assert_eq!(outcome.required_balance, 4_000);

        let (simulated, options) = &executor.simulated()[0];
        assert_eq!(*options, SimulateOptions::relaxed());
        assert_eq!(
            simulated.ops.iter().map(|op| op.fee).collect::<Vec<_>>(),
            vec![0, 0, 240_000]
        );
        let (submitted, options) = &executor.submitted()[0];
        assert!(options.populate_resources);
        assert_eq!(
            submitted.group.ops.iter().map(|op| op.fee).collect::<Vec<_>>(),
            vec![1_000, 1_000, 2_000]
        );
    }

    #[tokio::test]
    async fn add_stake_appends_opt_in_to_both_groups() {
        let key = ValidatorPoolKey::new(4, 1, 100);
        let executor = Arc::new(
            StubExecutor::new()
                .with_budget(2_100)
                .with_submit_return(2, MethodReturn::PoolKey(key)),
        );
        let composer = composer(funded(), Arc::clone(&executor));
        let signer = StubSigner::new("ALICE");

        let outcome = composer
            .execute(
                &Action::AddStake {
                    validator_id: 4,
                    amount: 5_000_000,
                    value_to_verify: 0,
                    reward_token_id: 77,
                },
                &signer,
            )
            .await
            .expect("staked");
        assert_eq!(outcome.pool_key(), Some(key));
        // ceil((2100 + 699) / 700) * 1000 - 1000
        assert_eq!(outcome.extra_fee, 3_000);
        // payment + five floors + extra
        assert_eq!(outcome.required_balance, 5_000_000 + 5_000 + 3_000);

        let opt_in = OpKind::AssetOptIn { asset_id: 77 };
        assert_eq!(executor.simulated()[0].0.ops.last().map(|op| &op.kind), Some(&opt_in));
        assert_eq!(executor.submitted()[0].0.group.ops.last().map(|op| &op.kind), Some(&opt_in));
    }

    #[tokio::test]
    async fn opted_in_staker_gets_no_opt_in_op() {
        let executor = Arc::new(
            StubExecutor::new()
                .with_budget(700)
                .with_submit_return(2, MethodReturn::PoolKey(ValidatorPoolKey::new(4, 1, 100))),
        );
        let ledger = funded().with_holding("ALICE", 77, 0);
        let composer = composer(ledger, Arc::clone(&executor));

        composer
            .execute(
                &Action::AddStake {
                    validator_id: 4,
                    amount: 1_000_000,
                    value_to_verify: 0,
                    reward_token_id: 77,
                },
                &StubSigner::new("ALICE"),
            )
            .await
            .expect("staked");
        assert_eq!(executor.simulated()[0].0.len(), 4);
    }

    #[tokio::test]
    async fn simulation_failure_aborts_before_signing() {
        let executor = Arc::new(StubExecutor::new().with_failure_message("logic eval error: assert failed pc=812"));
        let composer = composer(funded(), Arc::clone(&executor));
        let signer = StubSigner::new("ALICE");

        let report = composer
            .prepare(
                &Action::RemoveStake {
                    pool_app_id: 100,
                    amount: 1_000,
                    reward_token_id: 0,
                },
                Address::new("ALICE"),
            )
            .await
            .expect("built")
            .run(&signer)
            .await;
        assert_eq!(report.trail, vec![ActionPhase::Built, ActionPhase::Failed]);
        assert_eq!(report.phase(), ActionPhase::Failed);
        match report.into_result() {
            Err(EngineError::SimulationFailed { message }) => {
                assert_eq!(message, "logic eval error: assert failed pc=812");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(signer.signed().is_empty());
        assert!(executor.submitted().is_empty());
    }

    #[tokio::test]
    async fn short_balance_stops_before_signing() {
        let executor = Arc::new(StubExecutor::new().with_budget(1_400));
        let ledger = StubLedger::new().with_account("ALICE", 102_000, 100_000);
        let composer = composer(ledger, Arc::clone(&executor));
        let signer = StubSigner::new("ALICE");

        let report = composer
            .prepare(&Action::EpochBalanceUpdate { pool_app_id: 100 }, Address::new("ALICE"))
            .await
            .expect("built")
            .run(&signer)
            .await;
        assert_eq!(
            report.trail,
            vec![
                ActionPhase::Built,
                ActionPhase::Simulated,
                ActionPhase::FeeDerived,
                ActionPhase::Failed,
            ]
        );
        assert!(matches!(
            report.result,
            Err(EngineError::InsufficientBalance { shortfall: 2_000, .. })
        ));
        assert!(signer.signed().is_empty());
    }

    #[tokio::test]
    async fn fixed_fee_actions_skip_simulation() {
        let executor = Arc::new(StubExecutor::new().with_submit_return(0, MethodReturn::U64(12)));
        let composer = composer(
            StubLedger::new().with_account("ALICE", 20_000_000, 100_000),
            Arc::clone(&executor),
        );
        let signer = StubSigner::new("ALICE");

        let report = composer
            .prepare(
                &Action::AddValidator {
                    config: Box::default(),
                    nfd_name: String::new(),
                },
                Address::new("ALICE"),
            )
            .await
            .expect("built")
            .run(&signer)
            .await;
        assert_eq!(
            report.trail,
            vec![
                ActionPhase::Built,
                ActionPhase::FeeDerived,
                ActionPhase::BalanceChecked,
                ActionPhase::Committed,
            ]
        );
        let outcome = report.into_result().expect("registered");
        assert_eq!(outcome.validator_id(), Some(12));
        assert_eq!(outcome.required_balance, 1_000_000 + 10_001_000 + 1_000);
        assert!(executor.simulated().is_empty());
    }

    #[tokio::test]
    async fn pool_creation_pays_the_cached_registry_mbr() {
        let key = ValidatorPoolKey::new(3, 2, 400);
        let registry = Arc::new(StubRegistry::new().with_mbr_amounts(mbr()));
        let executor = Arc::new(StubExecutor::new().with_submit_return(2, MethodReturn::PoolKey(key)));
        let composer = composer_with(funded(), Arc::clone(&executor), Arc::clone(&registry));
        let signer = StubSigner::new("ALICE");
        let action = Action::AddPool {
            validator_id: 3,
            node_num: 1,
        };

        for _ in 0..2 {
            let outcome = composer.execute(&action, &signer).await.expect("pool added");
            assert_eq!(outcome.pool_key(), Some(key));
            // payment + four floors + fixed inner-call fee
            assert_eq!(outcome.required_balance, 1_100_000 + 4_000 + 1_000);
        }
        let mbr_reads = registry
            .calls()
            .iter()
            .filter(|call| call.starts_with("MbrAmounts:"))
            .count();
        assert_eq!(mbr_reads, 1);
        let (submitted, _) = &executor.submitted()[1];
        assert_eq!(submitted.group.total_payments(), Ok(1_100_000));
    }

    #[tokio::test]
    async fn unreadable_mbr_stops_before_building() {
        let registry = Arc::new(
            StubRegistry::new()
                .with_mbr_amounts(mbr())
                .with_failure(RegistryCall::MbrAmounts, 0),
        );
        let executor = Arc::new(StubExecutor::new());
        let composer = composer_with(funded(), Arc::clone(&executor), registry);

        let result = composer
            .prepare(
                &Action::AddPool {
                    validator_id: 3,
                    node_num: 1,
                },
                Address::new("ALICE"),
            )
            .await;
        assert!(matches!(result, Err(EngineError::RemoteUnavailable(_))));
        assert!(executor.submitted().is_empty());
    }

    #[tokio::test]
    async fn rejected_signature_fails_after_balance_check() {
        let executor = Arc::new(StubExecutor::new());
        let composer = composer(funded(), Arc::clone(&executor));

        let report = composer
            .prepare(
                &Action::ChangeManager {
                    validator_id: 3,
                    manager: Address::new("BOB"),
                },
                Address::new("ALICE"),
            )
            .await
            .expect("built")
            .run(&StubSigner::new("ALICE").rejecting())
            .await;
        assert_eq!(report.phase(), ActionPhase::Failed);
        assert!(report.trail.contains(&ActionPhase::BalanceChecked));
        assert!(matches!(
            report.result,
            Err(EngineError::Signer(SignerError::Rejected(_)))
        ));
        assert!(executor.submitted().is_empty());
    }

    #[tokio::test]
    async fn find_pool_reads_second_return() {
        let placement = PoolPlacement {
            pool_key: ValidatorPoolKey::new(2, 1, 300),
            is_new_staker_to_validator: true,
            is_new_staker_to_protocol: false,
        };
        let executor = Arc::new(StubExecutor::new().with_simulate_return(1, MethodReturn::Placement(placement)));
        let composer = composer(funded(), Arc::clone(&executor));

        let found = composer
            .find_pool_for_staker(2, &Address::new("ALICE"), 1_000_000)
            .await
            .expect("placement");
        assert_eq!(found, placement);
        let fees: Vec<_> = executor.simulated()[0].0.ops.iter().map(|op| op.fee).collect();
        assert_eq!(fees, vec![1_000, 2_000]);
    }

    #[tokio::test]
    async fn find_pool_without_return_is_a_simulation_failure() {
        let composer = composer(funded(), Arc::new(StubExecutor::new()));
        let err = composer
            .find_pool_for_staker(2, &Address::new("ALICE"), 1_000_000)
            .await
            .expect_err("no pool");
        assert_eq!(
            err.to_string(),
            "simulation failed: finding pool for staker: no pool found"
        );
    }

    #[tokio::test]
    async fn mbr_check_reads_boolean_return() {
        let executor = Arc::new(StubExecutor::new().with_simulate_return(0, MethodReturn::Bool(true)));
        let composer = composer(funded(), executor);
        assert!(composer
            .does_staker_need_to_pay_mbr(&Address::new("ALICE"))
            .await
            .expect("answer"));

        let composer = self::composer(funded(), Arc::new(StubExecutor::new()));
        assert!(matches!(
            composer.does_staker_need_to_pay_mbr(&Address::new("ALICE")).await,
            Err(EngineError::SimulationFailed { .. })
        ));
    }
}
