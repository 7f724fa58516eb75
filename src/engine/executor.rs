use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::group::{
    MethodReturn, SimulateOptions, SimulateResult, SubmitOptions, SubmitResult, TransactionGroup,
};
use super::signer::SignedGroup;
use crate::node_client::{NodeClientError, NodeClientResult};

/// Ledger SDK boundary: dry runs and real submissions of whole groups.
#[async_trait]
pub trait GroupExecutor: Send + Sync {
    async fn simulate(
        &self,
        group: &TransactionGroup,
        options: SimulateOptions,
    ) -> NodeClientResult<SimulateResult>;

    async fn submit(
        &self,
        signed: &SignedGroup,
        options: SubmitOptions,
    ) -> NodeClientResult<SubmitResult>;
}

/// Scripted executor. Returns are keyed by method-call index.
#[derive(Debug, Default)]
pub struct StubExecutor {
    budget_added: u64,
    failure_message: Option<String>,
    simulate_returns: HashMap<usize, MethodReturn>,
    submit_returns: HashMap<usize, MethodReturn>,
    offline: bool,
    simulated: Mutex<Vec<(TransactionGroup, SimulateOptions)>>,
    submitted: Mutex<Vec<(SignedGroup, SubmitOptions)>>,
}

impl StubExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Budget every dry run reports as consumed.
    pub fn with_budget(mut self, budget_added: u64) -> Self {
        self.budget_added = budget_added;
        self
    }

    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    pub fn with_simulate_return(mut self, index: usize, value: MethodReturn) -> Self {
        self.simulate_returns.insert(index, value);
        self
    }

    pub fn with_submit_return(mut self, index: usize, value: MethodReturn) -> Self {
        self.submit_returns.insert(index, value);
        self
    }

    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn simulated(&self) -> Vec<(TransactionGroup, SimulateOptions)> {
        self.simulated.lock().clone()
    }

    pub fn submitted(&self) -> Vec<(SignedGroup, SubmitOptions)> {
        self.submitted.lock().clone()
    }

    fn returns(group: &TransactionGroup, scripted: &HashMap<usize, MethodReturn>) -> Vec<Option<MethodReturn>> {
        (0..group.method_calls())
            .map(|index| scripted.get(&index).cloned())
            .collect()
    }
}

#[async_trait]
impl GroupExecutor for StubExecutor {
    async fn simulate(
        &self,
        group: &TransactionGroup,
        options: SimulateOptions,
    ) -> NodeClientResult<SimulateResult> {
        if self.offline {
            return Err(NodeClientError::transport(anyhow::anyhow!("node offline")));
        }
        self.simulated.lock().push((group.clone(), options));
        let failed = self.failure_message.is_some();
        Ok(SimulateResult {
            failure_message: self.failure_message.clone(),
            app_budget_added: self.budget_added,
            returns: if failed {
                Vec::new()
            } else {
                Self::returns(group, &self.simulate_returns)
            },
        })
    }

    async fn submit(
        &self,
        signed: &SignedGroup,
        options: SubmitOptions,
    ) -> NodeClientResult<SubmitResult> {
        if self.offline {
            return Err(NodeClientError::transport(anyhow::anyhow!("node offline")));
        }
        let mut submitted = self.submitted.lock();
        submitted.push((signed.clone(), options));
        let batch = submitted.len();
        Ok(SubmitResult {
            tx_ids: (0..signed.group.len())
                .map(|index| format!("TX{batch}-{index}"))
                .collect(),
            confirmed_round: 1_000 + batch as u64,
            returns: Self::returns(&signed.group, &self.submit_returns),
        })
    }
}
