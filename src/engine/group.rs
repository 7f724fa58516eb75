use serde::{Deserialize, Serialize};

use super::fees::{FeeError, MIN_TXN_FEE, SIMULATE_STATIC_FEE};
use crate::types::{Address, AppId, AssetId, MicroAlgos, Round, ValidatorConfig, ValidatorPoolKey};

/// An application and the ledger account it controls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTarget {
    pub app_id: AppId,
    pub address: Address,
}

impl AppTarget {
    pub fn new(app_id: AppId, address: impl Into<Address>) -> Self {
        Self {
            app_id,
            address: address.into(),
        }
    }
}

/// Typed method argument; encoding is left to the executor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodArg {
    U64(u64),
    Address(Address),
    Str(String),
    U64Array(Vec<u64>),
    Config(Box<ValidatorConfig>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum OpKind {
    Payment {
        receiver: Address,
        amount: MicroAlgos,
    },
    /// Zero-amount transfer to self.
    AssetOptIn { asset_id: AssetId },
    /// ABI method call. Only these produce entries in the group's returns.
    MethodCall {
        app_id: AppId,
        method: &'static str,
        args: Vec<MethodArg>,
    },
    /// Plain application call with raw arguments.
    NoOpCall { app_id: AppId, args: Vec<MethodArg> },
}

impl OpKind {
    pub fn gas(app_id: AppId) -> Self {
        OpKind::MethodCall {
            app_id,
            method: "gas",
            args: Vec::new(),
        }
    }

    pub fn call(app_id: AppId, method: &'static str, args: Vec<MethodArg>) -> Self {
        OpKind::MethodCall {
            app_id,
            method,
            args,
        }
    }

    pub fn is_method_call(&self) -> bool {
        matches!(self, OpKind::MethodCall { .. })
    }

    pub fn payment_amount(&self) -> MicroAlgos {
        match self {
            OpKind::Payment { amount, .. } => *amount,
            _ => 0,
        }
    }
}

/// How an operation is priced in each phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpRole {
    /// Buys budget. Free while simulating, fee floor when committed.
    Padding,
    /// Program call priced high while simulating so the budget is never capped.
    Call,
    /// Like [`OpRole::Call`], and carries the derived extra fee when committed.
    FeeCarrier,
    /// Fee floor in both phases.
    Standard,
}

/// Operation before a fee has been assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedOp {
    pub role: OpRole,
    pub kind: OpKind,
    pub note: Option<&'static str>,
}

impl PlannedOp {
    pub fn new(role: OpRole, kind: OpKind) -> Self {
        Self {
            role,
            kind,
            note: None,
        }
    }

    pub fn padding(app_id: AppId, note: &'static str) -> Self {
        Self {
            role: OpRole::Padding,
            kind: OpKind::gas(app_id),
            note: Some(note),
        }
    }

    fn simulate_fee(&self) -> MicroAlgos {
        match self.role {
            OpRole::Padding => 0,
            OpRole::Call | OpRole::FeeCarrier => SIMULATE_STATIC_FEE,
            OpRole::Standard => MIN_TXN_FEE,
        }
    }

    fn commit_fee(&self, extra_fee: MicroAlgos) -> Result<MicroAlgos, FeeError> {
        match self.role {
            OpRole::FeeCarrier => MIN_TXN_FEE.checked_add(extra_fee).ok_or(FeeError::Overflow),
            _ => Ok(MIN_TXN_FEE),
        }
    }

    fn with_fee(&self, sender: &Address, fee: MicroAlgos) -> TxnOp {
        TxnOp {
            sender: sender.clone(),
            kind: self.kind.clone(),
            fee,
            note: self.note,
        }
    }
}

/// One transaction of a group with its fee fixed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TxnOp {
    pub sender: Address,
    pub kind: OpKind,
    pub fee: MicroAlgos,
    pub note: Option<&'static str>,
}

/// Atomic group of operations, in submission order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransactionGroup {
    pub ops: Vec<TxnOp>,
}

impl TransactionGroup {
    /// Fees used for the dry run.
    pub fn for_simulation(sender: &Address, ops: &[PlannedOp]) -> Self {
        Self {
            ops: ops.iter().map(|op| op.with_fee(sender, op.simulate_fee())).collect(),
        }
    }

    /// Fees used for the real submission; `extra_fee` lands on every fee carrier.
    pub fn for_commit(
        sender: &Address,
        ops: &[PlannedOp],
        extra_fee: MicroAlgos,
    ) -> Result<Self, FeeError> {
        let ops = ops
            .iter()
            .map(|op| Ok(op.with_fee(sender, op.commit_fee(extra_fee)?)))
            .collect::<Result<Vec<_>, FeeError>>()?;
        Ok(Self { ops })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn method_calls(&self) -> usize {
        self.ops.iter().filter(|op| op.kind.is_method_call()).count()
    }

    pub fn total_fees(&self) -> Result<MicroAlgos, FeeError> {
        self.ops
            .iter()
            .try_fold(0u64, |sum, op| sum.checked_add(op.fee))
            .ok_or(FeeError::Overflow)
    }

    pub fn total_payments(&self) -> Result<MicroAlgos, FeeError> {
        self.ops
            .iter()
            .try_fold(0u64, |sum, op| sum.checked_add(op.kind.payment_amount()))
            .ok_or(FeeError::Overflow)
    }

    /// Everything the sender pays for this group: payment legs plus every fee.
    pub fn required_balance(&self) -> Result<MicroAlgos, FeeError> {
        self.total_payments()?
            .checked_add(self.total_fees()?)
            .ok_or(FeeError::Overflow)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulateOptions {
    pub skip_signatures: bool,
    pub allow_unnamed_resources: bool,
}

impl SimulateOptions {
    /// Unsigned dry run that may touch resources the group does not name.
    pub fn relaxed() -> Self {
        Self {
            skip_signatures: true,
            allow_unnamed_resources: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitOptions {
    pub populate_resources: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            populate_resources: true,
        }
    }
}

/// Where a new stake would land.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPlacement {
    pub pool_key: ValidatorPoolKey,
    pub is_new_staker_to_validator: bool,
    pub is_new_staker_to_protocol: bool,
}

/// Decoded return value of one method call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodReturn {
    U64(u64),
    Bool(bool),
    PoolKey(ValidatorPoolKey),
    Placement(PoolPlacement),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulateResult {
    pub failure_message: Option<String>,
    pub app_budget_added: u64,
    /// One slot per method call, in group order.
    pub returns: Vec<Option<MethodReturn>>,
}

impl SimulateResult {
    pub fn return_at(&self, index: usize) -> Option<&MethodReturn> {
        self.returns.get(index).and_then(Option::as_ref)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitResult {
    pub tx_ids: Vec<String>,
    pub confirmed_round: Round,
    /// One slot per method call, in group order.
    pub returns: Vec<Option<MethodReturn>>,
}

impl SubmitResult {
    pub fn return_at(&self, index: usize) -> Option<&MethodReturn> {
        self.returns.get(index).and_then(Option::as_ref)
    }
}
