//! Write side: simulate-then-commit composition of action groups.
//!
//! An [`Action`] is laid out into planned operations, dry-run to learn the
//! resource budget it consumes, priced, checked against the sender's
//! spendable balance and only then signed and submitted.

pub mod actions;
pub mod balance;
pub mod composer;
pub mod executor;
pub mod fees;
pub mod group;
pub mod signer;

pub use actions::{Action, ActionLayout, FeePlan};
pub use balance::BalanceGuard;
pub use composer::{ActionExecution, ActionOutcome, ActionPhase, ActionReport, TransactionComposer};
pub use executor::{GroupExecutor, StubExecutor};
pub use fees::{derive_extra_fee, FeeError, MIN_TXN_FEE, OPCODE_BUDGET_PER_FEE_UNIT};
pub use group::{
    AppTarget, MethodArg, MethodReturn, OpKind, OpRole, PlannedOp, PoolPlacement,
    SimulateOptions, SimulateResult, SubmitOptions, SubmitResult, TransactionGroup, TxnOp,
};
pub use signer::{SignedGroup, SignerError, StubSigner, TransactionSigner};
