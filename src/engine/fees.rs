use crate::types::MicroAlgos;

/// Resource budget bought by one fee unit.
pub const OPCODE_BUDGET_PER_FEE_UNIT: u64 = 700;
/// Flat fee floor charged for every operation in a group.
pub const MIN_TXN_FEE: MicroAlgos = 1_000;
/// Fee pinned on the main call while simulating, high enough to never cap the budget.
pub const SIMULATE_STATIC_FEE: MicroAlgos = 240_000;

/// Extra fee the designated call must carry for a group that consumed `budget_added`.
///
/// `padding_credit` is the fee already paid by gas-padding calls at the floor.
/// A negative result means the padding accounting is wrong, so it is reported
/// rather than clamped.
pub fn derive_extra_fee(budget_added: u64, padding_credit: MicroAlgos) -> Result<MicroAlgos, FeeError> {
    let budget_fee = budget_fee(budget_added)?;
    budget_fee
        .checked_sub(padding_credit)
        .ok_or(FeeError::PaddingExceedsBudget {
            budget_fee,
            padding: padding_credit,
        })
}

/// `ceil((budget + 699) / 700) * MIN_TXN_FEE`.
pub fn budget_fee(budget_added: u64) -> Result<MicroAlgos, FeeError> {
    let units = budget_added
        .checked_add(OPCODE_BUDGET_PER_FEE_UNIT - 1)
        .ok_or(FeeError::Overflow)?
        .checked_add(OPCODE_BUDGET_PER_FEE_UNIT - 1)
        .ok_or(FeeError::Overflow)?
        / OPCODE_BUDGET_PER_FEE_UNIT;
    units.checked_mul(MIN_TXN_FEE).ok_or(FeeError::Overflow)
}

/// Fee already paid by `calls` padding operations at the floor.
pub fn padding_credit(calls: u64) -> MicroAlgos {
    calls.saturating_mul(MIN_TXN_FEE)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeeError {
    #[error("padding credit {padding} exceeds budget fee {budget_fee}")]
    PaddingExceedsBudget {
        budget_fee: MicroAlgos,
        padding: MicroAlgos,
    },
    #[error("fee calculation overflowed")]
    Overflow,
}
