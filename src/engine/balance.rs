use tracing::{debug, warn};

use crate::errors::{EngineError, EngineResult};
use crate::node_client::LedgerReader;
use crate::types::{Address, MicroAlgos};

/// Pre-flight check that an account can cover a group before it is signed.
pub struct BalanceGuard<'a> {
    ledger: &'a dyn LedgerReader,
}

impl<'a> BalanceGuard<'a> {
    pub fn new(ledger: &'a dyn LedgerReader) -> Self {
        Self { ledger }
    }

    /// Fails with [`EngineError::InsufficientBalance`] when the spendable
    /// balance is below `required`. Equal amounts pass.
    pub async fn check(&self, account: &Address, required: MicroAlgos, label: &str) -> EngineResult<()> {
        let available = self.ledger.spendable_balance(account).await?;
        if available < required {
            let shortfall = required - available;
            warn!(%account, required, available, shortfall, label, "insufficient balance");
            return Err(EngineError::InsufficientBalance {
                label: label.to_string(),
                required,
                available,
                shortfall,
            });
        }
        debug!(%account, required, available, label, "balance check passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_client::StubLedger;

    #[tokio::test]
    async fn shortfall_is_reported_with_label() {
        let ledger = StubLedger::new().with_account("ALICE", 100_500, 100_000);
        let err = BalanceGuard::new(&ledger)
            .check(&Address::new("ALICE"), 1_000, "Add stake")
            .await
            .expect_err("short");
        match err {
            EngineError::InsufficientBalance {
                label,
                required,
                available,
                shortfall,
            } => {
                assert_eq!(label, "Add stake");
                assert_eq!(required, 1_000);
                assert_eq!(available, 500);
                assert_eq!(shortfall, 500);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exact_balance_passes() {
        let ledger = StubLedger::new().with_account("ALICE", 101_000, 100_000);
        BalanceGuard::new(&ledger)
            .check(&Address::new("ALICE"), 1_000, "Add stake")
            .await
            .expect("boundary is inclusive");
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let ledger = StubLedger::new();
        let err = BalanceGuard::new(&ledger)
            .check(&Address::new("NOBODY"), 1, "Remove stake")
            .await
            .expect_err("missing account");
        assert!(err.is_not_found());
    }
}
