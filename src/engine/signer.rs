use async_trait::async_trait;
use parking_lot::Mutex;

use super::group::TransactionGroup;
use crate::types::Address;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("signing request rejected: {0}")]
    Rejected(String),
    #[error("signer unavailable: {0}")]
    Unavailable(String),
    #[error("operation {index} is sent by {found}, signer holds {expected}")]
    ForeignSender {
        index: usize,
        expected: Address,
        found: Address,
    },
}

/// A group together with one opaque signature per operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedGroup {
    pub group: TransactionGroup,
    pub signatures: Vec<Vec<u8>>,
}

/// Wallet boundary. Signing is the irreversible user step, so the composer
/// only calls it once fees and balances are settled.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> &Address;

    async fn sign(&self, group: &TransactionGroup) -> Result<SignedGroup, SignerError>;
}

/// Signer that stamps each operation with its index.
#[derive(Debug)]
pub struct StubSigner {
    address: Address,
    rejecting: bool,
    signed: Mutex<Vec<TransactionGroup>>,
}

impl StubSigner {
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            rejecting: false,
            signed: Mutex::new(Vec::new()),
        }
    }

    /// Every request is declined, as if the user dismissed the prompt.
    pub fn rejecting(mut self) -> Self {
        self.rejecting = true;
        self
    }

    pub fn signed(&self) -> Vec<TransactionGroup> {
        self.signed.lock().clone()
    }
}

#[async_trait]
impl TransactionSigner for StubSigner {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn sign(&self, group: &TransactionGroup) -> Result<SignedGroup, SignerError> {
        if self.rejecting {
            return Err(SignerError::Rejected("user declined".into()));
        }
        if let Some((index, op)) = group
            .ops
            .iter()
            .enumerate()
            .find(|(_, op)| op.sender != self.address)
        {
            return Err(SignerError::ForeignSender {
                index,
                expected: self.address.clone(),
                found: op.sender.clone(),
            });
        }
        self.signed.lock().push(group.clone());
        let signatures = (0..group.len())
            .map(|index| format!("{}:{index}", self.address).into_bytes())
            .collect();
        Ok(SignedGroup {
            group: group.clone(),
            signatures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::group::{OpKind, OpRole, PlannedOp};

    fn group(sender: &str) -> TransactionGroup {
        TransactionGroup::for_simulation(
            &Address::new(sender),
            &[PlannedOp::new(OpRole::Standard, OpKind::AssetOptIn { asset_id: 9 })],
        )
    }

    #[tokio::test]
    async fn signs_every_operation() {
        let signer = StubSigner::new("ALICE");
        let signed = signer.sign(&group("ALICE")).await.expect("signed");
        assert_eq!(signed.signatures, vec![b"ALICE:0".to_vec()]);
        assert_eq!(signer.signed().len(), 1);
    }

    #[tokio::test]
    async fn foreign_sender_is_refused() {
        let err = StubSigner::new("ALICE")
            .sign(&group("MALLORY"))
            .await
            .expect_err("foreign");
        assert!(matches!(err, SignerError::ForeignSender { index: 0, .. }));
    }

    #[tokio::test]
    async fn rejection_surfaces() {
        let err = StubSigner::new("ALICE")
            .rejecting()
            .sign(&group("ALICE"))
            .await
            .expect_err("rejected");
        assert_eq!(err, SignerError::Rejected("user declined".into()));
    }
}
