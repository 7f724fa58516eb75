use std::collections::HashMap;

use anyhow::Error as AnyError;
use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::types::{
    AccountInfo, Address, Asset, AssetHolding, AssetId, Exclude, MicroAlgos, SuggestedParams,
};

/// Unified error surfaced when reading from the ledger node.
#[derive(Debug, Error)]
pub enum NodeClientError {
    /// Transport-level failures such as networking errors or timeouts.
    #[error("transport error: {0}")]
    Transport(#[from] AnyError),
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("node responded with status {0}")]
    HttpStatus(u16),
    #[error("malformed node response: {0}")]
    Decode(String),
}

impl NodeClientError {
    pub fn transport(error: impl Into<AnyError>) -> Self {
        Self::Transport(error.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type NodeClientResult<T> = Result<T, NodeClientError>;

/// Typed accessors over account and asset state held by the ledger node.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn account_information(
        &self,
        address: &Address,
        exclude: Exclude,
    ) -> NodeClientResult<AccountInfo>;

    async fn asset(&self, asset_id: AssetId) -> NodeClientResult<Asset>;

    /// Holding of `asset_id` by `address`; `NotFound` when not opted in.
    async fn account_asset(
        &self,
        address: &Address,
        asset_id: AssetId,
    ) -> NodeClientResult<AssetHolding>;

    async fn suggested_params(&self) -> NodeClientResult<SuggestedParams>;

    async fn spendable_balance(&self, address: &Address) -> NodeClientResult<MicroAlgos> {
        let info = self.account_information(address, Exclude::All).await?;
        Ok(info.spendable())
    }

    async fn is_opted_in(&self, address: &Address, asset_id: AssetId) -> NodeClientResult<bool> {
        match self.account_asset(address, asset_id).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// In-memory ledger used in tests and local development harnesses.
#[derive(Debug, Default)]
pub struct StubLedger {
    accounts: HashMap<Address, AccountInfo>,
    assets: HashMap<AssetId, Asset>,
    params: SuggestedParams,
    offline: bool,
    failing_assets: Vec<AssetId>,
    calls: Mutex<Vec<String>>,
}

impl StubLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account with `amount` total and `min_balance` reserved.
    pub fn with_account(
        mut self,
        address: impl Into<Address>,
        amount: MicroAlgos,
        min_balance: MicroAlgos,
    ) -> Self {
        let address = address.into();
        self.accounts.insert(
            address.clone(),
            AccountInfo {
                address,
                amount,
                min_balance,
                ..AccountInfo::default()
            },
        );
        self
    }

    pub fn with_holding(mut self, address: impl Into<Address>, asset_id: AssetId, amount: u64) -> Self {
        let address = address.into();
        let entry = self
            .accounts
            .entry(address.clone())
            .or_insert_with(|| AccountInfo {
                address,
                ..AccountInfo::default()
            });
        entry.assets.push(AssetHolding {
            asset_id,
            amount,
            is_frozen: false,
        });
        self
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.insert(asset.index, asset);
        self
    }

    pub fn with_params(mut self, params: SuggestedParams) -> Self {
        self.params = params;
        self
    }

    /// Every call fails with a transport error.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Asset lookups for `asset_id` fail with a server error.
    pub fn with_failing_asset(mut self, asset_id: AssetId) -> Self {
        self.failing_assets.push(asset_id);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> NodeClientResult<()> {
        self.calls.lock().push(call);
        if self.offline {
            return Err(NodeClientError::transport(anyhow::anyhow!("node offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerReader for StubLedger {
    async fn account_information(
        &self,
        address: &Address,
        exclude: Exclude,
    ) -> NodeClientResult<AccountInfo> {
        self.record(format!("account:{address}:{}", exclude.as_str()))?;
        let mut info = self
            .accounts
            .get(address)
            .cloned()
            .ok_or_else(|| NodeClientError::not_found(format!("account {address}")))?;
        if matches!(exclude, Exclude::All | Exclude::Assets) {
            info.assets.clear();
        }
        Ok(info)
    }

    async fn asset(&self, asset_id: AssetId) -> NodeClientResult<Asset> {
        self.record(format!("asset:{asset_id}"))?;
        if self.failing_assets.contains(&asset_id) {
            return Err(NodeClientError::HttpStatus(500));
        }
        self.assets
            .get(&asset_id)
            .cloned()
            .ok_or_else(|| NodeClientError::not_found(format!("asset {asset_id}")))
    }

    async fn account_asset(
        &self,
        address: &Address,
        asset_id: AssetId,
    ) -> NodeClientResult<AssetHolding> {
        self.record(format!("account-asset:{address}:{asset_id}"))?;
        self.accounts
            .get(address)
            .and_then(|info| {
                info.assets
                    .iter()
                    .find(|holding| holding.asset_id == asset_id)
                    .cloned()
            })
            .ok_or_else(|| NodeClientError::not_found(format!("holding {address}/{asset_id}")))
    }

    async fn suggested_params(&self) -> NodeClientResult<SuggestedParams> {
        self.record("params".to_string())?;
        Ok(self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn transport_error_display() {
        let err = NodeClientError::transport(anyhow!("boom"));
        assert!(matches!(err, NodeClientError::Transport(_)));
        assert_eq!(format!("{err}"), "transport error: boom");
    }

    #[tokio::test]
    async fn missing_holding_means_not_opted_in() {
        let ledger = StubLedger::new()
            .with_account("ALICE", 2_000_000, 100_000)
            .with_holding("ALICE", 31_566_704, 5);
        let alice = Address::new("ALICE");

        assert!(ledger.is_opted_in(&alice, 31_566_704).await.expect("opted in"));
        assert!(!ledger.is_opted_in(&alice, 1).await.expect("not opted in"));
    }

    #[tokio::test]
    async fn opt_in_check_propagates_transport_failures() {
        let ledger = StubLedger::new().with_account("ALICE", 1, 0).offline();
        let err = ledger
            .is_opted_in(&Address::new("ALICE"), 1)
            .await
            .expect_err("offline");
        assert!(matches!(err, NodeClientError::Transport(_)));
    }

    #[tokio::test]
    async fn spendable_balance_reserves_minimum() {
        let ledger = StubLedger::new().with_account("BOB", 1_500_000, 200_000);
        let spendable = ledger
            .spendable_balance(&Address::new("BOB"))
            .await
            .expect("balance");
        assert_eq!(spendable, 1_300_000);
        assert_eq!(ledger.calls(), vec!["account:BOB:all".to_string()]);
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let ledger = StubLedger::new();
        let err = ledger
            .account_information(&Address::new("NOBODY"), Exclude::None)
            .await
            .expect_err("unknown");
        assert!(err.is_not_found());
    }
}
