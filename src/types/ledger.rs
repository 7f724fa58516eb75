use std::fmt;

use serde::{Deserialize, Serialize};

pub type AppId = u64;
pub type AssetId = u64;
pub type Round = u64;
/// Amounts are always carried in the ledger's base unit.
pub type MicroAlgos = u64;

/// Address of the all-zero public key. Staker boxes use it to mark empty slots.
pub const ZERO_ADDRESS: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ";

/// Base-32 encoded ledger account address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn zero() -> Self {
        Self(ZERO_ADDRESS.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO_ADDRESS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which account sub-collections the node may omit from an account response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exclude {
    All,
    Assets,
    CreatedAssets,
    AppsLocalState,
    CreatedApps,
    #[default]
    None,
}

impl Exclude {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exclude::All => "all",
            Exclude::Assets => "assets",
            Exclude::CreatedAssets => "created-assets",
            Exclude::AppsLocalState => "apps-local-state",
            Exclude::CreatedApps => "created-apps",
            Exclude::None => "none",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountInfo {
    pub address: Address,
    pub amount: MicroAlgos,
    pub min_balance: MicroAlgos,
    #[serde(default)]
    pub round: Round,
    #[serde(default)]
    pub assets: Vec<AssetHolding>,
}

impl AccountInfo {
    /// Balance left over once the minimum balance requirement is reserved.
    pub fn spendable(&self) -> MicroAlgos {
        self.amount.saturating_sub(self.min_balance)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssetHolding {
    pub asset_id: AssetId,
    pub amount: u64,
    #[serde(default)]
    pub is_frozen: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub index: AssetId,
    pub params: AssetParams,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssetParams {
    pub creator: Address,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Network parameters used to price and date a transaction group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuggestedParams {
    /// Per-byte fee suggested by the node; zero outside of congestion.
    pub fee: MicroAlgos,
    pub min_fee: MicroAlgos,
    pub last_round: Round,
    #[serde(default)]
    pub genesis_id: String,
    #[serde(default)]
    pub genesis_hash: String,
    #[serde(default)]
    pub consensus_version: String,
}

impl SuggestedParams {
    /// Flat fee charged per operation when no override is applied.
    pub fn fee_floor(&self) -> MicroAlgos {
        self.min_fee.max(self.fee)
    }
}

impl Default for SuggestedParams {
    fn default() -> Self {
        Self {
            fee: 0,
            min_fee: 1_000,
            last_round: 0,
            genesis_id: String::new(),
            genesis_hash: String::new(),
            consensus_version: String::new(),
        }
    }
}
