use std::collections::HashMap;

use anyhow::Error as AnyError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, AppId};

/// How much of a name record the service should return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameView {
    Tiny,
    Thumbnail,
    #[default]
    Brief,
    Full,
}

impl NameView {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameView::Tiny => "tiny",
            NameView::Thumbnail => "thumbnail",
            NameView::Brief => "brief",
            NameView::Full => "full",
        }
    }
}

/// Name-service record linked to an account or a validator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameRecord {
    #[serde(rename = "appID", default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<AppId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_account: Option<Address>,
    /// Verified addresses linked to the name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ca_algo: Vec<Address>,
}

impl NameRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_app_id(mut self, app_id: AppId) -> Self {
        self.app_id = Some(app_id);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<Address>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_verified(mut self, address: impl Into<Address>) -> Self {
        self.ca_algo.push(address.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum NameServiceError {
    #[error("name service transport error: {0}")]
    Transport(#[from] AnyError),
    #[error("name {name} not found")]
    NotFound { name: String },
    #[error("name service responded with status {0}")]
    HttpStatus(u16),
}

impl NameServiceError {
    pub fn transport(error: impl Into<AnyError>) -> Self {
        Self::Transport(error.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}

pub type NameServiceResult<T> = Result<T, NameServiceError>;

/// Forward and reverse resolution of human-readable account names.
#[async_trait]
pub trait NameService: Send + Sync {
    /// Resolves a name or application id; `NotFound` when nothing is registered.
    async fn lookup(&self, name_or_id: &str, view: NameView) -> NameServiceResult<NameRecord>;

    /// Finds the name an address has linked, if any.
    async fn reverse_lookup(
        &self,
        address: &Address,
        view: NameView,
    ) -> NameServiceResult<Option<NameRecord>>;
}

/// In-memory name service used in tests and local development harnesses.
#[derive(Debug, Default)]
pub struct StubNameService {
    by_key: HashMap<String, NameRecord>,
    by_address: HashMap<Address, NameRecord>,
    failing_addresses: Vec<Address>,
    lookups: Mutex<Vec<String>>,
}

impl StubNameService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `record` under its name, its app id and every verified address.
    pub fn with_record(mut self, record: NameRecord) -> Self {
        if let Some(app_id) = record.app_id {
            self.by_key.insert(app_id.to_string(), record.clone());
        }
        for address in &record.ca_algo {
            self.by_address.insert(address.clone(), record.clone());
        }
        self.by_key.insert(record.name.clone(), record);
        self
    }

    pub fn with_failing_address(mut self, address: impl Into<Address>) -> Self {
        self.failing_addresses.push(address.into());
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl NameService for StubNameService {
    async fn lookup(&self, name_or_id: &str, _view: NameView) -> NameServiceResult<NameRecord> {
        self.lookups.lock().push(name_or_id.to_string());
        self.by_key
            .get(name_or_id)
            .cloned()
            .ok_or_else(|| NameServiceError::not_found(name_or_id))
    }

    async fn reverse_lookup(
        &self,
        address: &Address,
        _view: NameView,
    ) -> NameServiceResult<Option<NameRecord>> {
        self.lookups.lock().push(address.to_string());
        if self.failing_addresses.contains(address) {
            return Err(NameServiceError::HttpStatus(503));
        }
        Ok(self.by_address.get(address).cloned())
    }
}
