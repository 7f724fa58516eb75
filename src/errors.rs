use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::fees::FeeError;
use crate::engine::signer::SignerError;
use crate::name_service::NameServiceError;
use crate::node_client::NodeClientError;
use crate::types::{MicroAlgos, ValidatorId};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport-level failure talking to the node or the name service.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("{resource} not found")]
    NotFound { resource: String },
    /// The dry-run reported a failure; the message is passed through untouched.
    #[error("simulation failed: {message}")]
    SimulationFailed { message: String },
    #[error(
        "insufficient balance for {label}: required {required}, available {available} (short {shortfall})"
    )]
    InsufficientBalance {
        label: String,
        required: MicroAlgos,
        available: MicroAlgos,
        shortfall: MicroAlgos,
    },
    #[error("validator {validator_id} not found: {reason}")]
    ValidatorNotFound {
        validator_id: ValidatorId,
        reason: String,
    },
    #[error("{view} assembled without {missing}")]
    AggregationInconsistency { view: &'static str, missing: String },
    #[error("fee derivation failed: {0}")]
    Fee(#[from] FeeError),
    #[error("signing failed: {0}")]
    Signer(#[from] SignerError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn simulation_failed(message: impl Into<String>) -> Self {
        Self::SimulationFailed {
            message: message.into(),
        }
    }

    pub fn validator_not_found(validator_id: ValidatorId, reason: impl ToString) -> Self {
        Self::ValidatorNotFound {
            validator_id,
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ValidatorNotFound { .. })
    }
}

impl From<NodeClientError> for EngineError {
    fn from(error: NodeClientError) -> Self {
        match error {
            NodeClientError::NotFound { resource } => Self::NotFound { resource },
            other => Self::RemoteUnavailable(other.to_string()),
        }
    }
}

impl From<NameServiceError> for EngineError {
    fn from(error: NameServiceError) -> Self {
        match error {
            NameServiceError::NotFound { name } => Self::NotFound {
                resource: format!("name record {name}"),
            },
            other => Self::RemoteUnavailable(other.to_string()),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
