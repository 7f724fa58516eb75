pub mod engine;

use std::io;

use thiserror::Error;

pub use engine::{
    CacheConfig, EngineConfig, ExplorerConfig, FreshnessConfig, HealthConfig, LoggingConfig,
    NameServiceConfig, NodeConfig, SchedulerConfig, StakerConfig,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
