//! Client-side engine for the Reti staking protocol.
//!
//! Reads are drained through the [`scheduler::QueryScheduler`] in bounded
//! waves, cached per entity kind in [`cache::QueryCache`] and folded into
//! validator, staker and chart views by [`aggregation`]. Writes go through
//! [`engine::TransactionComposer`], which dry-runs each action group to learn
//! its fee and checks the sender's balance before anything is signed.
//!
//! Remote collaborators sit behind traits: [`node_client::LedgerReader`],
//! [`registry::RegistryReader`], [`name_service::NameService`],
//! [`engine::GroupExecutor`] and [`engine::TransactionSigner`]. REST
//! implementations for the ledger node and the name service live in [`rpc`].
//! Registry-wide minimum balances and limits are cached by
//! [`protocol::ProtocolParams`].

pub mod aggregation;
pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod name_service;
pub mod node_client;
pub mod protocol;
pub mod registry;
pub mod rpc;
pub mod scheduler;
pub mod telemetry;
pub mod types;

pub use config::EngineConfig;
pub use errors::{EngineError, EngineResult};
