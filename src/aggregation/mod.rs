//! Read-side composition of validator, staker and chart views.

use std::sync::Arc;

use crate::name_service::NameService;
use crate::node_client::LedgerReader;
use crate::registry::RegistryReader;

pub mod chart;
pub mod directory;
pub mod enrichment;
pub mod metrics;
pub mod staker;
pub mod validator;

pub use chart::{sum_by_account, StakersChart};
pub use directory::{DirectoryCaches, DirectoryLoad, ValidatorDirectory};
pub use enrichment::{enrich, Enrichment, EnrichmentRequest, EnrichmentResult};
pub use metrics::{compute_metrics, fetch_validator_metrics, validator_health, PoolSample};
pub use staker::{
    dedupe_pool_keys, fetch_staked_info_for_pool, fetch_staked_pools_for_account,
    fetch_staker_pool_data, fetch_staker_validator_data, fold_by_validator,
};
pub use validator::{assemble_validator, fetch_validator, fetch_validator_records, ValidatorRecords};

/// Remote collaborators shared by every view.
#[derive(Clone)]
pub struct Readers {
    pub ledger: Arc<dyn LedgerReader>,
    pub registry: Arc<dyn RegistryReader>,
    pub names: Arc<dyn NameService>,
}

impl Readers {
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        registry: Arc<dyn RegistryReader>,
        names: Arc<dyn NameService>,
    ) -> Self {
        Self {
            ledger,
            registry,
            names,
        }
    }
}
