pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::Cli;

pub use adapters::{BoshDirectorClient, ScimDirectoryClient, StateStore};
pub use config::BrokerConfig;
pub use core::AllocationCoordinator;
pub use domain::model::{AssignmentState, PooledVm, ProvisionRequest, ServiceInstance};
pub use utils::error::{BrokerError, Result};
