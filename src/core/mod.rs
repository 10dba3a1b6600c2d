pub mod coordinator;

pub use crate::domain::model::{PoolSummary, PooledVm, ServiceInstance};
pub use crate::domain::ports::{IdentityClient, InstanceStore, OrchestratorClient, PoolStore};
pub use crate::utils::error::Result;
pub use coordinator::AllocationCoordinator;
