use crate::domain::model::{PoolSummary, PooledVm, ServiceInstance};
use crate::utils::error::{DirectoryError, OrchestratorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Durable VM pool. Source of truth for assignment status.
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn find_one_waiting(&self) -> Result<Option<PooledVm>>;

    async fn find_by_assigned_instance(&self, service_instance_id: &str)
        -> Result<Option<PooledVm>>;

    async fn save(&self, vm: &PooledVm) -> Result<()>;

    /// Select one waiting VM and mark it assigned as a single atomic
    /// read-modify-write. Two concurrent callers never receive the same VM.
    async fn claim_waiting(
        &self,
        service_instance_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PooledVm>>;

    async fn summary(&self) -> Result<PoolSummary>;
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn save_instance(&self, instance: &ServiceInstance) -> Result<()>;

    /// Insert `instance` only if neither its id nor its organization is
    /// recorded yet. Check and insert are one atomic step.
    async fn reserve_instance(&self, instance: &ServiceInstance) -> Result<()>;

    async fn delete_by_id(&self, service_instance_id: &str) -> Result<()>;

    async fn find_by_id(&self, service_instance_id: &str) -> Result<Option<ServiceInstance>>;

    async fn find_by_organization(&self, organization_guid: &str)
        -> Result<Option<ServiceInstance>>;
}

/// SCIM-style directory running on each pooled VM.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn lookup_admin_group(&self, ip: &str) -> std::result::Result<String, DirectoryError>;

    async fn create_user(&self, ip: &str, password: &str)
        -> std::result::Result<String, DirectoryError>;

    async fn grant_group_membership(
        &self,
        ip: &str,
        group_id: &str,
        user_id: &str,
    ) -> std::result::Result<(), DirectoryError>;

    async fn delete_user(&self, ip: &str, user_id: &str)
        -> std::result::Result<(), DirectoryError>;
}

#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Returns whether the orchestrator accepted the recreate.
    async fn recreate_instance(
        &self,
        deployment_name: &str,
        vm_name: &str,
        vm_id: &str,
    ) -> std::result::Result<bool, OrchestratorError>;
}

#[async_trait]
impl<T: PoolStore + ?Sized> PoolStore for Arc<T> {
    async fn find_one_waiting(&self) -> Result<Option<PooledVm>> {
        (**self).find_one_waiting().await
    }

    async fn find_by_assigned_instance(
        &self,
        service_instance_id: &str,
    ) -> Result<Option<PooledVm>> {
        (**self).find_by_assigned_instance(service_instance_id).await
    }

    async fn save(&self, vm: &PooledVm) -> Result<()> {
        (**self).save(vm).await
    }

    async fn claim_waiting(
        &self,
        service_instance_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PooledVm>> {
        (**self).claim_waiting(service_instance_id, at).await
    }

    async fn summary(&self) -> Result<PoolSummary> {
        (**self).summary().await
    }
}

#[async_trait]
impl<T: InstanceStore + ?Sized> InstanceStore for Arc<T> {
    async fn save_instance(&self, instance: &ServiceInstance) -> Result<()> {
        (**self).save_instance(instance).await
    }

    async fn reserve_instance(&self, instance: &ServiceInstance) -> Result<()> {
        (**self).reserve_instance(instance).await
    }

    async fn delete_by_id(&self, service_instance_id: &str) -> Result<()> {
        (**self).delete_by_id(service_instance_id).await
    }

    async fn find_by_id(&self, service_instance_id: &str) -> Result<Option<ServiceInstance>> {
        (**self).find_by_id(service_instance_id).await
    }

    async fn find_by_organization(
        &self,
        organization_guid: &str,
    ) -> Result<Option<ServiceInstance>> {
        (**self).find_by_organization(organization_guid).await
    }
}

#[async_trait]
impl<T: IdentityClient + ?Sized> IdentityClient for Arc<T> {
    async fn lookup_admin_group(&self, ip: &str) -> std::result::Result<String, DirectoryError> {
        (**self).lookup_admin_group(ip).await
    }

    async fn create_user(
        &self,
        ip: &str,
        password: &str,
    ) -> std::result::Result<String, DirectoryError> {
        (**self).create_user(ip, password).await
    }

    async fn grant_group_membership(
        &self,
        ip: &str,
        group_id: &str,
        user_id: &str,
    ) -> std::result::Result<(), DirectoryError> {
        (**self).grant_group_membership(ip, group_id, user_id).await
    }

    async fn delete_user(&self, ip: &str, user_id: &str) -> std::result::Result<(), DirectoryError> {
        (**self).delete_user(ip, user_id).await
    }
}

#[async_trait]
impl<T: OrchestratorClient + ?Sized> OrchestratorClient for Arc<T> {
    async fn recreate_instance(
        &self,
        deployment_name: &str,
        vm_name: &str,
        vm_id: &str,
    ) -> std::result::Result<bool, OrchestratorError> {
        (**self)
            .recreate_instance(deployment_name, vm_name, vm_id)
            .await
    }
}
