use crate::core::{IdentityClient, InstanceStore, OrchestratorClient, PoolStore};
use crate::domain::model::{PoolSummary, PooledVm, ProvisionRequest, ServiceInstance};
use crate::utils::error::{BrokerError, DirectoryError, Result};
use chrono::Utc;

/// Where the directory steps stopped, and what they left behind on the VM.
struct ProvisioningFailure {
    error: DirectoryError,
    orphaned_user: Option<String>,
}

/// Hands pooled VMs to service instances and takes them back.
///
/// Owns every `assignment_state` transition. Assignment reserves a VM
/// durably before any remote call; if provisioning the admin account fails
/// the reservation is compensated before the error is returned.
pub struct AllocationCoordinator<P, S, D, O>
where
    P: PoolStore,
    S: InstanceStore,
    D: IdentityClient,
    O: OrchestratorClient,
{
    pool: P,
    instances: S,
    directory: D,
    orchestrator: O,
    deployment_name: String,
}

impl<P, S, D, O> AllocationCoordinator<P, S, D, O>
where
    P: PoolStore,
    S: InstanceStore,
    D: IdentityClient,
    O: OrchestratorClient,
{
    pub fn new(
        pool: P,
        instances: S,
        directory: D,
        orchestrator: O,
        deployment_name: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            instances,
            directory,
            orchestrator,
            deployment_name: deployment_name.into(),
        }
    }

    /// Reserve a waiting VM for `service_instance_id`, create the service
    /// admin on it, and return the VM's dashboard URL.
    pub async fn assign(&self, service_instance_id: &str, admin_password: &str) -> Result<String> {
        if admin_password.is_empty() {
            return Err(BrokerError::ValidationError {
                message: "admin password must not be empty".to_string(),
            });
        }

        let vm = self
            .pool
            .claim_waiting(service_instance_id, Utc::now())
            .await?
            .ok_or(BrokerError::NoAvailableResource)?;

        tracing::info!(
            "Reserved VM {} ({}) for service instance {}",
            vm.vm_identity,
            vm.ip_address,
            service_instance_id
        );

        match self.provision_admin(&vm.ip_address, admin_password).await {
            Ok(()) => {
                tracing::info!("Service instance {} assigned to VM {}", service_instance_id, vm.vm_identity);
                Ok(vm.dashboard_url)
            }
            Err(failure) => Err(self.compensate(vm, failure).await),
        }
    }

    async fn provision_admin(
        &self,
        ip: &str,
        admin_password: &str,
    ) -> std::result::Result<(), ProvisioningFailure> {
        let group_id = self
            .directory
            .lookup_admin_group(ip)
            .await
            .map_err(|error| ProvisioningFailure {
                error,
                orphaned_user: None,
            })?;

        let user_id = self
            .directory
            .create_user(ip, admin_password)
            .await
            .map_err(|error| ProvisioningFailure {
                error,
                orphaned_user: None,
            })?;

        self.directory
            .grant_group_membership(ip, &group_id, &user_id)
            .await
            .map_err(|error| ProvisioningFailure {
                error,
                orphaned_user: Some(user_id),
            })
    }

    /// Undo a partial assignment: remove the orphaned user first, then put
    /// the VM back in the pool. Secondary failures are logged and attached
    /// to the returned error, never substituted for it.
    async fn compensate(&self, mut vm: PooledVm, failure: ProvisioningFailure) -> BrokerError {
        tracing::error!("Provisioning VM {} failed: {}", vm.vm_identity, failure.error);
        let mut compensation = Vec::new();

        if let Some(user_id) = &failure.orphaned_user {
            if let Err(e) = self.directory.delete_user(&vm.ip_address, user_id).await {
                tracing::error!("Failed to remove orphaned user {}: {}", user_id, e);
                compensation.push(e.to_string());
            }
        }

        vm.release_to_pool();
        match self.pool.save(&vm).await {
            Ok(()) => tracing::info!("VM {} returned to the pool", vm.vm_identity),
            Err(e) => {
                tracing::error!("Failed to return VM {} to the pool: {}", vm.vm_identity, e);
                compensation.push(e.to_string());
            }
        }

        BrokerError::IdentityProvisioningFailed {
            source: failure.error,
            compensation,
        }
    }

    /// Delete the instance record, then hand its VM to the orchestrator for
    /// recreation. The record deletion is not rolled back if later steps fail.
    pub async fn deprovision(&self, service_instance_id: &str) -> Result<()> {
        self.instances.delete_by_id(service_instance_id).await?;

        let mut vm = self
            .pool
            .find_by_assigned_instance(service_instance_id)
            .await?
            .ok_or_else(|| BrokerError::NoProvisionedResource {
                service_instance_id: service_instance_id.to_string(),
            })?;

        vm.mark_waiting_for_recreate();
        self.pool.save(&vm).await?;

        let recreate_failed = |reason: String| BrokerError::RecreateFailed {
            deployment: self.deployment_name.clone(),
            vm_name: vm.deployment_vm_name.clone(),
            vm_id: vm.deployment_vm_id.clone(),
            reason,
        };

        match self
            .orchestrator
            .recreate_instance(&self.deployment_name, &vm.deployment_vm_name, &vm.deployment_vm_id)
            .await
        {
            Ok(true) => {
                tracing::info!(
                    "VM {} released from {} and queued for recreate",
                    vm.vm_identity,
                    service_instance_id
                );
                Ok(())
            }
            Ok(false) => {
                tracing::error!(
                    "reCreateVM :: deploymentName :: {}, vmName :: {}, vmId :: {}",
                    self.deployment_name,
                    vm.deployment_vm_name,
                    vm.deployment_vm_id
                );
                Err(recreate_failed("orchestrator did not accept the recreate".to_string()))
            }
            Err(e) => {
                tracing::error!("Failed to recreate dedicated VM :: {}", e);
                Err(recreate_failed(e.to_string()))
            }
        }
    }

    /// Full create flow: one instance per organization, assign a VM, record the instance.
    ///
    /// The instance record is reserved before a VM is claimed, so a second
    /// request for the same organization fails without touching the pool.
    pub async fn provision(&self, request: ProvisionRequest) -> Result<ServiceInstance> {
        let service_instance_id = request.service_instance_id.as_str();
        self.instances
            .reserve_instance(&request.to_instance(None))
            .await?;

        let dashboard_url = match self.assign(service_instance_id, &request.admin_password).await {
            Ok(dashboard_url) => dashboard_url,
            Err(e) => {
                if let Err(cleanup) = self.instances.delete_by_id(service_instance_id).await {
                    tracing::error!(
                        "Failed to drop reservation for service instance {}: {}",
                        service_instance_id,
                        cleanup
                    );
                }
                return Err(e);
            }
        };

        let instance = request.to_instance(Some(dashboard_url));
        if let Err(e) = self.create_service_instance(&instance).await {
            // The reservation stays behind, so deprovision can still reclaim the VM.
            tracing::error!(
                "Service instance {} holds an assigned VM but its record was not updated: {}",
                service_instance_id,
                e
            );
            return Err(e);
        }
        Ok(instance)
    }

    pub async fn create_service_instance(&self, instance: &ServiceInstance) -> Result<()> {
        self.instances.save_instance(instance).await
    }

    pub async fn get_service_instance(
        &self,
        service_instance_id: &str,
    ) -> Result<Option<ServiceInstance>> {
        self.instances.find_by_id(service_instance_id).await
    }

    pub async fn find_by_organization(
        &self,
        organization_guid: &str,
    ) -> Result<Option<ServiceInstance>> {
        self.instances.find_by_organization(organization_guid).await
    }

    pub async fn pool_summary(&self) -> Result<PoolSummary> {
        self.pool.summary().await
    }
}
