use crate::domain::model::{PoolSummary, PooledVm, ServiceInstance};
use crate::domain::ports::{InstanceStore, PoolStore};
use crate::utils::error::{BrokerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// On-disk snapshot of both stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerState {
    /// Insertion order doubles as the claim order: oldest VM first.
    pub vms: Vec<PooledVm>,
    pub instances: BTreeMap<String, ServiceInstance>,
}

/// Pool and service-instance store backed by one lock.
///
/// Every mutation happens under the lock and, when a state file is
/// configured, is written to disk before the lock is released. A failed
/// write restores the previous in-memory state.
#[derive(Debug)]
pub struct StateStore {
    state: Mutex<BrokerState>,
    state_file: Option<PathBuf>,
}

impl StateStore {
    pub fn in_memory(vms: Vec<PooledVm>) -> Self {
        Self {
            state: Mutex::new(BrokerState {
                vms,
                instances: BTreeMap::new(),
            }),
            state_file: None,
        }
    }

    /// Load the snapshot at `path` (if any) and add inventory VMs it does
    /// not know yet. Known VMs keep their recorded state.
    pub async fn open(path: impl AsRef<Path>, inventory: Vec<PooledVm>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut state = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read(&path).await?;
            serde_json::from_slice::<BrokerState>(&content)?
        } else {
            BrokerState::default()
        };

        let before = state.vms.len();
        for vm in inventory {
            if !state.vms.iter().any(|known| known.vm_identity == vm.vm_identity) {
                state.vms.push(vm);
            }
        }
        tracing::debug!(
            "Opened state file {} ({} VMs, {} added from inventory)",
            path.display(),
            state.vms.len(),
            state.vms.len() - before
        );

        write_snapshot(&path, &state).await?;

        Ok(Self {
            state: Mutex::new(state),
            state_file: Some(path),
        })
    }

    pub async fn snapshot(&self) -> BrokerState {
        self.state.lock().await.clone()
    }

    async fn persist(&self, state: &BrokerState) -> Result<()> {
        match &self.state_file {
            Some(path) => write_snapshot(path, state).await,
            None => Ok(()),
        }
    }

    /// Apply `mutate` and persist; on a persistence failure the change is undone.
    async fn mutate<T>(&self, mutate: impl FnOnce(&mut BrokerState) -> T) -> Result<T> {
        let mut state = self.state.lock().await;
        let previous = self.state_file.as_ref().map(|_| state.clone());

        let output = mutate(&mut *state);

        if let Err(e) = self.persist(&state).await {
            if let Some(previous) = previous {
                *state = previous;
            }
            return Err(e);
        }
        Ok(output)
    }
}

async fn write_snapshot(path: &Path, state: &BrokerState) -> Result<()> {
    let data = serde_json::to_vec_pretty(state)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BrokerError::StoreError {
                    message: format!("failed to create {}: {}", parent.display(), e),
                })?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &data)
        .await
        .map_err(|e| BrokerError::StoreError {
            message: format!("failed to write {}: {}", tmp.display(), e),
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| BrokerError::StoreError {
            message: format!("failed to replace {}: {}", path.display(), e),
        })?;
    Ok(())
}

#[async_trait]
impl PoolStore for StateStore {
    async fn find_one_waiting(&self) -> Result<Option<PooledVm>> {
        let state = self.state.lock().await;
        Ok(state.vms.iter().find(|vm| vm.is_waiting()).cloned())
    }

    async fn find_by_assigned_instance(
        &self,
        service_instance_id: &str,
    ) -> Result<Option<PooledVm>> {
        let state = self.state.lock().await;
        Ok(state
            .vms
            .iter()
            .find(|vm| vm.assigned_instance_id.as_deref() == Some(service_instance_id))
            .cloned())
    }

    async fn save(&self, vm: &PooledVm) -> Result<()> {
        self.mutate(|state| {
            match state
                .vms
                .iter()
                .position(|known| known.vm_identity == vm.vm_identity)
            {
                Some(index) => state.vms[index] = vm.clone(),
                None => state.vms.push(vm.clone()),
            }
        })
        .await
    }

    async fn claim_waiting(
        &self,
        service_instance_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PooledVm>> {
        self.mutate(|state| {
            let vm = state.vms.iter_mut().find(|vm| vm.is_waiting())?;
            vm.assign_to(service_instance_id, at);
            Some(vm.clone())
        })
        .await
    }

    async fn summary(&self) -> Result<PoolSummary> {
        let state = self.state.lock().await;
        let mut summary = PoolSummary::default();
        for vm in &state.vms {
            summary.count(vm.assignment_state);
        }
        Ok(summary)
    }
}

#[async_trait]
impl InstanceStore for StateStore {
    async fn save_instance(&self, instance: &ServiceInstance) -> Result<()> {
        self.mutate(|state| {
            state
                .instances
                .insert(instance.service_instance_id.clone(), instance.clone());
        })
        .await
    }

    async fn reserve_instance(&self, instance: &ServiceInstance) -> Result<()> {
        self.mutate(|state| {
            if state
                .instances
                .values()
                .any(|known| known.organization_guid == instance.organization_guid)
            {
                return Err(BrokerError::InstanceAlreadyExists {
                    organization_guid: instance.organization_guid.clone(),
                });
            }
            if state.instances.contains_key(&instance.service_instance_id) {
                return Err(BrokerError::ValidationError {
                    message: format!(
                        "service instance {} already exists",
                        instance.service_instance_id
                    ),
                });
            }
            state
                .instances
                .insert(instance.service_instance_id.clone(), instance.clone());
            Ok(())
        })
        .await?
    }

    async fn delete_by_id(&self, service_instance_id: &str) -> Result<()> {
        self.mutate(|state| {
            state.instances.remove(service_instance_id);
        })
        .await
    }

    async fn find_by_id(&self, service_instance_id: &str) -> Result<Option<ServiceInstance>> {
        let state = self.state.lock().await;
        Ok(state.instances.get(service_instance_id).cloned())
    }

    async fn find_by_organization(
        &self,
        organization_guid: &str,
    ) -> Result<Option<ServiceInstance>> {
        let state = self.state.lock().await;
        Ok(state
            .instances
            .values()
            .find(|instance| instance.organization_guid == organization_guid)
            .cloned())
    }
}
