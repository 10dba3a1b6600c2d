use crate::domain::model::PooledVm;
use crate::utils::error::{BrokerError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub deployment: DeploymentConfig,
    pub directory: DirectoryConfig,
    pub orchestrator: OrchestratorConfig,
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub scheme: String,
    /// Appended to the VM address, port included, e.g. `:9443/scim2/Groups`.
    pub groups_path: String,
    pub users_path: String,
    pub admin_username: String,
    pub admin_password: String,
    /// Account created on the VM for the tenant.
    pub service_admin: String,
    pub admin_group: String,
    pub timeout_seconds: Option<u64>,
    pub accept_invalid_certs: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            groups_path: ":9443/scim2/Groups".to_string(),
            users_path: ":9443/scim2/Users".to_string(),
            admin_username: String::new(),
            admin_password: String::new(),
            service_admin: String::new(),
            admin_group: "PRIMARY/admin".to_string(),
            timeout_seconds: Some(30),
            accept_invalid_certs: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub director_url: String,
    pub username: String,
    pub password: String,
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub state_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub vms: Vec<VmInventoryEntry>,
}

/// One inventory line: a VM that exists in the deployment and may be handed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmInventoryEntry {
    pub id: String,
    pub ip: String,
    pub vm_name: String,
    pub vm_id: String,
    pub dashboard_url: String,
}

impl VmInventoryEntry {
    pub fn to_pooled_vm(&self) -> PooledVm {
        PooledVm::new(
            &self.id,
            &self.ip,
            &self.vm_name,
            &self.vm_id,
            &self.dashboard_url,
        )
    }
}

impl BrokerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(BrokerError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| BrokerError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replace `${VAR}` with the environment value; unknown variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| BrokerError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn deployment_name(&self) -> &str {
        &self.deployment.name
    }

    pub fn state_file(&self) -> Option<&str> {
        self.storage.as_ref().map(|s| s.state_file.as_str())
    }

    pub fn inventory(&self) -> Vec<PooledVm> {
        self.pool.vms.iter().map(VmInventoryEntry::to_pooled_vm).collect()
    }
}

impl Validate for BrokerConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_required("deployment.name", &self.deployment.name)?;

        validation::validate_scheme("directory.scheme", &self.directory.scheme)?;
        validation::validate_non_empty_string("directory.groups_path", &self.directory.groups_path)?;
        validation::validate_non_empty_string("directory.users_path", &self.directory.users_path)?;
        validation::validate_required(
            "directory.admin_username",
            &self.directory.admin_username,
        )?;
        validation::validate_required(
            "directory.admin_password",
            &self.directory.admin_password,
        )?;
        validation::validate_non_empty_string(
            "directory.service_admin",
            &self.directory.service_admin,
        )?;
        validation::validate_non_empty_string("directory.admin_group", &self.directory.admin_group)?;
        if let Some(timeout) = self.directory.timeout_seconds {
            validation::validate_range("directory.timeout_seconds", timeout, 1, 600)?;
        }

        validation::validate_url("orchestrator.director_url", &self.orchestrator.director_url)?;
        validation::validate_required("orchestrator.username", &self.orchestrator.username)?;
        validation::validate_required("orchestrator.password", &self.orchestrator.password)?;
        if let Some(timeout) = self.orchestrator.timeout_seconds {
            validation::validate_range("orchestrator.timeout_seconds", timeout, 1, 600)?;
        }

        if let Some(storage) = &self.storage {
            validation::validate_path("storage.state_file", &storage.state_file)?;
        }

        validation::validate_unique("pool.vms.id", self.pool.vms.iter().map(|vm| vm.id.as_str()))?;
        for vm in &self.pool.vms {
            validation::validate_non_empty_string("pool.vms.ip", &vm.ip)?;
            validation::validate_non_empty_string("pool.vms.vm_name", &vm.vm_name)?;
            validation::validate_non_empty_string("pool.vms.vm_id", &vm.vm_id)?;
        }

        Ok(())
    }
}
