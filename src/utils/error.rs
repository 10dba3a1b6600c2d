use thiserror::Error;

/// Failures of a single call against the directory hosted on a VM.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Failed to retrieve admin group > URL [ {url} ] {reason}")]
    GroupLookupFailed { url: String, reason: String },

    #[error("Failed to create service admin > URL [ {url} ] {reason}")]
    UserCreateFailed { url: String, reason: String },

    #[error("Failed to register admin group > URL [ {url} ] {reason}")]
    GroupGrantFailed { url: String, reason: String },

    #[error("Failed to delete service admin > URL [ {url} ] {reason}")]
    UserDeleteFailed { url: String, reason: String },
}

impl DirectoryError {
    pub fn url(&self) -> &str {
        match self {
            DirectoryError::GroupLookupFailed { url, .. }
            | DirectoryError::UserCreateFailed { url, .. }
            | DirectoryError::GroupGrantFailed { url, .. }
            | DirectoryError::UserDeleteFailed { url, .. } => url,
        }
    }
}

/// Transport-level failure talking to the deployment orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Orchestrator request failed > URL [ {url} ] {reason}")]
pub struct OrchestratorError {
    pub url: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Cannot assign VM. There are no available service VM.")]
    NoAvailableResource,

    #[error("Cannot deprovision. There are no provisioned VM for service instance {service_instance_id}.")]
    NoProvisionedResource { service_instance_id: String },

    #[error("Identity provisioning failed: {source}{}", compensation_suffix(.compensation))]
    IdentityProvisioningFailed {
        #[source]
        source: DirectoryError,
        /// Secondary failures raised while undoing the partial assignment.
        compensation: Vec<String>,
    },

    #[error("Failed to recreate dedicated VM :: Deployment Name [{deployment}], VM Name/VM ID [{vm_name}/{vm_id}] {reason}")]
    RecreateFailed {
        deployment: String,
        vm_name: String,
        vm_id: String,
        reason: String,
    },

    #[error("A service instance already exists for organization {organization_guid}")]
    InstanceAlreadyExists { organization_guid: String },

    #[error("Store error: {message}")]
    StoreError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}': '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

fn compensation_suffix(compensation: &[String]) -> String {
    if compensation.is_empty() {
        String::new()
    } else {
        format!(" (compensation errors: {})", compensation.join("; "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BrokerError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BrokerError::NoAvailableResource
            | BrokerError::NoProvisionedResource { .. }
            | BrokerError::InstanceAlreadyExists { .. }
            | BrokerError::ValidationError { .. } => ErrorSeverity::Medium,
            BrokerError::IdentityProvisioningFailed { compensation, .. } => {
                if compensation.is_empty() {
                    ErrorSeverity::High
                } else {
                    ErrorSeverity::Critical
                }
            }
            BrokerError::RecreateFailed { .. } => ErrorSeverity::High,
            BrokerError::StoreError { .. }
            | BrokerError::IoError(_)
            | BrokerError::SerializationError(_)
            | BrokerError::ConfigError { .. }
            | BrokerError::InvalidConfigValueError { .. }
            | BrokerError::MissingConfigError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            BrokerError::NoAvailableResource => {
                "Add VMs to the pool or wait for recreated VMs to be returned to it"
            }
            BrokerError::NoProvisionedResource { .. } => {
                "Check that the service instance id is correct and was provisioned by this broker"
            }
            BrokerError::IdentityProvisioningFailed { compensation, .. } => {
                if compensation.is_empty() {
                    "Check that the directory on the VM is reachable and the admin credentials are valid"
                } else {
                    "Inspect the VM manually: the service admin account or pool entry may need cleanup"
                }
            }
            BrokerError::RecreateFailed { .. } => {
                "The VM is waiting for recreate; trigger the recreate on the orchestrator manually"
            }
            BrokerError::InstanceAlreadyExists { .. } => {
                "Only one dedicated VM is available per organization"
            }
            BrokerError::StoreError { .. } | BrokerError::IoError(_) => {
                "Check that the state file location is writable"
            }
            BrokerError::SerializationError(_) => "The state file may be corrupted",
            BrokerError::ConfigError { .. }
            | BrokerError::InvalidConfigValueError { .. }
            | BrokerError::MissingConfigError { .. } => "Fix the broker configuration file",
            BrokerError::ValidationError { .. } => "Check the request parameters",
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_failure_message_includes_url_and_compensation() {
        let err = BrokerError::IdentityProvisioningFailed {
            source: DirectoryError::GroupGrantFailed {
                url: "https://10.0.0.5:9443/scim2/Groups/g1".to_string(),
                reason: "500 Internal Server Error".to_string(),
            },
            compensation: vec!["delete failed".to_string()],
        };

        let message = err.to_string();
        assert!(message.contains("https://10.0.0.5:9443/scim2/Groups/g1"));
        assert!(message.contains("compensation errors: delete failed"));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_identity_failure_without_compensation_is_high() {
        let err = BrokerError::IdentityProvisioningFailed {
            source: DirectoryError::UserCreateFailed {
                url: "https://10.0.0.5:9443/scim2/Users".to_string(),
                reason: "409 Conflict".to_string(),
            },
            compensation: vec![],
        };

        assert!(!err.to_string().contains("compensation"));
        assert_eq!(err.severity(), ErrorSeverity::High);
    }
}
