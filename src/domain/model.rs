use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    WaitingForAssignment,
    Assigned,
    WaitingForRecreate,
}

impl std::fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssignmentState::WaitingForAssignment => "waiting_for_assignment",
            AssignmentState::Assigned => "assigned",
            AssignmentState::WaitingForRecreate => "waiting_for_recreate",
        };
        f.write_str(name)
    }
}

/// A VM reserved for dedicated assignment to a single service instance.
///
/// `assigned_instance_id` is only ever set while the VM is `Assigned`; the
/// transition methods below are the only way the state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PooledVm {
    pub vm_identity: String,
    pub ip_address: String,
    pub deployment_vm_name: String,
    pub deployment_vm_id: String,
    pub dashboard_url: String,
    pub assignment_state: AssignmentState,
    pub assigned_instance_id: Option<String>,
    pub provisioned_at: Option<DateTime<Utc>>,
}

impl PooledVm {
    pub fn new(
        vm_identity: impl Into<String>,
        ip_address: impl Into<String>,
        deployment_vm_name: impl Into<String>,
        deployment_vm_id: impl Into<String>,
        dashboard_url: impl Into<String>,
    ) -> Self {
        Self {
            vm_identity: vm_identity.into(),
            ip_address: ip_address.into(),
            deployment_vm_name: deployment_vm_name.into(),
            deployment_vm_id: deployment_vm_id.into(),
            dashboard_url: dashboard_url.into(),
            assignment_state: AssignmentState::WaitingForAssignment,
            assigned_instance_id: None,
            provisioned_at: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.assignment_state == AssignmentState::WaitingForAssignment
    }

    pub fn assign_to(&mut self, service_instance_id: &str, at: DateTime<Utc>) {
        self.assignment_state = AssignmentState::Assigned;
        self.assigned_instance_id = Some(service_instance_id.to_string());
        self.provisioned_at = Some(at);
    }

    /// Undo a reservation whose provisioning did not complete.
    pub fn release_to_pool(&mut self) {
        self.assignment_state = AssignmentState::WaitingForAssignment;
        self.assigned_instance_id = None;
        self.provisioned_at = None;
    }

    pub fn mark_waiting_for_recreate(&mut self) {
        self.assignment_state = AssignmentState::WaitingForRecreate;
        self.assigned_instance_id = None;
        self.provisioned_at = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_instance_id: String,
    pub service_definition_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    pub dashboard_url: Option<String>,
}

/// Already-validated fields of a broker create request.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub service_instance_id: String,
    pub service_definition_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    pub admin_password: String,
}

impl ProvisionRequest {
    /// The instance record for this request; `None` dashboard marks a
    /// reservation whose VM is not assigned yet.
    pub fn to_instance(&self, dashboard_url: Option<String>) -> ServiceInstance {
        ServiceInstance {
            service_instance_id: self.service_instance_id.clone(),
            service_definition_id: self.service_definition_id.clone(),
            plan_id: self.plan_id.clone(),
            organization_guid: self.organization_guid.clone(),
            space_guid: self.space_guid.clone(),
            dashboard_url,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub waiting_for_assignment: usize,
    pub assigned: usize,
    pub waiting_for_recreate: usize,
}

impl PoolSummary {
    pub fn total(&self) -> usize {
        self.waiting_for_assignment + self.assigned + self.waiting_for_recreate
    }

    pub fn count(&mut self, state: AssignmentState) {
        match state {
            AssignmentState::WaitingForAssignment => self.waiting_for_assignment += 1,
            AssignmentState::Assigned => self.assigned += 1,
            AssignmentState::WaitingForRecreate => self.waiting_for_recreate += 1,
        }
    }
}
