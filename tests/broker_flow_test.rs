use anyhow::Result;
use dedicated_vm_broker::config::{DirectoryConfig, OrchestratorConfig};
use dedicated_vm_broker::{
    AllocationCoordinator, AssignmentState, BoshDirectorClient, BrokerError, PooledVm,
    ProvisionRequest, ScimDirectoryClient, StateStore,
};
use httpmock::prelude::*;
use httpmock::Method::PATCH;
use std::sync::Arc;
use tempfile::TempDir;

type Coordinator = AllocationCoordinator<
    Arc<StateStore>,
    Arc<StateStore>,
    ScimDirectoryClient,
    BoshDirectorClient,
>;

fn coordinator(server: &MockServer, store: Arc<StateStore>) -> Coordinator {
    let directory = ScimDirectoryClient::new(DirectoryConfig {
        scheme: "http".to_string(),
        groups_path: format!(":{}/scim2/Groups", server.port()),
        users_path: format!(":{}/scim2/Users", server.port()),
        admin_username: "admin".to_string(),
        admin_password: "secret".to_string(),
        service_admin: "svcadmin".to_string(),
        ..DirectoryConfig::default()
    })
    .unwrap();

    let orchestrator = BoshDirectorClient::new(OrchestratorConfig {
        director_url: server.base_url(),
        username: "director".to_string(),
        password: "d1r".to_string(),
        timeout_seconds: Some(5),
        accept_invalid_certs: false,
    })
    .unwrap();

    AllocationCoordinator::new(store.clone(), store, directory, orchestrator, "dep-A")
}

fn request() -> ProvisionRequest {
    ProvisionRequest {
        service_instance_id: "svc-1".to_string(),
        service_definition_id: "dedicated-vm".to_string(),
        plan_id: "standard".to_string(),
        organization_guid: "org-a".to_string(),
        space_guid: "space-1".to_string(),
        admin_password: "pw".to_string(),
    }
}

fn pool() -> Vec<PooledVm> {
    vec![PooledVm::new(
        "v1",
        "127.0.0.1",
        "vm-1",
        "id-1",
        "https://dash/v1",
    )]
}

fn mock_lookup_and_create(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/scim2/Groups");
        then.status(200)
            .json_body(serde_json::json!({"Resources": [{"id": "g1"}]}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/scim2/Users");
        then.status(201).json_body(serde_json::json!({"id": "u1"}));
    });
}

#[tokio::test]
async fn test_provision_and_deprovision_round_trip_through_state_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let state_path = temp_dir.path().join("broker.json");
    let server = MockServer::start();

    mock_lookup_and_create(&server);
    let grant = server.mock(|when, then| {
        when.method(PATCH).path("/scim2/Groups/g1");
        then.status(200);
    });
    let recreate = server.mock(|when, then| {
        when.method(PUT)
            .path("/deployments/dep-A/jobs/vm-1/id-1")
            .query_param("state", "recreate");
        then.status(302).header("Location", "/tasks/7");
    });

    {
        let store = Arc::new(StateStore::open(&state_path, pool()).await?);
        let broker = coordinator(&server, store);

        let instance = broker.provision(request()).await?;
        assert_eq!(instance.dashboard_url.as_deref(), Some("https://dash/v1"));
        grant.assert();
    }

    // A fresh process sees the assignment recorded on disk.
    let store = Arc::new(StateStore::open(&state_path, pool()).await?);
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.vms[0].assignment_state, AssignmentState::Assigned);
    assert_eq!(snapshot.vms[0].assigned_instance_id.as_deref(), Some("svc-1"));

    let broker = coordinator(&server, store.clone());
    assert!(broker.find_by_organization("org-a").await?.is_some());

    broker.deprovision("svc-1").await?;
    recreate.assert();

    let snapshot = store.snapshot().await;
    assert!(snapshot.instances.is_empty());
    assert_eq!(
        snapshot.vms[0].assignment_state,
        AssignmentState::WaitingForRecreate
    );
    Ok(())
}

#[tokio::test]
async fn test_grant_failure_removes_user_and_frees_vm() -> Result<()> {
    let server = MockServer::start();

    mock_lookup_and_create(&server);
    server.mock(|when, then| {
        when.method(PATCH).path("/scim2/Groups/g1");
        then.status(500);
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/scim2/Users/u1");
        then.status(204);
    });

    let store = Arc::new(StateStore::in_memory(pool()));
    let broker = coordinator(&server, store.clone());

    let err = broker.provision(request()).await.unwrap_err();

    match &err {
        BrokerError::IdentityProvisioningFailed { source, compensation } => {
            assert!(source.url().ends_with("/scim2/Groups/g1"));
            assert!(compensation.is_empty());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    delete.assert();

    let snapshot = store.snapshot().await;
    assert!(snapshot.vms[0].is_waiting());
    assert!(snapshot.vms[0].assigned_instance_id.is_none());
    assert!(snapshot.instances.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rejected_recreate_still_deletes_instance() -> Result<()> {
    let server = MockServer::start();

    mock_lookup_and_create(&server);
    server.mock(|when, then| {
        when.method(PATCH).path("/scim2/Groups/g1");
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(PUT).path("/deployments/dep-A/jobs/vm-1/id-1");
        then.status(500);
    });

    let store = Arc::new(StateStore::in_memory(pool()));
    let broker = coordinator(&server, store.clone());
    broker.provision(request()).await?;

    let err = broker.deprovision("svc-1").await.unwrap_err();

    assert!(matches!(err, BrokerError::RecreateFailed { .. }));
    assert!(broker.get_service_instance("svc-1").await?.is_none());
    assert_eq!(
        store.snapshot().await.vms[0].assignment_state,
        AssignmentState::WaitingForRecreate
    );
    Ok(())
}

#[tokio::test]
async fn test_exhausted_pool_reports_no_available_resource() -> Result<()> {
    let server = MockServer::start();
    let lookup = server.mock(|when, then| {
        when.method(GET).path("/scim2/Groups");
        then.status(200)
            .json_body(serde_json::json!({"Resources": [{"id": "g1"}]}));
    });

    let store = Arc::new(StateStore::in_memory(vec![]));
    let broker = coordinator(&server, store);

    let err = broker.assign("svc-1", "pw").await.unwrap_err();

    assert!(matches!(err, BrokerError::NoAvailableResource));
    lookup.assert_hits(0);
    Ok(())
}
