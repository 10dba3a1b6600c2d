use anyhow::Context;
use clap::Parser;
use dedicated_vm_broker::config::cli::{Cli, Command};
use dedicated_vm_broker::utils::error::{BrokerError, ErrorSeverity};
use dedicated_vm_broker::utils::logger::{self, LogFormat};
use dedicated_vm_broker::utils::validation::Validate;
use dedicated_vm_broker::{
    AllocationCoordinator, BoshDirectorClient, BrokerConfig, ProvisionRequest,
    ScimDirectoryClient, StateStore,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logger::init_logger(LogFormat::from_flag(cli.json_logs), cli.verbose);

    tracing::info!("Loading configuration from: {}", cli.config);
    let config = BrokerConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load config file '{}'", cli.config))?;

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    let _root = tracing::info_span!(
        "broker",
        service.name = env!("CARGO_PKG_NAME"),
        deployment = %config.deployment_name()
    )
    .entered();

    let store = Arc::new(match config.state_file() {
        Some(path) => StateStore::open(path, config.inventory()).await?,
        None => {
            tracing::warn!("No [storage] state_file configured, pool state is not persisted");
            StateStore::in_memory(config.inventory())
        }
    });
    let directory = ScimDirectoryClient::new(config.directory.clone())
        .context("failed to build directory client")?;
    let orchestrator = BoshDirectorClient::new(config.orchestrator.clone())
        .context("failed to build orchestrator client")?;

    let coordinator = AllocationCoordinator::new(
        store.clone(),
        store,
        directory,
        orchestrator,
        config.deployment_name(),
    );

    let result = match cli.command {
        Command::Provision {
            instance_id,
            service_id,
            plan_id,
            org,
            space,
            password,
        } => coordinator
            .provision(ProvisionRequest {
                service_instance_id: instance_id,
                service_definition_id: service_id,
                plan_id,
                organization_guid: org,
                space_guid: space,
                admin_password: password,
            })
            .await
            .and_then(|instance| print_json(&instance)),
        Command::Deprovision { instance_id } => {
            coordinator.deprovision(&instance_id).await.map(|()| {
                println!("✅ Service instance {} deprovisioned", instance_id);
            })
        }
        Command::Show { instance_id } => {
            match coordinator.get_service_instance(&instance_id).await {
                Ok(Some(instance)) => print_json(&instance),
                Ok(None) => not_found(&format!("service instance {}", instance_id)),
                Err(e) => Err(e),
            }
        }
        Command::FindOrg { org } => match coordinator.find_by_organization(&org).await {
            Ok(Some(instance)) => print_json(&instance),
            Ok(None) => not_found(&format!("service instance for organization {}", org)),
            Err(e) => Err(e),
        },
        Command::Status => coordinator
            .pool_summary()
            .await
            .and_then(|summary| print_json(&summary)),
    };

    if let Err(e) = result {
        tracing::error!("Broker operation failed: {} (Severity: {:?})", e, e.severity());
        eprintln!("❌ {}", e);
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), BrokerError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn not_found(what: &str) -> Result<(), BrokerError> {
    eprintln!("No {} found", what);
    std::process::exit(4);
}
