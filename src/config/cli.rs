use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "vm-broker")]
#[command(about = "Hands out dedicated VMs from a pre-provisioned pool")]
pub struct Cli {
    /// Path to the broker TOML configuration
    #[arg(short, long, default_value = "broker.toml")]
    pub config: String,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Assign a VM to a new service instance and create its admin account
    Provision {
        #[arg(long)]
        instance_id: String,
        #[arg(long)]
        service_id: String,
        #[arg(long)]
        plan_id: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        space: String,
        /// Password for the service admin account created on the VM
        #[arg(long, env = "VM_BROKER_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Remove a service instance and send its VM for recreation
    Deprovision {
        #[arg(long)]
        instance_id: String,
    },
    /// Show a service instance
    Show {
        #[arg(long)]
        instance_id: String,
    },
    /// Find the service instance of an organization
    FindOrg {
        #[arg(long)]
        org: String,
    },
    /// Print VM counts per assignment state
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provision_command() {
        let cli = Cli::try_parse_from([
            "vm-broker",
            "--config",
            "custom.toml",
            "provision",
            "--instance-id",
            "svc-1",
            "--service-id",
            "dedicated-vm",
            "--plan-id",
            "standard",
            "--org",
            "org-a",
            "--space",
            "space-1",
            "--password",
            "pw",
        ])
        .unwrap();

        assert_eq!(cli.config, "custom.toml");
        match cli.command {
            Command::Provision {
                instance_id,
                password,
                ..
            } => {
                assert_eq!(instance_id, "svc-1");
                assert_eq!(password, "pw");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_status_defaults() {
        let cli = Cli::try_parse_from(["vm-broker", "status"]).unwrap();
        assert_eq!(cli.config, "broker.toml");
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Command::Status));
    }
}
