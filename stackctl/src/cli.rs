// CLI argument parsing and definitions

use clap::{Parser, Subcommand};
use stack_config::context::DEFAULT_INSTALL_ROOT;
use stack_config::Service;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "stackctl")]
#[command(about = "Install, start, update and repair the container service stack")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Environment file to use instead of searching for .env
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Compose file to use instead of searching for docker-compose.yml
    #[arg(long, global = true)]
    pub compose_file: Option<PathBuf>,

    /// Compose project name
    #[arg(short = 'p', long, global = true)]
    pub project_name: Option<String>,

    /// Installation directory searched for the compose and env files
    #[arg(long, global = true, env = "STACKCTL_HOME", default_value = DEFAULT_INSTALL_ROOT)]
    pub install_root: PathBuf,

    /// Answer yes to every confirmation (destructive repairs included)
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start services and wait until they are healthy
    Start {
        /// Service to start (default: all)
        service: Option<Service>,
        /// Skip network and credential checks
        #[arg(long)]
        skip_preflight: bool,
        /// Seconds to wait for health (default from settings)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Stop services without removing them
    Stop { service: Option<Service> },
    /// Stop and remove all containers and the project network
    Down,
    /// Recreate services from their current image tags
    Restart { service: Option<Service> },
    /// Pull images
    Pull { service: Option<Service> },
    /// Update services to new image tags (SERVICE=TAG)
    Update {
        #[arg(required = true, value_name = "SERVICE=TAG")]
        updates: Vec<String>,
        /// Tag to restore on failure (default: the tag currently configured)
        #[arg(long)]
        previous_tag: Option<String>,
    },
    /// Show the health of every service
    Status,
    /// Wait until services are healthy
    Wait {
        service: Option<Service>,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Show service logs
    Logs {
        service: Option<Service>,
        /// Number of lines from the end of the logs
        #[arg(long, default_value_t = 100)]
        tail: usize,
    },
    /// Run a command inside a running service
    Exec {
        service: Service,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Print the resolved compose configuration
    Config,
    /// Validate the compose configuration
    Validate,
    /// Detect and repair database credential mismatches
    Credentials {
        #[command(subcommand)]
        command: RepairSubcommand,
    },
    /// Detect and repair Docker network subnet conflicts
    Network {
        #[command(subcommand)]
        command: RepairSubcommand,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum RepairSubcommand {
    /// Report problems without changing anything
    Check,
    /// Repair problems (asks before destructive changes unless --yes)
    Fix,
}
