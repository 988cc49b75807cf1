// Command handlers for stackctl operations

use std::env;

use anyhow::Context;
use tracing::debug;

use crate::cli::{Args, Command};
use crate::prompt::TerminalConfirm;
use stack_config::{ContextOptions, EnvStore, EnvironmentContext, Service, Settings};
use stack_core::{stack_warning, CapturedOutput, Result};
use stack_messages::{msg, MESSAGES};
use stack_orchestrator::gateway::REGISTRY_TOKEN_KEY;
use stack_orchestrator::{AssumeYes, Confirm, Gateway, Operation, SystemClock};
use stack_runtime::DockerClient;

// Individual command modules
pub mod credentials;
pub mod inspect;
pub mod lifecycle;
pub mod network;
pub mod status;
pub mod update;

/// Everything a command needs, resolved once per invocation.
pub struct Session {
    pub ctx: EnvironmentContext,
    pub store: EnvStore,
    pub settings: Settings,
    pub clock: SystemClock,
    pub assume_yes: bool,
    pub quiet: bool,
    runtime: DockerClient,
}

impl Session {
    /// The context is resolved before Docker is looked for, so a missing
    /// compose file is always reported as a configuration error.
    pub fn open(args: &Args) -> Result<Self> {
        let working_dir = env::current_dir().context("Failed to determine the current directory")?;
        let options = ContextOptions::new(args.install_root.clone(), working_dir)
            .with_env_file(args.env_file.clone())
            .with_compose_file(args.compose_file.clone())
            .with_project_name(args.project_name.clone());
        let ctx = EnvironmentContext::resolve(&options)?;
        debug!(
            "{}",
            msg!(
                MESSAGES.env_using,
                compose = ctx.compose_file.display().to_string(),
                project = ctx.project_name.as_str()
            )
        );

        let store = ctx.load_store()?;
        if ctx.is_degraded() && !args.quiet {
            stack_warning!("{}", MESSAGES.env_degraded);
        }
        let settings = Settings::load(ctx.compose_dir(), &store)?;
        let runtime = DockerClient::new()?;

        Ok(Self {
            ctx,
            store,
            settings,
            clock: SystemClock::new(),
            assume_yes: args.yes,
            quiet: args.quiet,
            runtime,
        })
    }

    pub fn gateway(&self) -> Gateway<'_> {
        Gateway::new(&self.runtime, self.ctx.clone(), &self.settings)
            .with_token(self.registry_token())
    }

    /// The env store wins over the process environment.
    fn registry_token(&self) -> Option<String> {
        self.store.get_non_empty(REGISTRY_TOKEN_KEY).or_else(|| {
            env::var(REGISTRY_TOKEN_KEY)
                .ok()
                .filter(|token| !token.trim().is_empty())
        })
    }

    pub fn confirm(&self) -> &dyn Confirm {
        if self.assume_yes {
            &AssumeYes
        } else {
            &TerminalConfirm
        }
    }
}

/// Main command dispatcher
#[must_use = "command execution results should be handled"]
pub fn execute(args: Args) -> Result<()> {
    let session = Session::open(&args)?;

    match args.command {
        Command::Start {
            service,
            skip_preflight,
            timeout,
        } => {
            debug!("Handling start command");
            lifecycle::start(&session, service, skip_preflight, timeout)
        }
        Command::Stop { service } => lifecycle::stop(&session, service),
        Command::Down => lifecycle::down(&session),
        Command::Restart { service } => lifecycle::restart(&session, service),
        Command::Pull { service } => lifecycle::pull(&session, service),
        Command::Update {
            updates,
            previous_tag,
        } => {
            debug!("Handling update command for {} plan(s)", updates.len());
            update::handle_update(&session, &updates, previous_tag)
        }
        Command::Status => status::handle_status(&session),
        Command::Wait { service, timeout } => status::handle_wait(&session, service, timeout),
        Command::Logs { service, tail } => inspect::logs(&session, service, tail),
        Command::Exec { service, command } => inspect::exec(&session, service, &command),
        Command::Config => inspect::config(&session),
        Command::Validate => inspect::validate(&session),
        Command::Credentials { command } => credentials::handle_credentials(&session, command),
        Command::Network { command } => network::handle_network(&session, command),
    }
}

/// Display name for an optional service target.
pub(crate) fn target_name(service: Option<Service>) -> String {
    service
        .map(|s| s.name().to_string())
        .unwrap_or_else(|| MESSAGES.all_services.to_string())
}

/// Turn a non-zero exit into a classified error.
pub(crate) fn ensure_success(
    gateway: &Gateway<'_>,
    operation: Operation,
    output: CapturedOutput,
) -> Result<CapturedOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(gateway.classify_failure(operation, &output))
    }
}
