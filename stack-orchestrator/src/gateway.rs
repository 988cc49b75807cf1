//! Command Gateway: the single path to the container runtime.
//!
//! Maps lifecycle operations onto compose invocations for the resolved
//! [`EnvironmentContext`], logs in to the registry before operations that
//! may fetch images, and turns failed starts into classified errors.

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use stack_config::{EnvStore, EnvironmentContext, Service, Settings};
use stack_core::error::{Result, StackError};
use stack_core::{stack_warning, CapturedOutput, FailureKind};
use stack_messages::{msg, MESSAGES};
use stack_runtime::{ContainerInfo, NetworkDescriptor, RegistryLogin, RuntimeClient};
use tracing::{debug, info, info_span, warn};

use crate::classifier::{Classification, Classifier};

pub const REGISTRY_TOKEN_KEY: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Up,
    Start,
    Down,
    Stop,
    Restart,
    Pull,
    Logs,
    Status,
    Exec,
    Config,
    Validate,
    Remove,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Up => "up",
            Operation::Start => "start",
            Operation::Down => "down",
            Operation::Stop => "stop",
            Operation::Restart => "restart",
            Operation::Pull => "pull",
            Operation::Logs => "logs",
            Operation::Status => "status",
            Operation::Exec => "exec",
            Operation::Config => "config",
            Operation::Validate => "validate",
            Operation::Remove => "remove",
        }
    }

    /// Operations that may fetch images need registry credentials.
    pub fn requires_auth(self) -> bool {
        matches!(
            self,
            Operation::Up | Operation::Start | Operation::Pull | Operation::Restart
        )
    }

    fn is_start(self) -> bool {
        matches!(self, Operation::Up | Operation::Start)
    }

    /// Compose subcommand and leading flags.
    fn compose_parts(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Operation::Up | Operation::Start => ("up", &["-d"]),
            Operation::Down => ("down", &[]),
            Operation::Stop => ("stop", &[]),
            // Recreate so the container picks up the current image tag.
            Operation::Restart => ("up", &["-d", "--force-recreate", "--no-deps"]),
            Operation::Pull => ("pull", &[]),
            Operation::Logs => ("logs", &["--no-color"]),
            Operation::Status => ("ps", &["-a"]),
            Operation::Exec => ("exec", &["-T"]),
            Operation::Config => ("config", &[]),
            Operation::Validate => ("config", &["--quiet"]),
            Operation::Remove => ("rm", &["-f", "-s"]),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Operation::Up),
            "start" => Ok(Operation::Start),
            "down" => Ok(Operation::Down),
            "stop" => Ok(Operation::Stop),
            "restart" => Ok(Operation::Restart),
            "pull" => Ok(Operation::Pull),
            "logs" => Ok(Operation::Logs),
            "status" | "ps" => Ok(Operation::Status),
            "exec" => Ok(Operation::Exec),
            "config" => Ok(Operation::Config),
            "validate" => Ok(Operation::Validate),
            "remove" | "rm" => Ok(Operation::Remove),
            other => Err(StackError::Configuration(format!(
                "Unknown operation '{}'",
                other
            ))),
        }
    }
}

pub struct Gateway<'a> {
    runtime: &'a dyn RuntimeClient,
    ctx: EnvironmentContext,
    registry: String,
    token: Option<String>,
    /// Token value of the last successful login.
    logged_in_with: RefCell<Option<String>>,
    classifier: Classifier,
}

impl<'a> Gateway<'a> {
    pub fn new(runtime: &'a dyn RuntimeClient, ctx: EnvironmentContext, settings: &Settings) -> Self {
        Self {
            runtime,
            ctx,
            registry: settings.registry.clone(),
            token: None,
            logged_in_with: RefCell::new(None),
            classifier: Classifier::new(),
        }
    }

    /// Use the registry token stored under `GITHUB_TOKEN`, if any.
    pub fn with_store_token(self, store: &EnvStore) -> Self {
        let token = store.get_non_empty(REGISTRY_TOKEN_KEY);
        self.with_token(token)
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn context(&self) -> &EnvironmentContext {
        &self.ctx
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run a lifecycle operation, optionally scoped to one service.
    ///
    /// Only a failed `up`/`start` is turned into an error; other operations
    /// hand back their captured output whatever the exit code.
    pub fn execute(
        &self,
        operation: Operation,
        service: Option<Service>,
        args: &[String],
    ) -> Result<CapturedOutput> {
        let span = info_span!(
            "gateway",
            operation = %operation,
            service = service.map(|s| s.name()).unwrap_or("all")
        );
        let _enter = span.enter();

        if matches!(operation, Operation::Exec | Operation::Remove) && service.is_none() {
            return Err(StackError::Configuration(format!(
                "Operation '{}' requires a service",
                operation
            )));
        }

        if operation.requires_auth() {
            self.ensure_logged_in();
        }

        let (subcommand, flags) = operation.compose_parts();
        let mut compose_args: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
        match (operation, service) {
            (Operation::Exec, Some(svc)) => {
                compose_args.push(svc.name().to_string());
                compose_args.extend(args.iter().cloned());
            }
            (_, svc) => {
                compose_args.extend(args.iter().cloned());
                if let Some(svc) = svc {
                    compose_args.push(svc.name().to_string());
                }
            }
        }

        let output = self.runtime.compose(&self.ctx, subcommand, &compose_args)?;
        debug!(exit_code = output.exit_code, "compose {} finished", subcommand);

        if operation.is_start() && !output.success() {
            return Err(self.classify_failure(operation, &output));
        }
        Ok(output)
    }

    /// `exec -T [-e K=V]... <service> <command>`; the environment stays out
    /// of the logs.
    pub fn exec_with_env(
        &self,
        service: Service,
        env: &[(&str, &str)],
        command: &[String],
    ) -> Result<CapturedOutput> {
        let span = info_span!("gateway", operation = "exec", service = service.name());
        let _enter = span.enter();

        let mut args = vec!["-T".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(service.name().to_string());
        args.extend(command.iter().cloned());
        debug!("exec in {}: {}", service, command.join(" "));
        self.runtime.compose(&self.ctx, "exec", &args)
    }

    /// `run --rm <task> [args]`: a one-shot compose service.
    pub fn run_task(&self, task: &str, args: &[String]) -> Result<CapturedOutput> {
        let span = info_span!("gateway", operation = "run", task = task);
        let _enter = span.enter();

        let mut run_args = vec!["--rm".to_string(), task.to_string()];
        run_args.extend(args.iter().cloned());
        self.runtime.compose(&self.ctx, "run", &run_args)
    }

    /// Remove any leftover containers of a one-shot task.
    pub fn remove_task(&self, task: &str) -> Result<CapturedOutput> {
        self.runtime.compose(
            &self.ctx,
            "rm",
            &["-f".to_string(), "-s".to_string(), task.to_string()],
        )
    }

    /// Turn a failed invocation into a classified error carrying its output.
    pub fn classify_failure(&self, operation: Operation, output: &CapturedOutput) -> StackError {
        let combined = output.combined();
        let kind = match self.classifier.classify(&combined) {
            Classification::Failure { kind, .. } => kind,
            Classification::NoError => FailureKind::GenericStartup,
        };
        warn!(kind = %kind, exit_code = output.exit_code, "{} failed", operation);
        StackError::classified(
            kind,
            format!("{} failed with exit code {}", operation, output.exit_code),
            combined,
        )
    }

    /// Log in once per distinct token value. A failed login is reported and
    /// the operation proceeds; public images still work.
    fn ensure_logged_in(&self) {
        let Some(token) = self.token.as_deref() else {
            return;
        };
        if self.logged_in_with.borrow().as_deref() == Some(token) {
            debug!("Registry login already done for this token");
            return;
        }

        match RegistryLogin::new(self.runtime, &self.registry).login(token) {
            Ok(user) => {
                info!(registry = %self.registry, "Logged in to registry");
                debug!("Registry login succeeded with user strategy '{}'", redact_user(&user, token));
                *self.logged_in_with.borrow_mut() = Some(token.to_string());
            }
            Err(failure) => {
                stack_warning!(
                    "{}",
                    msg!(
                        MESSAGES.registry_login_failed,
                        registry = self.registry.as_str(),
                        reason = failure.to_string()
                    )
                );
                warn!(registry = %self.registry, "Registry login failed: {}", failure);
            }
        }
    }

    pub fn containers(&self, name: &str) -> Result<Vec<ContainerInfo>> {
        self.runtime.containers(name)
    }

    /// The container named exactly `name`, if it exists.
    pub fn container(&self, name: &str) -> Result<Option<ContainerInfo>> {
        Ok(self
            .runtime
            .containers(name)?
            .into_iter()
            .find(|c| c.name == name))
    }

    pub fn volumes(&self, filter: Option<&str>) -> Result<Vec<String>> {
        self.runtime.volumes(filter)
    }

    pub fn volume_exists(&self, name: &str) -> Result<bool> {
        Ok(self.runtime.volumes(Some(name))?.iter().any(|v| v == name))
    }

    pub fn containers_using_volume(&self, volume: &str) -> Result<Vec<String>> {
        self.runtime.containers_using_volume(volume)
    }

    pub fn remove_volume(&self, volume: &str) -> Result<CapturedOutput> {
        info!("Removing volume {}", volume);
        self.runtime.remove_volume(volume)
    }

    pub fn networks(&self) -> Result<Vec<String>> {
        self.runtime.networks()
    }

    pub fn inspect_network(&self, name: &str) -> Result<Option<NetworkDescriptor>> {
        self.runtime.inspect_network(name)
    }

    pub fn remove_network(&self, name: &str) -> Result<CapturedOutput> {
        info!("Removing network {}", name);
        self.runtime.remove_network(name)
    }

    /// Compose prefixes named volumes with the project name.
    pub fn project_volume(&self, volume: &str) -> String {
        format!("{}_{}", self.ctx.project_name, volume)
    }
}

fn redact_user<'u>(user: &'u str, token: &str) -> &'u str {
    if user == token {
        "token"
    } else {
        user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Rule;
    use stack_runtime::mock::FakeRuntime;

    fn ctx() -> EnvironmentContext {
        EnvironmentContext::fixed("/opt/stack/docker-compose.yml", "stack")
    }

    #[test]
    fn test_operation_parsing() {
        assert_eq!("start".parse::<Operation>().unwrap(), Operation::Start);
        assert_eq!("ps".parse::<Operation>().unwrap(), Operation::Status);
        assert!("explode".parse::<Operation>().is_err());
    }

    #[test]
    fn test_auth_only_for_fetching_operations() {
        let needs: Vec<_> = [
            Operation::Up,
            Operation::Start,
            Operation::Down,
            Operation::Stop,
            Operation::Restart,
            Operation::Pull,
            Operation::Logs,
            Operation::Status,
            Operation::Exec,
            Operation::Config,
            Operation::Validate,
            Operation::Remove,
        ]
        .into_iter()
        .filter(|op| op.requires_auth())
        .collect();
        assert_eq!(
            needs,
            vec![Operation::Up, Operation::Start, Operation::Restart, Operation::Pull]
        );
    }

    #[test]
    fn test_login_once_per_token() {
        let fake = FakeRuntime::new();
        let gateway = Gateway::new(&fake, ctx(), &Settings::default())
            .with_token(Some("ghp_one".to_string()));

        gateway.execute(Operation::Pull, None, &[]).unwrap();
        gateway.execute(Operation::Up, None, &[]).unwrap();
        gateway.execute(Operation::Restart, Some(Service::Backend), &[]).unwrap();
        assert_eq!(fake.calls_matching("login").len(), 1);
    }

    #[test]
    fn test_new_token_logs_in_again() {
        let fake = FakeRuntime::new();
        let gateway = Gateway::new(&fake, ctx(), &Settings::default())
            .with_token(Some("ghp_one".to_string()));
        gateway.execute(Operation::Pull, None, &[]).unwrap();

        let gateway = gateway.with_token(Some("ghp_two".to_string()));
        gateway.execute(Operation::Pull, None, &[]).unwrap();
        assert_eq!(fake.calls_matching("login").len(), 2);
    }

    #[test]
    fn test_read_only_operations_never_log_in() {
        let fake = FakeRuntime::new();
        let gateway = Gateway::new(&fake, ctx(), &Settings::default())
            .with_token(Some("ghp_one".to_string()));
        gateway.execute(Operation::Logs, None, &[]).unwrap();
        gateway.execute(Operation::Status, None, &[]).unwrap();
        gateway.execute(Operation::Stop, None, &[]).unwrap();
        assert!(fake.calls_matching("login").is_empty());
    }

    #[test]
    fn test_failed_login_does_not_block_operation() {
        let fake = FakeRuntime::new();
        fake.script("login", CapturedOutput::failed("dial tcp: i/o timeout", 1));
        let gateway = Gateway::new(&fake, ctx(), &Settings::default())
            .with_token(Some("ghp_one".to_string()));

        let out = gateway.execute(Operation::Pull, Some(Service::Frontend), &[]).unwrap();
        assert!(out.success());
        assert!(fake.calls().contains(&"compose pull frontend".to_string()));
    }

    #[test]
    fn test_failed_start_is_classified_with_output() {
        let fake = FakeRuntime::new();
        fake.script(
            "up",
            CapturedOutput::failed(
                "Error response from daemon: driver failed programming external connectivity: Bind for 0.0.0.0:80 failed: port is already allocated",
                1,
            ),
        );
        let gateway = Gateway::new(&fake, ctx(), &Settings::default());

        let err = gateway.execute(Operation::Up, None, &[]).unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::PortConflict));
        assert!(err.output().unwrap().contains("port is already allocated"));
    }

    #[test]
    fn test_exec_places_command_after_service() {
        let fake = FakeRuntime::new();
        let gateway = Gateway::new(&fake, ctx(), &Settings::default());
        gateway
            .execute(
                Operation::Exec,
                Some(Service::Backend),
                &["ls".to_string(), "-la".to_string()],
            )
            .unwrap();
        assert_eq!(fake.calls(), vec!["compose exec -T backend ls -la".to_string()]);
        assert!(gateway.execute(Operation::Exec, None, &[]).is_err());
    }

    #[test]
    fn test_store_token_is_used_for_login() {
        let fake = FakeRuntime::new();
        let store = EnvStore::parse("GITHUB_TOKEN=ghp_stored\n");
        let gateway = Gateway::new(&fake, ctx(), &Settings::default()).with_store_token(&store);
        gateway.execute(Operation::Pull, None, &[]).unwrap();
        assert_eq!(fake.calls_matching("login").len(), 1);

        let fake = FakeRuntime::new();
        let blank = EnvStore::parse("GITHUB_TOKEN=\n");
        let gateway = Gateway::new(&fake, ctx(), &Settings::default()).with_store_token(&blank);
        gateway.execute(Operation::Pull, None, &[]).unwrap();
        assert!(fake.calls_matching("login").is_empty());
    }

    #[test]
    fn test_custom_classifier_rule() {
        let fake = FakeRuntime::new();
        fake.script("up", CapturedOutput::failed("overlay quota exceeded for /var/lib/docker", 1));
        let classifier = Classifier::new().with_rule(Rule::matching(
            FailureKind::DiskSpace,
            &[r"quota exceeded"],
        ));
        let gateway = Gateway::new(&fake, ctx(), &Settings::default()).with_classifier(classifier);

        let err = gateway.execute(Operation::Up, None, &[]).unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::DiskSpace));
    }

    #[test]
    fn test_project_volume_name() {
        let fake = FakeRuntime::new();
        let gateway = Gateway::new(&fake, ctx(), &Settings::default());
        assert_eq!(gateway.project_volume("postgres_data"), "stack_postgres_data");
    }
}
