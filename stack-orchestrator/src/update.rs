//! Zero-Downtime Update Orchestrator.
//!
//! Moves one service to a new image tag: persist the tag, pull, migrate
//! (backend only), recreate, then wait for health. Until the container is
//! recreated the old version keeps serving, so any failure before that
//! point only needs the persisted tag put back.

use std::fmt;

use stack_config::{EnvStore, Service, Settings};
use stack_core::error::{Result, StackError};
use stack_core::{stack_error, stack_info, stack_success, stack_warning, FailureKind};
use stack_messages::{msg, MESSAGES};
use tracing::{debug, info, info_span, warn};

use crate::gateway::{Gateway, Operation};
use crate::health::HealthEngine;
use crate::poll::PollPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub service: Service,
    pub new_tag: String,
    pub previous_tag: String,
    pub requires_migration: bool,
}

impl UpdatePlan {
    /// Plan an update, taking the previous tag from the env store.
    pub fn new(service: Service, new_tag: impl Into<String>, store: &EnvStore) -> Self {
        let previous_tag = store
            .get_non_empty(service.version_key())
            .unwrap_or_else(|| service.default_tag().to_string());
        Self {
            service,
            new_tag: new_tag.into(),
            previous_tag,
            requires_migration: service.requires_migration(),
        }
    }

    pub fn with_previous_tag(mut self, tag: impl Into<String>) -> Self {
        self.previous_tag = tag.into();
        self
    }

    /// Parse `service=tag`.
    pub fn parse(spec: &str, store: &EnvStore) -> Result<Self> {
        let (service, tag) = spec.split_once('=').ok_or_else(|| {
            StackError::Configuration(format!(
                "Invalid update '{}'; expected SERVICE=TAG",
                spec
            ))
        })?;
        let tag = tag.trim();
        if tag.is_empty() || tag.contains(char::is_whitespace) {
            return Err(StackError::Configuration(format!(
                "Invalid tag '{}' for {}",
                tag, service
            )));
        }
        Ok(Self::new(service.parse()?, tag, store))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Pulling,
    PullFailed,
    Migrating,
    MigrationFailed,
    MigrationOk,
    RolledBack,
    Restarting,
    HealthPolling,
    Succeeded,
    TimedOut,
    Failed,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
pub struct UpdateResult {
    pub plan: UpdatePlan,
    pub transitions: Vec<UpdateState>,
    pub error: Option<StackError>,
}

impl UpdateResult {
    fn new(plan: UpdatePlan) -> Self {
        Self {
            plan,
            transitions: vec![UpdateState::Idle],
            error: None,
        }
    }

    fn enter(&mut self, state: UpdateState) {
        debug!(service = self.plan.service.name(), %state, "Update state");
        self.transitions.push(state);
    }

    fn fail(mut self, state: UpdateState, error: StackError) -> Self {
        self.enter(state);
        self.error = Some(error);
        self
    }

    pub fn state(&self) -> UpdateState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(UpdateState::Idle)
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.state() == UpdateState::Succeeded
    }
}

#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub results: Vec<UpdateResult>,
}

impl UpdateSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Category of the first failure, for the process exit code.
    pub fn first_failure(&self) -> Option<&StackError> {
        self.results.iter().find_map(|r| r.error.as_ref())
    }
}

pub struct UpdateOrchestrator<'a> {
    gateway: &'a Gateway<'a>,
    health: &'a HealthEngine<'a>,
    migration_task: String,
    migration_command: Vec<String>,
    health_policy: PollPolicy,
    quiet: bool,
}

impl<'a> UpdateOrchestrator<'a> {
    pub fn new(gateway: &'a Gateway<'a>, health: &'a HealthEngine<'a>, settings: &Settings) -> Self {
        Self {
            gateway,
            health,
            migration_task: settings.migration_task.clone(),
            migration_command: settings.migration_command.clone(),
            health_policy: PollPolicy::attempts(
                settings.update_health_attempts,
                settings.poll_interval(),
            ),
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Run one plan to completion. Failures are reported in the result,
    /// never as `Err`.
    pub fn update(&self, plan: UpdatePlan, store: &mut EnvStore) -> UpdateResult {
        let span = info_span!("update", service = plan.service.name(), tag = %plan.new_tag);
        let _enter = span.enter();

        if !self.quiet {
            stack_info!(
                "{}",
                msg!(
                    MESSAGES.update_starting,
                    service = plan.service.name(),
                    previous = plan.previous_tag.as_str(),
                    tag = plan.new_tag.as_str()
                )
            );
        }

        let result = self.run(UpdateResult::new(plan), store);
        self.report(&result);
        result
    }

    fn run(&self, mut result: UpdateResult, store: &mut EnvStore) -> UpdateResult {
        let service = result.plan.service;
        let version_key = service.version_key();

        // Pulling
        result.enter(UpdateState::Pulling);
        if let Err(e) = persist_tag(store, version_key, &result.plan.new_tag) {
            return result.fail(UpdateState::Failed, e);
        }
        let pull = match self.gateway.execute(Operation::Pull, Some(service), &[]) {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(self.gateway.classify_failure(Operation::Pull, &output)),
            Err(e) => Err(e),
        };
        if let Err(e) = pull {
            result.enter(UpdateState::PullFailed);
            return self.roll_back(result, store, e);
        }

        // Migrating
        if result.plan.requires_migration {
            result.enter(UpdateState::Migrating);
            match self
                .gateway
                .run_task(&self.migration_task, &self.migration_command)
            {
                Ok(output) if output.success() => {
                    result.enter(UpdateState::MigrationOk);
                    if let Ok(cleanup) = self.gateway.remove_task(&self.migration_task) {
                        if !cleanup.success() {
                            debug!("Migration task cleanup: {}", cleanup.combined().trim());
                        }
                    }
                }
                Ok(output) => {
                    result.enter(UpdateState::MigrationFailed);
                    let error = StackError::Migration(format!(
                        "{} exited with code {}: {}",
                        self.migration_task,
                        output.exit_code,
                        output.tail(20)
                    ));
                    return self.roll_back(result, store, error);
                }
                Err(e) => {
                    result.enter(UpdateState::MigrationFailed);
                    return self.roll_back(result, store, StackError::Migration(e.to_string()));
                }
            }
        }

        // Restarting
        result.enter(UpdateState::Restarting);
        match self.gateway.execute(Operation::Restart, Some(service), &[]) {
            Ok(output) if output.success() => {}
            Ok(output) => {
                let error = self.gateway.classify_failure(Operation::Restart, &output);
                return result.fail(UpdateState::Failed, error);
            }
            Err(e) => return result.fail(UpdateState::Failed, e),
        }

        // HealthPolling
        result.enter(UpdateState::HealthPolling);
        match self
            .health
            .wait_until_healthy(Some(service), &self.health_policy)
        {
            Ok(true) => {
                result.enter(UpdateState::Succeeded);
                result
            }
            Ok(false) => {
                let error = StackError::HealthCheckTimeout(format!(
                    "{} did not become healthy after {} checks",
                    service,
                    self.health_policy.max_attempts.unwrap_or_default()
                ));
                result.fail(UpdateState::TimedOut, error)
            }
            Err(e) => result.fail(UpdateState::Failed, e),
        }
    }

    /// Put the previous tag back. Running containers were never touched.
    /// When the tag cannot be restored the error says so, since the env
    /// store is left holding the failed tag.
    fn roll_back(&self, mut result: UpdateResult, store: &mut EnvStore, error: StackError) -> UpdateResult {
        let key = result.plan.service.version_key();
        let error = match persist_tag(store, key, &result.plan.previous_tag) {
            Ok(()) => {
                info!(tag = %result.plan.previous_tag, "Version tag rolled back");
                result.enter(UpdateState::RolledBack);
                error
            }
            Err(e) => {
                warn!("Failed to restore previous tag: {}", e);
                let note = format!(
                    "rollback failed: {} still holds {} instead of {} ({})",
                    key, result.plan.new_tag, result.plan.previous_tag, e
                );
                append_note(error, &note)
            }
        };
        result.error = Some(error);
        result
    }

    fn report(&self, result: &UpdateResult) {
        let plan = &result.plan;
        match &result.error {
            None => {
                if !self.quiet {
                    stack_success!(
                        "{}",
                        msg!(
                            MESSAGES.update_success,
                            service = plan.service.name(),
                            tag = plan.new_tag.as_str()
                        )
                    );
                }
            }
            Some(error) => {
                warn!(kind = ?error.kind(), "Update failed: {}", error);
                if self.quiet {
                    return;
                }
                stack_error!(
                    "{}",
                    msg!(
                        MESSAGES.update_failed,
                        service = plan.service.name(),
                        error = error.to_string()
                    )
                );
                if result.transitions.contains(&UpdateState::RolledBack) {
                    stack_warning!(
                        "{}",
                        msg!(
                            MESSAGES.update_rolled_back,
                            service = plan.service.name(),
                            tag = plan.previous_tag.as_str()
                        )
                    );
                }
            }
        }
    }

    /// Run plans one after another; a failure never stops later plans.
    pub fn update_all(&self, plans: Vec<UpdatePlan>, store: &mut EnvStore) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        for plan in plans {
            summary.results.push(self.update(plan, store));
        }
        if !self.quiet {
            stack_info!(
                "{}",
                msg!(
                    MESSAGES.update_summary,
                    succeeded = summary.succeeded().to_string(),
                    failed = summary.failed().to_string()
                )
            );
        }
        summary
    }
}

fn persist_tag(store: &mut EnvStore, key: &str, tag: &str) -> Result<()> {
    store.set(key, tag);
    store.save()
}

/// Extend the message of `error`, keeping its category.
fn append_note(error: StackError, note: &str) -> StackError {
    match error {
        StackError::Classified {
            kind,
            message,
            output,
        } => StackError::classified(kind, format!("{}; {}", message, note), output),
        StackError::Migration(message) => StackError::Migration(format!("{}; {}", message, note)),
        other => StackError::classified(
            other.kind().unwrap_or(FailureKind::GenericStartup),
            format!("{}; {}", other, note),
            String::new(),
        ),
    }
}

/// Exit category for a finished update run.
pub fn summary_error(summary: &UpdateSummary) -> Option<StackError> {
    let first = summary.first_failure()?;
    let kind = first.kind().unwrap_or(FailureKind::GenericStartup);
    Some(StackError::classified(
        kind,
        format!(
            "{} of {} update(s) failed: {}",
            summary.failed(),
            summary.results.len(),
            first
        ),
        first.output().unwrap_or_default().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_takes_previous_tag_from_store() {
        let store = EnvStore::parse("BACKEND_VERSION=1.2.0\n");
        let plan = UpdatePlan::parse("backend=1.3.0", &store).unwrap();
        assert_eq!(plan.service, Service::Backend);
        assert_eq!(plan.previous_tag, "1.2.0");
        assert_eq!(plan.new_tag, "1.3.0");
        assert!(plan.requires_migration);

        let plan = UpdatePlan::parse("frontend=2.0.0", &store).unwrap();
        assert_eq!(plan.previous_tag, "latest");
        assert!(!plan.requires_migration);
    }

    #[test]
    fn test_plan_parse_errors() {
        let store = EnvStore::empty();
        assert!(UpdatePlan::parse("backend", &store).is_err());
        assert!(UpdatePlan::parse("backend=", &store).is_err());
        assert!(UpdatePlan::parse("redis=7", &store).is_err());
    }
}
