//! Credential Mismatch Detector/Resolver.
//!
//! PostgreSQL only applies `POSTGRES_USER`/`POSTGRES_PASSWORD` when it
//! initialises an empty data volume. If the env store was regenerated
//! after that, the stored credentials no longer open the existing
//! database. Detection probes the database with the stored credentials;
//! resolution throws the data volume away so it is initialised again.

use stack_config::services::container_name;
use stack_config::{CredentialSet, Service, Settings};
use stack_core::error::{Result, StackError};
use stack_core::{stack_error, stack_info, stack_success, stack_warning, CapturedOutput, FailureKind};
use stack_messages::{msg, MESSAGES};
use tracing::{debug, info, info_span, warn};

use crate::gateway::{Gateway, Operation};
use crate::poll::{poll_until, Clock, PollPolicy};
use crate::prompt::Confirm;

/// `SELECT 1` against the container's own network address. The image trusts
/// loopback and socket connections without a password, so the probe must
/// not go through either of them.
const PROBE_SCRIPT: &str =
    r#"exec psql -h "$(hostname -i | cut -d ' ' -f1)" -tAc "SELECT 1""#;

pub struct CredentialChecker<'a> {
    gateway: &'a Gateway<'a>,
    clock: &'a dyn Clock,
    credentials: CredentialSet,
    container: String,
    volumes: Vec<String>,
    probe_policy: PollPolicy,
    quiet: bool,
}

/// Stops the database again when the probe was the one that started it.
struct ProbeGuard<'g> {
    gateway: &'g Gateway<'g>,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        debug!("Stopping database started for the credential probe");
        match self
            .gateway
            .execute(Operation::Stop, Some(Service::Database), &[])
        {
            Ok(output) if output.success() => {}
            Ok(output) => warn!(
                "Failed to stop database after probe: {}",
                output.combined().trim()
            ),
            Err(e) => warn!("Failed to stop database after probe: {}", e),
        }
    }
}

impl<'a> CredentialChecker<'a> {
    pub fn new(
        gateway: &'a Gateway<'a>,
        settings: &Settings,
        credentials: CredentialSet,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            gateway,
            clock,
            credentials,
            container: container_name(&settings.container_prefix, Service::Database),
            volumes: settings
                .database_volumes
                .iter()
                .map(|v| gateway.project_volume(v))
                .collect(),
            probe_policy: PollPolicy::new(settings.probe_timeout(), settings.poll_interval()),
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Data volumes of this project that currently exist.
    fn existing_volumes(&self) -> Result<Vec<String>> {
        let mut existing = Vec::new();
        for volume in &self.volumes {
            if self.gateway.volume_exists(volume)? {
                existing.push(volume.clone());
            }
        }
        Ok(existing)
    }

    /// True when database artifacts exist that the stored credentials
    /// cannot open.
    pub fn detect_mismatch(&self) -> Result<bool> {
        let span = info_span!("credentials_detect", service = "database");
        let _enter = span.enter();

        if !self.quiet {
            stack_info!("{}", MESSAGES.credentials_checking);
        }

        let container = self.gateway.container(&self.container)?;
        let volumes = self.existing_volumes()?;
        if container.is_none() && volumes.is_empty() {
            debug!("No database container or volume; fresh install");
            return Ok(false);
        }

        if !self.credentials.is_complete() {
            warn!(
                "Database data exists but credentials are incomplete (missing {})",
                self.credentials.missing_keys().join(", ")
            );
            self.report_mismatch();
            return Ok(true);
        }

        let already_running = container.as_ref().is_some_and(|c| c.is_running());
        let _guard = if already_running {
            None
        } else {
            info!("Starting database for the credential probe");
            // Armed before `up` so a half-started database is stopped too.
            let guard = ProbeGuard {
                gateway: self.gateway,
            };
            self.gateway
                .execute(Operation::Up, Some(Service::Database), &[])?;
            Some(guard)
        };

        let mismatch = self.probe_until_conclusive()?;
        if mismatch {
            self.report_mismatch();
        } else if !self.quiet {
            stack_success!("{}", MESSAGES.credentials_ok);
        }
        Ok(mismatch)
    }

    /// Retry the probe while the database is still coming up. An
    /// authentication failure is conclusive straight away; any other
    /// failure still standing at the timeout also counts as a mismatch.
    fn probe_until_conclusive(&self) -> Result<bool> {
        let mut last: Option<CapturedOutput> = None;
        let conclusive = poll_until(&self.probe_policy, self.clock, |attempt| {
            let output = self.probe()?;
            let done = output.success()
                || self.gateway.classifier().classify(&output.combined()).kind()
                    == Some(FailureKind::DatabaseAuth);
            debug!(attempt, exit_code = output.exit_code, done, "Credential probe");
            last = Some(output);
            Ok(done)
        })?;
        if !conclusive {
            warn!(
                "Database probe inconclusive after {:?}; treating as mismatch",
                self.probe_policy.timeout
            );
        }
        Ok(last.map_or(true, |output| !output.success()))
    }

    /// Authenticated `SELECT 1` with the stored credentials. They travel
    /// as libpq environment variables and stay off the command line.
    fn probe(&self) -> Result<CapturedOutput> {
        let user = self.credentials.user.as_deref().unwrap_or_default();
        let password = self.credentials.password.as_deref().unwrap_or_default();
        let database = self.credentials.database_name().unwrap_or(user);
        let command = vec!["sh".to_string(), "-c".to_string(), PROBE_SCRIPT.to_string()];
        self.gateway.exec_with_env(
            Service::Database,
            &[("PGUSER", user), ("PGPASSWORD", password), ("PGDATABASE", database)],
            &command,
        )
    }

    fn report_mismatch(&self) {
        if !self.quiet {
            stack_warning!("{}", MESSAGES.credentials_mismatch);
        }
    }

    /// Remove the database containers and data volumes so the next start
    /// initialises them with the stored credentials. Returns `false` when
    /// the operator declines or nothing could be removed safely.
    pub fn resolve_mismatch(&self, interactive: bool, confirm: &dyn Confirm) -> Result<bool> {
        let span = info_span!("credentials_resolve", service = "database");
        let _enter = span.enter();

        if interactive && !confirm.confirm(MESSAGES.credentials_confirm_reset, true) {
            if !self.quiet {
                stack_info!("{}", MESSAGES.credentials_reset_declined);
            }
            return Ok(false);
        }

        // Checked before anything is removed; the database's own container
        // goes away with the reset.
        let volumes = self.existing_volumes()?;
        let mut in_use = Vec::new();
        for volume in &volumes {
            let users: Vec<String> = self
                .gateway
                .containers_using_volume(volume)?
                .into_iter()
                .filter(|name| *name != self.container)
                .collect();
            if !users.is_empty() {
                in_use.push(format!("{} (used by {})", volume, users.join(", ")));
            }
        }
        if !in_use.is_empty() {
            return self.fail(format!("volume still in use: {}", in_use.join("; ")));
        }

        let removed = self
            .gateway
            .execute(Operation::Remove, Some(Service::Database), &[])?;
        if !removed.success() {
            return self.fail(format!(
                "could not remove database container: {}",
                removed.combined().trim()
            ));
        }

        for volume in &volumes {
            let output = self.gateway.remove_volume(volume)?;
            if !output.success() {
                return self.fail(format!(
                    "could not remove volume {}: {}",
                    volume,
                    output.combined().trim()
                ));
            }
        }

        info!(volumes = volumes.len(), "Database volumes removed");
        if !self.quiet {
            stack_success!("{}", MESSAGES.credentials_reset_done);
        }
        Ok(true)
    }

    fn fail(&self, reason: String) -> Result<bool> {
        warn!("Credential reset failed: {}", reason);
        if !self.quiet {
            stack_error!("{}", msg!(MESSAGES.credentials_reset_failed, error = reason));
        }
        Ok(false)
    }
}

/// Error reported when a mismatch is left unresolved.
pub fn unresolved_mismatch_error() -> StackError {
    StackError::classified(
        FailureKind::DatabaseAuth,
        "stored database credentials do not match the existing database volume",
        String::new(),
    )
}
