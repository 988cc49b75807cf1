//! Tunables for the orchestrator.
//!
//! Defaults cover a standard install. An optional `stackctl.yaml` next to
//! the compose file overrides them, and a few env store keys override that.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stack_core::error::{Result, StackError};
use tracing::debug;

use crate::env_store::EnvStore;

pub const SETTINGS_FILE_NAME: &str = "stackctl.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Container names are `<container_prefix>-<service>`.
    pub container_prefix: String,
    pub registry: String,
    pub image_namespace: String,
    /// Subnet the project network is expected to own.
    pub network_subnet: String,
    pub health_timeout_secs: u64,
    pub poll_interval_secs: u64,
    /// Health polls after restarting an updated service.
    pub update_health_attempts: u32,
    /// Compose service that runs schema migrations to completion.
    pub migration_task: String,
    /// Command passed to the migration task; empty keeps the image default.
    pub migration_command: Vec<String>,
    /// Compose volume names (without the project prefix) holding database data.
    pub database_volumes: Vec<String>,
    pub probe_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            container_prefix: "stack".to_string(),
            registry: "ghcr.io".to_string(),
            image_namespace: "stack-platform".to_string(),
            network_subnet: "172.20.0.0/16".to_string(),
            health_timeout_secs: 180,
            poll_interval_secs: 5,
            update_health_attempts: 12,
            migration_task: "migrate".to_string(),
            migration_command: Vec::new(),
            database_volumes: vec!["postgres_data".to_string()],
            probe_timeout_secs: 60,
        }
    }
}

impl Settings {
    /// Load `stackctl.yaml` from `dir` when present, then apply env overrides.
    pub fn load(dir: &Path, store: &EnvStore) -> Result<Self> {
        let path = Self::settings_path(dir);
        let mut settings = if path.is_file() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        settings.apply_env_overrides(store);
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_yaml_ng::from_str(&content).map_err(|e| {
            StackError::Configuration(format!("Invalid settings file '{}': {}", path.display(), e))
        })?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn apply_env_overrides(&mut self, store: &EnvStore) {
        if let Some(prefix) = store.get_non_empty("STACK_CONTAINER_PREFIX") {
            self.container_prefix = prefix;
        }
        if let Some(subnet) = store.get_non_empty("STACK_SUBNET") {
            self.network_subnet = subnet;
        }
        if let Some(registry) = store.get_non_empty("STACK_REGISTRY") {
            self.registry = registry;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.container_prefix.trim().is_empty() {
            return Err(StackError::Configuration(
                "container_prefix must not be empty".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(StackError::Configuration(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.update_health_attempts == 0 {
            return Err(StackError::Configuration(
                "update_health_attempts must be at least 1".to_string(),
            ));
        }
        if self.database_volumes.is_empty() {
            return Err(StackError::Configuration(
                "database_volumes must name at least one volume".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn settings_path(dir: &Path) -> PathBuf {
        dir.join(SETTINGS_FILE_NAME)
    }
}
