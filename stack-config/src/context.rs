//! Environment context resolution.
//!
//! Works out which compose file, override file, env file and project name
//! apply to this invocation. The result is passed explicitly to every
//! component; nothing is stored globally.

use std::path::{Path, PathBuf};

use stack_core::error::{Result, StackError};
use stack_core::file_system::{first_existing_file, unique_dirs};
use tracing::{debug, warn};

use crate::env_store::EnvStore;

pub const DEFAULT_INSTALL_ROOT: &str = "/opt/stack";
pub const DEFAULT_PROJECT_NAME: &str = "stack";

const COMPOSE_FILE_NAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];
const OVERRIDE_FILE_NAMES: &[&str] = &[
    "docker-compose.override.yml",
    "docker-compose.override.yaml",
    "compose.override.yml",
    "compose.override.yaml",
];
const ENV_FILE_NAME: &str = ".env";

/// Inputs for [`EnvironmentContext::resolve`].
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub env_file: Option<PathBuf>,
    pub compose_file: Option<PathBuf>,
    pub project_name: Option<String>,
    pub install_root: PathBuf,
    pub working_dir: PathBuf,
}

impl ContextOptions {
    pub fn new(install_root: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            env_file: None,
            compose_file: None,
            project_name: None,
            install_root: install_root.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn with_env_file(mut self, path: Option<PathBuf>) -> Self {
        self.env_file = path;
        self
    }

    pub fn with_compose_file(mut self, path: Option<PathBuf>) -> Self {
        self.compose_file = path;
        self
    }

    pub fn with_project_name(mut self, name: Option<String>) -> Self {
        self.project_name = name;
        self
    }

    /// Conventional locations in priority order: install root, its parent,
    /// then the working directory.
    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.install_root.clone()];
        if let Some(parent) = self.install_root.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.push(parent.to_path_buf());
            }
        }
        dirs.push(self.working_dir.clone());
        unique_dirs(dirs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentContext {
    pub env_file: Option<PathBuf>,
    pub compose_file: PathBuf,
    pub override_file: Option<PathBuf>,
    pub project_name: String,
}

impl EnvironmentContext {
    /// Resolve the context from the filesystem.
    ///
    /// A missing compose file is fatal. A missing env file is not: the
    /// runtime defaults apply and a degraded-mode warning is logged.
    pub fn resolve(options: &ContextOptions) -> Result<Self> {
        let compose_file = resolve_compose_file(options)?;
        let compose_dir = compose_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| options.working_dir.clone());

        let env_file = resolve_env_file(options, &compose_dir)?;
        if env_file.is_none() {
            warn!(
                "No {} file found near {}; running in degraded mode with runtime defaults",
                ENV_FILE_NAME,
                compose_file.display()
            );
        }

        let override_file = first_existing_file(&compose_dir, OVERRIDE_FILE_NAMES);
        let project_name = resolve_project_name(options, env_file.as_deref(), &compose_dir);

        let context = Self {
            env_file,
            compose_file,
            override_file,
            project_name,
        };
        debug!(?context, "Resolved environment context");
        Ok(context)
    }

    /// Directory holding the compose file (and `stackctl.yaml`).
    pub fn compose_dir(&self) -> &Path {
        self.compose_file.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn is_degraded(&self) -> bool {
        self.env_file.is_none()
    }

    /// Load the env store behind this context (empty in degraded mode).
    pub fn load_store(&self) -> Result<EnvStore> {
        EnvStore::load_optional(self.env_file.as_deref())
    }

    /// A context for tests and dry runs that never touches the filesystem.
    pub fn fixed(compose_file: impl Into<PathBuf>, project_name: impl Into<String>) -> Self {
        Self {
            env_file: None,
            compose_file: compose_file.into(),
            override_file: None,
            project_name: project_name.into(),
        }
    }
}

fn resolve_compose_file(options: &ContextOptions) -> Result<PathBuf> {
    if let Some(explicit) = &options.compose_file {
        return if explicit.is_file() {
            Ok(explicit.clone())
        } else {
            Err(StackError::Configuration(format!(
                "Compose file '{}' does not exist",
                explicit.display()
            )))
        };
    }

    let dirs = options.search_dirs();
    dirs.iter()
        .find_map(|dir| first_existing_file(dir, COMPOSE_FILE_NAMES))
        .ok_or_else(|| {
            StackError::Configuration(format!(
                "No compose file found (looked in {})",
                dirs.iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

fn resolve_env_file(options: &ContextOptions, compose_dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(explicit) = &options.env_file {
        return if explicit.is_file() {
            Ok(Some(explicit.clone()))
        } else {
            Err(StackError::Configuration(format!(
                "Environment file '{}' does not exist",
                explicit.display()
            )))
        };
    }

    let mut dirs = vec![compose_dir.to_path_buf()];
    dirs.extend(options.search_dirs());
    Ok(unique_dirs(dirs)
        .iter()
        .find_map(|dir| first_existing_file(dir, &[ENV_FILE_NAME])))
}

fn resolve_project_name(
    options: &ContextOptions,
    env_file: Option<&Path>,
    compose_dir: &Path,
) -> String {
    if let Some(name) = options.project_name.as_deref().map(sanitize_project_name) {
        if !name.is_empty() {
            return name;
        }
    }

    let from_store = env_file
        .and_then(|path| EnvStore::load(path).ok())
        .and_then(|store| store.get_non_empty("COMPOSE_PROJECT_NAME"))
        .map(|name| sanitize_project_name(&name))
        .filter(|name| !name.is_empty());
    if let Some(name) = from_store {
        return name;
    }

    compose_dir
        .file_name()
        .map(|n| sanitize_project_name(&n.to_string_lossy()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string())
}

/// Compose project names are lowercase alphanumerics, `-` and `_`, and must
/// start with a letter or digit.
pub fn sanitize_project_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    cleaned
        .trim_start_matches(|c: char| c == '-' || c == '_')
        .to_string()
}
