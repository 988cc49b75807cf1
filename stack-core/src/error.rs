use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Failure categories surfaced to the operator.
///
/// Every category maps to a distinct process exit code and carries a default
/// remediation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Configuration,
    RegistryAuth,
    ImageNotFound,
    DatabaseAuth,
    Network,
    NetworkConflict,
    PortConflict,
    DiskSpace,
    HealthCheckTimeout,
    Migration,
    GenericStartup,
}

impl FailureKind {
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::GenericStartup => 1,
            FailureKind::Configuration => 2,
            FailureKind::RegistryAuth => 3,
            FailureKind::ImageNotFound => 4,
            FailureKind::DatabaseAuth => 5,
            FailureKind::Network => 6,
            FailureKind::NetworkConflict => 7,
            FailureKind::PortConflict => 8,
            FailureKind::DiskSpace => 9,
            FailureKind::HealthCheckTimeout => 10,
            FailureKind::Migration => 11,
        }
    }

    pub fn remediation(self) -> &'static str {
        match self {
            FailureKind::Configuration => {
                "Check that docker-compose.yml and .env exist in the install directory, or pass --compose-file / --env-file"
            }
            FailureKind::RegistryAuth => {
                "Check GITHUB_TOKEN in .env; the token needs read:packages scope"
            }
            FailureKind::ImageNotFound => {
                "Check the version tags in .env and that the registry token can read the images"
            }
            FailureKind::DatabaseAuth => {
                "Stored database credentials do not match the existing volume; run: stackctl credentials fix"
            }
            FailureKind::Network => {
                "Check internet connectivity and DNS, then retry"
            }
            FailureKind::NetworkConflict => {
                "Another Docker network uses the same subnet; run: stackctl network fix"
            }
            FailureKind::PortConflict => {
                "A required port is already in use; stop the conflicting process (see: ss -ltnp)"
            }
            FailureKind::DiskSpace => {
                "Free disk space (docker system prune) and retry"
            }
            FailureKind::HealthCheckTimeout => {
                "Inspect the service logs: stackctl logs <service>"
            }
            FailureKind::Migration => {
                "The previous version is still running; inspect the migration output before retrying"
            }
            FailureKind::GenericStartup => {
                "Inspect the output above and the service logs: stackctl logs"
            }
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            FailureKind::Configuration => "ConfigurationError",
            FailureKind::RegistryAuth => "RegistryAuthError",
            FailureKind::ImageNotFound => "ImageNotFoundError",
            FailureKind::DatabaseAuth => "DatabaseAuthError",
            FailureKind::Network => "NetworkError",
            FailureKind::NetworkConflict => "NetworkConflictError",
            FailureKind::PortConflict => "PortConflictError",
            FailureKind::DiskSpace => "DiskSpaceError",
            FailureKind::HealthCheckTimeout => "HealthCheckTimeoutError",
            FailureKind::Migration => "MigrationError",
            FailureKind::GenericStartup => "GenericStartupError",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StackError {
    Configuration(String),
    /// A runtime failure whose captured output has been classified.
    Classified {
        kind: FailureKind,
        message: String,
        output: String,
    },
    HealthCheckTimeout(String),
    Migration(String),
    Io(#[from] std::io::Error),
    Command(String),
    Serialization(String),
    Internal(String),
    Other(#[from] anyhow::Error),
}

impl StackError {
    pub fn classified(kind: FailureKind, message: impl Into<String>, output: impl Into<String>) -> Self {
        StackError::Classified {
            kind,
            message: message.into(),
            output: output.into(),
        }
    }

    /// The taxonomy category, if this error belongs to one.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            StackError::Configuration(_) => Some(FailureKind::Configuration),
            StackError::Classified { kind, .. } => Some(*kind),
            StackError::HealthCheckTimeout(_) => Some(FailureKind::HealthCheckTimeout),
            StackError::Migration(_) => Some(FailureKind::Migration),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().map(FailureKind::exit_code).unwrap_or(1)
    }

    pub fn remediation(&self) -> Option<&'static str> {
        self.kind().map(FailureKind::remediation)
    }

    /// Captured runtime output attached to the error, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            StackError::Classified { output, .. } if !output.trim().is_empty() => Some(output),
            _ => None,
        }
    }
}

impl Display for StackError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            StackError::Configuration(s) => write!(f, "Configuration error: {}", s),
            StackError::Classified { kind, message, .. } => write!(f, "{}: {}", kind, message),
            StackError::HealthCheckTimeout(s) => write!(f, "Health check timed out: {}", s),
            StackError::Migration(s) => write!(f, "Migration failed: {}", s),
            StackError::Io(e) => write!(f, "I/O error: {}", e),
            StackError::Command(s) => write!(f, "Command failed: {}", s),
            StackError::Serialization(s) => write!(f, "Serialization error: {}", s),
            StackError::Internal(s) => write!(f, "Internal error: {}", s),
            StackError::Other(e) => write!(f, "{:#}", e),
        }
    }
}

impl From<serde_yaml_ng::Error> for StackError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        StackError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StackError {
    fn from(err: serde_json::Error) -> Self {
        StackError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
