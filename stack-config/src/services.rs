//! The essential service set.
//!
//! The product always runs the same five services, in this order. The list
//! is configuration shared by every component, never discovered at runtime.

use std::fmt;
use std::str::FromStr;

use stack_core::error::StackError;

use crate::env_store::EnvStore;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Service {
    Database,
    Backend,
    Frontend,
    Engine,
    Nginx,
}

impl Service {
    /// Start order: the database first, the reverse proxy last.
    pub const ALL: [Service; 5] = [
        Service::Database,
        Service::Backend,
        Service::Frontend,
        Service::Engine,
        Service::Nginx,
    ];

    /// Compose service name.
    pub fn name(self) -> &'static str {
        match self {
            Service::Database => "database",
            Service::Backend => "backend",
            Service::Frontend => "frontend",
            Service::Engine => "engine",
            Service::Nginx => "nginx",
        }
    }

    /// Env store key holding the image tag for this service.
    pub fn version_key(self) -> &'static str {
        match self {
            Service::Database => "POSTGRES_VERSION",
            Service::Backend => "BACKEND_VERSION",
            Service::Frontend => "FRONTEND_VERSION",
            Service::Engine => "ENGINE_VERSION",
            Service::Nginx => "NGINX_VERSION",
        }
    }

    pub fn default_tag(self) -> &'static str {
        match self {
            Service::Database => "16-alpine",
            Service::Nginx => "1.27-alpine",
            _ => "latest",
        }
    }

    /// Only the backend owns the database schema.
    pub fn requires_migration(self) -> bool {
        matches!(self, Service::Backend)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Service {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let alias = match wanted.as_str() {
            "db" | "postgres" | "postgresql" => "database",
            "api" => "backend",
            "web" | "ui" => "frontend",
            "proxy" => "nginx",
            other => other,
        };
        Service::ALL
            .iter()
            .copied()
            .find(|svc| svc.name() == alias)
            .ok_or_else(|| {
                StackError::Configuration(format!(
                    "Unknown service '{}'. Expected one of: {}",
                    s,
                    Service::ALL.map(|svc| svc.name()).join(", ")
                ))
            })
    }
}

/// A service as it is deployed on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service: Service,
    pub name: String,
    pub container_name: String,
    pub image: String,
    pub tag: String,
}

impl ServiceDescriptor {
    pub fn new(service: Service, settings: &Settings, store: &EnvStore) -> Self {
        let image = match service {
            Service::Database => "postgres".to_string(),
            Service::Nginx => "nginx".to_string(),
            _ => format!(
                "{}/{}/{}",
                settings.registry.trim_end_matches('/'),
                settings.image_namespace.trim_matches('/'),
                service.name()
            ),
        };
        let tag = store
            .get_non_empty(service.version_key())
            .unwrap_or_else(|| service.default_tag().to_string());

        Self {
            service,
            name: service.name().to_string(),
            container_name: container_name(&settings.container_prefix, service),
            image,
            tag,
        }
    }

    /// Descriptors for the whole essential set, in start order.
    pub fn all(settings: &Settings, store: &EnvStore) -> Vec<Self> {
        Service::ALL
            .iter()
            .map(|svc| Self::new(*svc, settings, store))
            .collect()
    }

    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

/// `<prefix>-<service>`; every container lookup relies on this convention.
pub fn container_name(prefix: &str, service: Service) -> String {
    format!("{}-{}", prefix, service.name())
}
