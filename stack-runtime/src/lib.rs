//! Container runtime abstraction for stackctl.
//!
//! The orchestrator never shells out itself. It talks to a [`RuntimeClient`],
//! which is either the real [`docker::DockerClient`] (the `docker` CLI) or,
//! with the `test-helpers` feature, an in-memory [`mock::FakeRuntime`].

use stack_config::EnvironmentContext;
use stack_core::error::Result;
use stack_core::CapturedOutput;

pub mod docker;
pub mod registry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use docker::DockerClient;
pub use registry::{LoginFailure, RegistryLogin};

/// A container as reported by `docker ps -a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
    /// Runtime state: `running`, `exited`, `created`, `restarting`, ...
    pub state: String,
    /// Human status text, e.g. `Up 3 minutes (healthy)`.
    pub status: String,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// A Docker network as reported by `docker network inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkDescriptor {
    pub name: String,
    pub subnets: Vec<String>,
    pub attached_containers: usize,
    /// Value of the `com.docker.compose.project` label.
    pub project: Option<String>,
}

/// Everything the orchestrator needs from the container runtime.
///
/// Compose operations return the captured output whatever the exit code, so
/// callers can classify failures. Structured queries return `Err` when the
/// runtime cannot be queried at all.
pub trait RuntimeClient {
    fn name(&self) -> &'static str;

    /// Run `compose <subcommand> <args>` against the resolved project.
    fn compose(
        &self,
        ctx: &EnvironmentContext,
        subcommand: &str,
        args: &[String],
    ) -> Result<CapturedOutput>;

    /// Containers (running or not) whose name matches `name` exactly.
    fn containers(&self, name: &str) -> Result<Vec<ContainerInfo>>;

    /// Volume names, optionally restricted to those containing `filter`.
    fn volumes(&self, filter: Option<&str>) -> Result<Vec<String>>;

    /// Names of containers (running or not) that mount `volume`.
    fn containers_using_volume(&self, volume: &str) -> Result<Vec<String>>;

    fn remove_volume(&self, volume: &str) -> Result<CapturedOutput>;

    fn networks(&self) -> Result<Vec<String>>;

    /// `None` when the network no longer exists.
    fn inspect_network(&self, name: &str) -> Result<Option<NetworkDescriptor>>;

    fn remove_network(&self, name: &str) -> Result<CapturedOutput>;

    /// `docker login <registry> -u <user> --password-stdin`.
    fn login(&self, registry: &str, user: &str, token: &str) -> Result<CapturedOutput>;
}
