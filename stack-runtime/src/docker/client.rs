use std::collections::HashMap;

use serde::Deserialize;
use stack_config::EnvironmentContext;
use stack_core::command_stream::is_tool_installed;
use stack_core::error::{Result, StackError};
use stack_core::CapturedOutput;
use tracing::{debug, warn};

use super::{ComposeCommand, DockerCommand};
use crate::{ContainerInfo, NetworkDescriptor, RuntimeClient};

pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// [`RuntimeClient`] backed by the `docker` CLI.
#[derive(Debug, Clone, Default)]
pub struct DockerClient;

impl DockerClient {
    pub fn new() -> Result<Self> {
        if !is_tool_installed("docker") {
            return Err(StackError::Configuration(
                "Docker is not installed or not on PATH".to_string(),
            ));
        }
        Ok(Self)
    }
}

impl RuntimeClient for DockerClient {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn compose(
        &self,
        ctx: &EnvironmentContext,
        subcommand: &str,
        args: &[String],
    ) -> Result<CapturedOutput> {
        DockerCommand::new()
            .args(ComposeCommand::build_args(ctx, subcommand, args))
            .run()
    }

    fn containers(&self, name: &str) -> Result<Vec<ContainerInfo>> {
        let stdout = DockerCommand::new()
            .subcommand("ps")
            .args(["-a", "--filter"])
            .arg(format!("name={}", name))
            .args(["--format", "{{json .}}"])
            .run_checked()?;
        // The name filter is a substring match; keep exact names only.
        Ok(parse_ps_lines(&stdout)
            .into_iter()
            .filter(|c| c.name == name)
            .collect())
    }

    fn volumes(&self, filter: Option<&str>) -> Result<Vec<String>> {
        let mut cmd = DockerCommand::new().subcommand("volume").arg("ls");
        if let Some(filter) = filter {
            cmd = cmd.arg("--filter").arg(format!("name={}", filter));
        }
        let stdout = cmd.args(["--format", "{{.Name}}"]).run_checked()?;
        Ok(non_empty_lines(&stdout))
    }

    fn containers_using_volume(&self, volume: &str) -> Result<Vec<String>> {
        let stdout = DockerCommand::new()
            .subcommand("ps")
            .args(["-a", "--filter"])
            .arg(format!("volume={}", volume))
            .args(["--format", "{{.Names}}"])
            .run_checked()?;
        Ok(non_empty_lines(&stdout))
    }

    fn remove_volume(&self, volume: &str) -> Result<CapturedOutput> {
        DockerCommand::new()
            .subcommand("volume")
            .args(["rm", volume])
            .run()
    }

    fn networks(&self) -> Result<Vec<String>> {
        let stdout = DockerCommand::new()
            .subcommand("network")
            .args(["ls", "--format", "{{.Name}}"])
            .run_checked()?;
        Ok(non_empty_lines(&stdout))
    }

    fn inspect_network(&self, name: &str) -> Result<Option<NetworkDescriptor>> {
        let output = DockerCommand::new()
            .subcommand("network")
            .args(["inspect", name])
            .run()?;
        if !output.success() {
            if output.combined().to_lowercase().contains("no such network") {
                debug!("Network {} no longer exists", name);
                return Ok(None);
            }
            return Err(StackError::Command(format!(
                "docker network inspect {} failed: {}",
                name,
                output.stderr.trim()
            )));
        }
        parse_network_inspect(&output.stdout).map(|mut networks| networks.pop())
    }

    fn remove_network(&self, name: &str) -> Result<CapturedOutput> {
        DockerCommand::new()
            .subcommand("network")
            .args(["rm", name])
            .run()
    }

    fn login(&self, registry: &str, user: &str, token: &str) -> Result<CapturedOutput> {
        DockerCommand::new()
            .subcommand("login")
            .args([registry, "-u", user, "--password-stdin"])
            .stdin(token.as_bytes())
            .run()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    names: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
}

/// Parse `docker ps --format '{{json .}}'` output, one object per line.
pub fn parse_ps_lines(stdout: &str) -> Vec<ContainerInfo> {
    let mut containers = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<PsLine>(line) {
            Ok(ps) => {
                for name in ps.names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                    containers.push(ContainerInfo {
                        name: name.to_string(),
                        image: ps.image.clone(),
                        state: ps.state.clone(),
                        status: ps.status.clone(),
                    });
                }
            }
            Err(e) => warn!("Skipping unparseable docker ps line: {}", e),
        }
    }
    containers
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedNetwork {
    name: String,
    #[serde(rename = "IPAM", default)]
    ipam: Option<Ipam>,
    #[serde(default)]
    containers: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct Ipam {
    #[serde(default)]
    config: Option<Vec<IpamConfig>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpamConfig {
    #[serde(default)]
    subnet: Option<String>,
}

/// Parse `docker network inspect` output (a JSON array).
pub fn parse_network_inspect(stdout: &str) -> Result<Vec<NetworkDescriptor>> {
    let networks: Vec<InspectedNetwork> = serde_json::from_str(stdout)?;
    Ok(networks
        .into_iter()
        .map(|net| NetworkDescriptor {
            subnets: net
                .ipam
                .and_then(|ipam| ipam.config)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|cfg| cfg.subnet)
                .collect(),
            attached_containers: net.containers.map(|c| c.len()).unwrap_or(0),
            project: net
                .labels
                .and_then(|mut labels| labels.remove(COMPOSE_PROJECT_LABEL)),
            name: net.name,
        })
        .collect())
}

fn non_empty_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
