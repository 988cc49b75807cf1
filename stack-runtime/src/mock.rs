//! In-memory runtime for tests.
//!
//! `FakeRuntime` keeps a small simulated Docker host (containers, volumes,
//! networks) and a log of every call. Compose subcommands mutate the
//! simulated state the way Docker would; outputs can be scripted per
//! subcommand to inject failures.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use stack_config::{EnvironmentContext, Service};
use stack_core::error::Result;
use stack_core::CapturedOutput;

use crate::{ContainerInfo, NetworkDescriptor, RuntimeClient};

pub const HEALTHY_STATUS: &str = "Up 5 seconds (healthy)";

#[derive(Debug, Clone)]
struct FakeContainer {
    image: String,
    state: String,
    status: String,
    volumes: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    containers: BTreeMap<String, FakeContainer>,
    volumes: BTreeSet<String>,
    networks: BTreeMap<String, NetworkDescriptor>,
    scripted: HashMap<String, VecDeque<CapturedOutput>>,
    status_scripts: HashMap<String, VecDeque<String>>,
    inspect_scripts: HashMap<String, VecDeque<NetworkDescriptor>>,
    calls: Vec<String>,
}

type ComposeHook = Box<dyn FnOnce()>;

pub struct FakeRuntime {
    prefix: String,
    started_status: String,
    state: RefCell<FakeState>,
    hooks: RefCell<HashMap<String, ComposeHook>>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    /// An empty host using the default `stack` container prefix.
    pub fn new() -> Self {
        Self::with_prefix("stack")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            started_status: HEALTHY_STATUS.to_string(),
            state: RefCell::new(FakeState::default()),
            hooks: RefCell::new(HashMap::new()),
        }
    }

    /// Status given to containers started or restarted by compose.
    pub fn with_started_status(mut self, status: &str) -> Self {
        self.started_status = status.to_string();
        self
    }

    pub fn add_container(&self, name: &str, status: &str) {
        self.state.borrow_mut().containers.insert(
            name.to_string(),
            FakeContainer {
                image: format!("{}:latest", name),
                state: state_for_status(status).to_string(),
                status: status.to_string(),
                volumes: Vec::new(),
            },
        );
    }

    pub fn add_volume(&self, name: &str) {
        self.state.borrow_mut().volumes.insert(name.to_string());
    }

    /// Mount `volume` into `container` (both are created if missing).
    pub fn attach_volume(&self, container: &str, volume: &str) {
        if self.container(container).is_none() {
            self.add_container(container, "Exited (0) 1 minute ago");
        }
        let mut state = self.state.borrow_mut();
        state.volumes.insert(volume.to_string());
        if let Some(c) = state.containers.get_mut(container) {
            c.volumes.push(volume.to_string());
        }
    }

    pub fn add_network(&self, network: NetworkDescriptor) {
        self.state
            .borrow_mut()
            .networks
            .insert(network.name.clone(), network);
    }

    /// Queue `output` for the next call whose key is `key`. Keys are the
    /// compose subcommand (`up`, `pull`, `run`, `exec`, ...) or `login`.
    pub fn script(&self, key: &str, output: CapturedOutput) {
        self.state
            .borrow_mut()
            .scripted
            .entry(key.to_string())
            .or_default()
            .push_back(output);
    }

    /// Statuses reported by successive lookups of `container`; the last one
    /// sticks.
    pub fn script_statuses(&self, container: &str, statuses: &[&str]) {
        self.state.borrow_mut().status_scripts.insert(
            container.to_string(),
            statuses.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Descriptors reported by successive inspections of network `name`;
    /// the last one sticks and also becomes the network's state.
    pub fn script_inspections(&self, name: &str, descriptors: Vec<NetworkDescriptor>) {
        self.state
            .borrow_mut()
            .inspect_scripts
            .insert(name.to_string(), descriptors.into_iter().collect());
    }

    /// Run `hook` once, the next time compose `subcommand` is invoked.
    pub fn on_compose(&self, subcommand: &str, hook: impl FnOnce() + 'static) {
        self.hooks
            .borrow_mut()
            .insert(subcommand.to_string(), Box::new(hook));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn container(&self, name: &str) -> Option<ContainerInfo> {
        self.state
            .borrow()
            .containers
            .get(name)
            .map(|c| info(name, c))
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.state.borrow().volumes.contains(name)
    }

    pub fn network_names(&self) -> Vec<String> {
        self.state.borrow().networks.keys().cloned().collect()
    }

    fn record(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }

    fn next_scripted(&self, key: &str) -> Option<CapturedOutput> {
        self.state
            .borrow_mut()
            .scripted
            .get_mut(key)
            .and_then(VecDeque::pop_front)
    }

    fn container_names_for(&self, args: &[String]) -> Vec<String> {
        let named: Vec<String> = args
            .iter()
            .filter(|a| !a.starts_with('-'))
            .map(|svc| format!("{}-{}", self.prefix, svc))
            .collect();
        if !named.is_empty() {
            return named;
        }
        Service::ALL
            .iter()
            .map(|svc| format!("{}-{}", self.prefix, svc.name()))
            .collect()
    }

    fn start_containers(&self, names: &[String], create: bool) {
        let mut state = self.state.borrow_mut();
        for name in names {
            if let Some(c) = state.containers.get_mut(name) {
                c.state = state_for_status(&self.started_status).to_string();
                c.status = self.started_status.clone();
                continue;
            }
            if create {
                state.containers.insert(
                    name.clone(),
                    FakeContainer {
                        image: format!("{}:latest", name),
                        state: state_for_status(&self.started_status).to_string(),
                        status: self.started_status.clone(),
                        volumes: Vec::new(),
                    },
                );
            }
        }
    }

    fn apply_compose(&self, subcommand: &str, args: &[String]) {
        match subcommand {
            "up" => self.start_containers(&self.container_names_for(args), true),
            "start" | "restart" => self.start_containers(&self.container_names_for(args), false),
            "stop" => {
                let names = self.container_names_for(args);
                let mut state = self.state.borrow_mut();
                for name in names {
                    if let Some(c) = state.containers.get_mut(&name) {
                        c.state = "exited".to_string();
                        c.status = "Exited (0) 1 second ago".to_string();
                    }
                }
            }
            "rm" => {
                let names = self.container_names_for(args);
                let mut state = self.state.borrow_mut();
                for name in names {
                    state.containers.remove(&name);
                }
            }
            "down" => {
                let prefix = format!("{}-", self.prefix);
                self.state
                    .borrow_mut()
                    .containers
                    .retain(|name, _| !name.starts_with(&prefix));
            }
            _ => {}
        }
    }
}

impl RuntimeClient for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn compose(
        &self,
        _ctx: &EnvironmentContext,
        subcommand: &str,
        args: &[String],
    ) -> Result<CapturedOutput> {
        let mut call = format!("compose {}", subcommand);
        for arg in args {
            call.push(' ');
            call.push_str(arg);
        }
        self.record(call);
        let hook = self.hooks.borrow_mut().remove(subcommand);
        if let Some(hook) = hook {
            hook();
        }

        let output = self
            .next_scripted(subcommand)
            .unwrap_or_else(|| CapturedOutput::ok(""));
        if output.success() {
            self.apply_compose(subcommand, args);
        }
        Ok(output)
    }

    fn containers(&self, name: &str) -> Result<Vec<ContainerInfo>> {
        self.record(format!("ps {}", name));
        let mut state = self.state.borrow_mut();
        let next_status = state.status_scripts.get_mut(name).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });
        if let Some(status) = next_status {
            let entry = state
                .containers
                .entry(name.to_string())
                .or_insert_with(|| FakeContainer {
                    image: format!("{}:latest", name),
                    state: String::new(),
                    status: String::new(),
                    volumes: Vec::new(),
                });
            entry.state = state_for_status(&status).to_string();
            entry.status = status;
        }
        Ok(state
            .containers
            .get(name)
            .map(|c| vec![info(name, c)])
            .unwrap_or_default())
    }

    fn volumes(&self, filter: Option<&str>) -> Result<Vec<String>> {
        self.record("volume ls".to_string());
        Ok(self
            .state
            .borrow()
            .volumes
            .iter()
            .filter(|v| filter.map_or(true, |f| v.contains(f)))
            .cloned()
            .collect())
    }

    fn containers_using_volume(&self, volume: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .borrow()
            .containers
            .iter()
            .filter(|(_, c)| c.volumes.iter().any(|v| v == volume))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn remove_volume(&self, volume: &str) -> Result<CapturedOutput> {
        self.record(format!("volume rm {}", volume));
        if !self.containers_using_volume(volume)?.is_empty() {
            return Ok(CapturedOutput::failed(
                format!("Error response from daemon: remove {}: volume is in use", volume),
                1,
            ));
        }
        if self.state.borrow_mut().volumes.remove(volume) {
            Ok(CapturedOutput::ok(format!("{}\n", volume)))
        } else {
            Ok(CapturedOutput::failed(
                format!("Error response from daemon: get {}: no such volume", volume),
                1,
            ))
        }
    }

    fn networks(&self) -> Result<Vec<String>> {
        self.record("network ls".to_string());
        Ok(self.network_names())
    }

    fn inspect_network(&self, name: &str) -> Result<Option<NetworkDescriptor>> {
        self.record(format!("network inspect {}", name));
        let mut state = self.state.borrow_mut();
        let scripted = state.inspect_scripts.get_mut(name).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });
        if let Some(descriptor) = scripted {
            state.networks.insert(name.to_string(), descriptor);
        }
        Ok(state.networks.get(name).cloned())
    }

    fn remove_network(&self, name: &str) -> Result<CapturedOutput> {
        self.record(format!("network rm {}", name));
        let mut state = self.state.borrow_mut();
        match state.networks.get(name) {
            Some(net) if net.attached_containers > 0 => Ok(CapturedOutput::failed(
                format!(
                    "Error response from daemon: error while removing network: network {} has active endpoints",
                    name
                ),
                1,
            )),
            Some(_) => {
                state.networks.remove(name);
                Ok(CapturedOutput::ok(format!("{}\n", name)))
            }
            None => Ok(CapturedOutput::failed(
                format!("Error response from daemon: network {} not found", name),
                1,
            )),
        }
    }

    fn login(&self, registry: &str, user: &str, _token: &str) -> Result<CapturedOutput> {
        self.record(format!("login {} -u {}", registry, user));
        Ok(self
            .next_scripted("login")
            .unwrap_or_else(|| CapturedOutput::ok("Login Succeeded\n")))
    }
}

fn info(name: &str, c: &FakeContainer) -> ContainerInfo {
    ContainerInfo {
        name: name.to_string(),
        image: c.image.clone(),
        state: c.state.clone(),
        status: c.status.clone(),
    }
}

fn state_for_status(status: &str) -> &'static str {
    let lower = status.to_lowercase();
    if lower.starts_with("up") {
        "running"
    } else if lower.starts_with("restarting") {
        "restarting"
    } else if lower.starts_with("created") {
        "created"
    } else if lower.starts_with("paused") {
        "paused"
    } else {
        "exited"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EnvironmentContext {
        EnvironmentContext::fixed("/opt/stack/docker-compose.yml", "stack")
    }

    #[test]
    fn test_up_creates_running_containers() {
        let fake = FakeRuntime::new();
        fake.compose(&ctx(), "up", &["-d".to_string(), "backend".to_string()])
            .unwrap();
        let backend = fake.container("stack-backend").unwrap();
        assert!(backend.is_running());
        assert!(fake.container("stack-frontend").is_none());
    }

    #[test]
    fn test_scripted_failure_leaves_state_untouched() {
        let fake = FakeRuntime::new();
        fake.script("up", CapturedOutput::failed("port is already allocated", 1));
        let out = fake.compose(&ctx(), "up", &["-d".to_string()]).unwrap();
        assert!(!out.success());
        assert!(fake.container("stack-database").is_none());
    }

    #[test]
    fn test_status_script_advances_then_sticks() {
        let fake = FakeRuntime::new();
        fake.script_statuses("stack-engine", &["Up 1 second (health: starting)", HEALTHY_STATUS]);
        assert!(fake.containers("stack-engine").unwrap()[0]
            .status
            .contains("starting"));
        assert_eq!(fake.containers("stack-engine").unwrap()[0].status, HEALTHY_STATUS);
        assert_eq!(fake.containers("stack-engine").unwrap()[0].status, HEALTHY_STATUS);
    }

    #[test]
    fn test_volume_in_use_cannot_be_removed() {
        let fake = FakeRuntime::new();
        fake.attach_volume("stack-database", "stack_postgres_data");
        assert!(!fake.remove_volume("stack_postgres_data").unwrap().success());

        fake.compose(&ctx(), "rm", &["-f".to_string(), "-s".to_string(), "database".to_string()])
            .unwrap();
        assert!(fake.remove_volume("stack_postgres_data").unwrap().success());
        assert!(!fake.has_volume("stack_postgres_data"));
    }

    #[test]
    fn test_network_with_endpoints_is_kept() {
        let fake = FakeRuntime::new();
        fake.add_network(NetworkDescriptor {
            name: "busy".into(),
            subnets: vec!["172.20.0.0/16".into()],
            attached_containers: 1,
            project: None,
        });
        assert!(!fake.remove_network("busy").unwrap().success());
        assert_eq!(fake.network_names(), vec!["busy"]);
    }

    #[test]
    fn test_inspection_script_advances_then_sticks() {
        let fake = FakeRuntime::new();
        let idle = NetworkDescriptor {
            name: "shared".into(),
            subnets: vec!["172.20.0.0/16".into()],
            attached_containers: 0,
            project: None,
        };
        let busy = NetworkDescriptor {
            attached_containers: 1,
            ..idle.clone()
        };
        fake.add_network(idle.clone());
        fake.script_inspections("shared", vec![idle, busy]);

        assert_eq!(fake.inspect_network("shared").unwrap().unwrap().attached_containers, 0);
        assert_eq!(fake.inspect_network("shared").unwrap().unwrap().attached_containers, 1);
        assert!(!fake.remove_network("shared").unwrap().success());
    }

    #[test]
    fn test_compose_hook_runs_once() {
        let fake = FakeRuntime::new();
        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        let seen = count.clone();
        fake.on_compose("pull", move || seen.set(seen.get() + 1));

        fake.compose(&ctx(), "pull", &[]).unwrap();
        fake.compose(&ctx(), "pull", &[]).unwrap();
        assert_eq!(count.get(), 1);
    }
}
