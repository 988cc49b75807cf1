//! Health Check Engine.
//!
//! Health is always read fresh from the runtime. A container with a
//! health check is healthy only when the runtime reports `(healthy)`; a
//! container without one is healthy once it is running.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use stack_config::services::container_name;
use stack_config::{Service, Settings};
use stack_core::error::Result;
use stack_runtime::ContainerInfo;
use tracing::{debug, info_span, warn};

use crate::gateway::Gateway;
use crate::poll::{poll_until, Clock, PollPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    Unknown,
    Missing,
    Starting,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    /// Interpret a container's runtime state and status text.
    pub fn from_container(info: &ContainerInfo) -> Self {
        let status = info.status.to_lowercase();
        let state = info.state.to_lowercase();

        if status.contains("(healthy)") {
            return HealthStatus::Healthy;
        }
        if status.contains("(health: starting)") {
            return HealthStatus::Starting;
        }
        if status.contains("(unhealthy)") {
            return HealthStatus::Unhealthy;
        }
        match state.as_str() {
            "running" => HealthStatus::Healthy,
            "created" | "restarting" => HealthStatus::Starting,
            _ if status.starts_with("restarting") || status.starts_with("created") => {
                HealthStatus::Starting
            }
            _ => HealthStatus::Unhealthy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Missing => "missing",
            HealthStatus::Starting => "starting",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHealth {
    pub service: Service,
    pub container: String,
    pub status: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    pub healthy: usize,
    pub total: usize,
    pub unhealthy: Vec<Service>,
    pub services: Vec<ServiceHealth>,
}

impl HealthSummary {
    pub fn all_healthy(&self) -> bool {
        self.healthy == self.total
    }
}

/// Per-service transition history.
///
/// `Healthy` is only ever recorded after `Starting`: a healthy observation
/// with no starting phase before it gets a synthetic `Starting` entry.
#[derive(Debug, Default)]
pub struct HealthTracker {
    history: HashMap<Service, Vec<HealthStatus>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. Repeats of the current status are collapsed.
    pub fn observe(&mut self, service: Service, status: HealthStatus) {
        let history = self.history.entry(service).or_default();
        let last = history.last().copied();
        if last == Some(status) {
            return;
        }
        if status == HealthStatus::Healthy && last != Some(HealthStatus::Starting) {
            history.push(HealthStatus::Starting);
        }
        history.push(status);
    }

    pub fn history(&self, service: Service) -> &[HealthStatus] {
        self.history.get(&service).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn current(&self, service: Service) -> HealthStatus {
        self.history(service)
            .last()
            .copied()
            .unwrap_or(HealthStatus::Unknown)
    }
}

pub struct HealthEngine<'a> {
    gateway: &'a Gateway<'a>,
    clock: &'a dyn Clock,
    prefix: String,
    tracker: RefCell<HealthTracker>,
}

impl<'a> HealthEngine<'a> {
    pub fn new(gateway: &'a Gateway<'a>, settings: &Settings, clock: &'a dyn Clock) -> Self {
        Self {
            gateway,
            clock,
            prefix: settings.container_prefix.clone(),
            tracker: RefCell::new(HealthTracker::new()),
        }
    }

    pub fn container_name(&self, service: Service) -> String {
        container_name(&self.prefix, service)
    }

    /// Current health of one service. Runtime query failures read as
    /// `Unknown`.
    pub fn check_one(&self, service: Service) -> HealthStatus {
        let name = self.container_name(service);
        let status = match self.gateway.container(&name) {
            Ok(Some(info)) => HealthStatus::from_container(&info),
            Ok(None) => HealthStatus::Missing,
            Err(e) => {
                warn!(service = service.name(), "Health query failed: {}", e);
                HealthStatus::Unknown
            }
        };
        debug!(service = service.name(), %status, "Health check");
        self.tracker.borrow_mut().observe(service, status);
        status
    }

    pub fn check_all(&self) -> HealthSummary {
        let services: Vec<ServiceHealth> = Service::ALL
            .iter()
            .map(|svc| ServiceHealth {
                service: *svc,
                container: self.container_name(*svc),
                status: self.check_one(*svc),
            })
            .collect();
        let healthy = services
            .iter()
            .filter(|s| s.status == HealthStatus::Healthy)
            .count();
        HealthSummary {
            healthy,
            total: services.len(),
            unhealthy: services
                .iter()
                .filter(|s| s.status != HealthStatus::Healthy)
                .map(|s| s.service)
                .collect(),
            services,
        }
    }

    /// Poll until `service` (or every service) is healthy. Returns `false`
    /// on timeout.
    pub fn wait_until_healthy(&self, service: Option<Service>, policy: &PollPolicy) -> Result<bool> {
        let target = service.map(|s| s.name()).unwrap_or("all");
        let span = info_span!("health_wait", service = target);
        let _enter = span.enter();

        let healthy = poll_until(policy, self.clock, |attempt| {
            let ready = match service {
                Some(svc) => self.check_one(svc) == HealthStatus::Healthy,
                None => self.check_all().all_healthy(),
            };
            debug!(attempt, ready, "Health poll");
            Ok(ready)
        })?;
        if !healthy {
            warn!("{} not healthy within {:?}", target, policy.timeout);
        }
        Ok(healthy)
    }

    /// Transitions observed so far for `service`.
    pub fn transitions(&self, service: Service) -> Vec<HealthStatus> {
        self.tracker.borrow().history(service).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::ManualClock;
    use stack_config::EnvironmentContext;
    use stack_runtime::mock::{FakeRuntime, HEALTHY_STATUS};
    use std::time::Duration;

    fn container(state: &str, status: &str) -> ContainerInfo {
        ContainerInfo {
            name: "stack-backend".into(),
            image: "backend:1".into(),
            state: state.into(),
            status: status.into(),
        }
    }

    #[test]
    fn test_status_interpretation() {
        assert_eq!(
            HealthStatus::from_container(&container("running", "Up 3 minutes (healthy)")),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthStatus::from_container(&container("running", "Up 2 seconds (health: starting)")),
            HealthStatus::Starting
        );
        assert_eq!(
            HealthStatus::from_container(&container("running", "Up 9 minutes (unhealthy)")),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthStatus::from_container(&container("running", "Up 9 minutes")),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthStatus::from_container(&container("restarting", "Restarting (1) 3 seconds ago")),
            HealthStatus::Starting
        );
        assert_eq!(
            HealthStatus::from_container(&container("exited", "Exited (1) 1 minute ago")),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_tracker_inserts_starting_before_healthy() {
        let mut tracker = HealthTracker::new();
        tracker.observe(Service::Engine, HealthStatus::Missing);
        tracker.observe(Service::Engine, HealthStatus::Healthy);
        assert_eq!(
            tracker.history(Service::Engine),
            &[HealthStatus::Missing, HealthStatus::Starting, HealthStatus::Healthy]
        );

        tracker.observe(Service::Engine, HealthStatus::Healthy);
        assert_eq!(tracker.history(Service::Engine).len(), 3);
        assert_eq!(tracker.current(Service::Nginx), HealthStatus::Unknown);
    }

    fn engine_fixture() -> (FakeRuntime, Settings, ManualClock) {
        (FakeRuntime::new(), Settings::default(), ManualClock::new())
    }

    #[test]
    fn test_check_one_missing_and_exact_name() {
        let (fake, settings, clock) = engine_fixture();
        fake.add_container("stack-backend-old", HEALTHY_STATUS);
        let gateway = Gateway::new(
            &fake,
            EnvironmentContext::fixed("/opt/stack/docker-compose.yml", "stack"),
            &settings,
        );
        let engine = HealthEngine::new(&gateway, &settings, &clock);
        assert_eq!(engine.check_one(Service::Backend), HealthStatus::Missing);
    }

    #[test]
    fn test_check_all_counts() {
        let (fake, settings, clock) = engine_fixture();
        fake.add_container("stack-database", HEALTHY_STATUS);
        fake.add_container("stack-backend", "Up 1 second (health: starting)");
        fake.add_container("stack-frontend", "Up 2 hours");
        let gateway = Gateway::new(
            &fake,
            EnvironmentContext::fixed("/opt/stack/docker-compose.yml", "stack"),
            &settings,
        );
        let engine = HealthEngine::new(&gateway, &settings, &clock);

        let summary = engine.check_all();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.healthy, 2);
        assert_eq!(
            summary.unhealthy,
            vec![Service::Backend, Service::Engine, Service::Nginx]
        );
        assert!(!summary.all_healthy());
    }

    #[test]
    fn test_wait_returns_on_first_healthy_observation() {
        let (fake, settings, clock) = engine_fixture();
        fake.script_statuses(
            "stack-backend",
            &[
                "Up 1 second (health: starting)",
                "Up 6 seconds (health: starting)",
                "Up 11 seconds (healthy)",
            ],
        );
        let gateway = Gateway::new(
            &fake,
            EnvironmentContext::fixed("/opt/stack/docker-compose.yml", "stack"),
            &settings,
        );
        let engine = HealthEngine::new(&gateway, &settings, &clock);

        let policy = PollPolicy::new(Duration::from_secs(60), Duration::from_secs(5));
        assert!(engine
            .wait_until_healthy(Some(Service::Backend), &policy)
            .unwrap());
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
        assert_eq!(
            engine.transitions(Service::Backend),
            vec![HealthStatus::Starting, HealthStatus::Healthy]
        );
    }

    #[test]
    fn test_wait_times_out_within_timeout_plus_interval() {
        let (fake, settings, clock) = engine_fixture();
        fake.add_container("stack-engine", "Up 1 second (health: starting)");
        let gateway = Gateway::new(
            &fake,
            EnvironmentContext::fixed("/opt/stack/docker-compose.yml", "stack"),
            &settings,
        );
        let engine = HealthEngine::new(&gateway, &settings, &clock);

        let policy = PollPolicy::new(Duration::from_secs(23), Duration::from_secs(5));
        assert!(!engine
            .wait_until_healthy(Some(Service::Engine), &policy)
            .unwrap());
        assert!(clock.elapsed() <= policy.timeout + policy.interval);
    }
}
