use std::fs;

use stack_config::{EnvStore, EnvironmentContext, Service, Settings};
use stack_core::{CapturedOutput, FailureKind};
use stack_orchestrator::update::summary_error;
use stack_orchestrator::{
    Gateway, HealthEngine, ManualClock, UpdateOrchestrator, UpdatePlan, UpdateState,
};
use stack_runtime::mock::{FakeRuntime, HEALTHY_STATUS};
use tempfile::TempDir;

fn ctx() -> EnvironmentContext {
    EnvironmentContext::fixed("/opt/stack/docker-compose.yml", "stack")
}

fn store_with(dir: &TempDir, content: &str) -> EnvStore {
    let path = dir.path().join(".env");
    fs::write(&path, content).unwrap();
    EnvStore::load(&path).unwrap()
}

fn persisted(dir: &TempDir, key: &str) -> Option<String> {
    EnvStore::load(&dir.path().join(".env")).unwrap().get(key)
}

#[test]
fn migration_failure_restores_previous_tag() {
    let dir = TempDir::new().unwrap();
    let mut store = store_with(&dir, "# versions\nBACKEND_VERSION=1.2.0\n");
    let fake = FakeRuntime::new();
    fake.add_container("stack-backend", HEALTHY_STATUS);
    fake.script("run", CapturedOutput::failed("relation \"users\" already exists", 1));

    let settings = Settings::default();
    let clock = ManualClock::new();
    let gateway = Gateway::new(&fake, ctx(), &settings);
    let health = HealthEngine::new(&gateway, &settings, &clock);
    let orchestrator = UpdateOrchestrator::new(&gateway, &health, &settings).quiet(true);

    let plan = UpdatePlan::new(Service::Backend, "1.3.0", &store);
    let result = orchestrator.update(plan, &mut store);

    assert!(!result.succeeded());
    assert_eq!(result.error.as_ref().and_then(|e| e.kind()), Some(FailureKind::Migration));
    assert_eq!(persisted(&dir, "BACKEND_VERSION").as_deref(), Some("1.2.0"));
    assert_eq!(
        result.transitions,
        vec![
            UpdateState::Idle,
            UpdateState::Pulling,
            UpdateState::Migrating,
            UpdateState::MigrationFailed,
            UpdateState::RolledBack,
        ]
    );
    // Running containers untouched.
    assert!(fake.calls_matching("compose up").is_empty());
    assert!(fake.container("stack-backend").unwrap().is_running());
    assert!(fs::read_to_string(dir.path().join(".env"))
        .unwrap()
        .starts_with("# versions\n"));
}

#[test]
fn successful_backend_update_runs_every_step() {
    let dir = TempDir::new().unwrap();
    let mut store = store_with(&dir, "BACKEND_VERSION=1.2.0\n");
    let fake = FakeRuntime::new();
    fake.add_container("stack-backend", HEALTHY_STATUS);

    let settings = Settings::default();
    let clock = ManualClock::new();
    let gateway = Gateway::new(&fake, ctx(), &settings);
    let health = HealthEngine::new(&gateway, &settings, &clock);
    let orchestrator = UpdateOrchestrator::new(&gateway, &health, &settings).quiet(true);

    let plan = UpdatePlan::new(Service::Backend, "1.3.0", &store);
    let result = orchestrator.update(plan, &mut store);

    assert!(result.succeeded());
    assert_eq!(result.state(), UpdateState::Succeeded);
    assert_eq!(persisted(&dir, "BACKEND_VERSION").as_deref(), Some("1.3.0"));
    assert_eq!(
        fake.calls_matching("compose"),
        vec![
            "compose pull backend".to_string(),
            "compose run --rm migrate".to_string(),
            "compose rm -f -s migrate".to_string(),
            "compose up -d --force-recreate --no-deps backend".to_string(),
        ]
    );
}

#[test]
fn frontend_update_skips_migration() {
    let dir = TempDir::new().unwrap();
    let mut store = store_with(&dir, "FRONTEND_VERSION=2.0.0\n");
    let fake = FakeRuntime::new();

    let settings = Settings::default();
    let clock = ManualClock::new();
    let gateway = Gateway::new(&fake, ctx(), &settings);
    let health = HealthEngine::new(&gateway, &settings, &clock);
    let orchestrator = UpdateOrchestrator::new(&gateway, &health, &settings).quiet(true);

    let result = orchestrator.update(UpdatePlan::new(Service::Frontend, "2.1.0", &store), &mut store);
    assert!(result.succeeded());
    assert!(!result.transitions.contains(&UpdateState::Migrating));
    assert!(fake.calls_matching("compose run").is_empty());
}

#[test]
fn pull_failure_rolls_back_tag() {
    let dir = TempDir::new().unwrap();
    let mut store = store_with(&dir, "ENGINE_VERSION=0.9.0\n");
    let fake = FakeRuntime::new();
    fake.script(
        "pull",
        CapturedOutput::failed("Error response from daemon: manifest for ghcr.io/stack-platform/engine:9.9.9 not found: manifest unknown", 1),
    );

    let settings = Settings::default();
    let clock = ManualClock::new();
    let gateway = Gateway::new(&fake, ctx(), &settings);
    let health = HealthEngine::new(&gateway, &settings, &clock);
    let orchestrator = UpdateOrchestrator::new(&gateway, &health, &settings).quiet(true);

    let result = orchestrator.update(UpdatePlan::new(Service::Engine, "9.9.9", &store), &mut store);
    assert_eq!(result.error.as_ref().and_then(|e| e.kind()), Some(FailureKind::ImageNotFound));
    assert!(result.transitions.contains(&UpdateState::PullFailed));
    assert_eq!(persisted(&dir, "ENGINE_VERSION").as_deref(), Some("0.9.0"));
}

#[test]
fn health_timeout_keeps_new_tag() {
    let dir = TempDir::new().unwrap();
    let mut store = store_with(&dir, "NGINX_VERSION=1.26-alpine\n");
    let fake = FakeRuntime::new().with_started_status("Up 1 second (health: starting)");

    let settings = Settings::default();
    let clock = ManualClock::new();
    let gateway = Gateway::new(&fake, ctx(), &settings);
    let health = HealthEngine::new(&gateway, &settings, &clock);
    let orchestrator = UpdateOrchestrator::new(&gateway, &health, &settings).quiet(true);

    let result = orchestrator.update(UpdatePlan::new(Service::Nginx, "1.27-alpine", &store), &mut store);
    assert_eq!(result.state(), UpdateState::TimedOut);
    assert_eq!(
        result.error.as_ref().and_then(|e| e.kind()),
        Some(FailureKind::HealthCheckTimeout)
    );
    assert_eq!(persisted(&dir, "NGINX_VERSION").as_deref(), Some("1.27-alpine"));
    assert_eq!(fake.calls_matching("ps stack-nginx").len(), 12);
}

#[test]
fn update_all_continues_after_failure() {
    let dir = TempDir::new().unwrap();
    let mut store = store_with(&dir, "BACKEND_VERSION=1.2.0\nFRONTEND_VERSION=2.0.0\n");
    let fake = FakeRuntime::new();
    fake.script("run", CapturedOutput::failed("migration error", 1));

    let settings = Settings::default();
    let clock = ManualClock::new();
    let gateway = Gateway::new(&fake, ctx(), &settings);
    let health = HealthEngine::new(&gateway, &settings, &clock);
    let orchestrator = UpdateOrchestrator::new(&gateway, &health, &settings).quiet(true);

    let plans = vec![
        UpdatePlan::new(Service::Backend, "1.3.0", &store),
        UpdatePlan::new(Service::Frontend, "2.1.0", &store),
    ];
    let summary = orchestrator.update_all(plans, &mut store);

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 1);
    assert!(!summary.is_success());
    assert_eq!(persisted(&dir, "BACKEND_VERSION").as_deref(), Some("1.2.0"));
    assert_eq!(persisted(&dir, "FRONTEND_VERSION").as_deref(), Some("2.1.0"));
    assert_eq!(
        summary_error(&summary).and_then(|e| e.kind()),
        Some(FailureKind::Migration)
    );
}

#[test]
fn degraded_mode_cannot_persist_update() {
    let mut store = EnvStore::empty();
    let fake = FakeRuntime::new();
    let settings = Settings::default();
    let clock = ManualClock::new();
    let gateway = Gateway::new(&fake, ctx(), &settings);
    let health = HealthEngine::new(&gateway, &settings, &clock);
    let orchestrator = UpdateOrchestrator::new(&gateway, &health, &settings).quiet(true);

    let result = orchestrator.update(UpdatePlan::new(Service::Engine, "1.0.0", &store), &mut store);
    assert_eq!(result.state(), UpdateState::Failed);
    assert!(fake.calls_matching("compose").is_empty());
}

#[test]
fn failed_tag_restore_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut store = store_with(&dir, "BACKEND_VERSION=1.2.0\n");
    let fake = FakeRuntime::new();
    fake.script("run", CapturedOutput::failed("migration error", 1));
    // The env directory disappears once the new tag is on disk, so writing
    // the previous tag back cannot succeed.
    let env_dir = dir.path().to_path_buf();
    fake.on_compose("run", move || {
        let _ = fs::remove_dir_all(&env_dir);
    });

    let settings = Settings::default();
    let clock = ManualClock::new();
    let gateway = Gateway::new(&fake, ctx(), &settings);
    let health = HealthEngine::new(&gateway, &settings, &clock);
    let orchestrator = UpdateOrchestrator::new(&gateway, &health, &settings).quiet(true);

    let result = orchestrator.update(UpdatePlan::new(Service::Backend, "1.3.0", &store), &mut store);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.kind(), Some(FailureKind::Migration));
    let message = error.to_string();
    assert!(message.contains("rollback failed"));
    assert!(message.contains("BACKEND_VERSION still holds 1.3.0 instead of 1.2.0"));
    assert!(!result.transitions.contains(&UpdateState::RolledBack));
    assert_eq!(result.state(), UpdateState::MigrationFailed);
}
