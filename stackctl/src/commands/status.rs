use std::time::Duration;

use super::{target_name, Session};
use stack_config::{Service, ServiceDescriptor};
use stack_core::{stack_println, stack_success, Result, StackError};
use stack_messages::{msg, MESSAGES};
use stack_orchestrator::{Gateway, HealthEngine, HealthSummary, PollPolicy};

pub fn handle_status(session: &Session) -> Result<()> {
    let gateway = session.gateway();
    let health = HealthEngine::new(&gateway, &session.settings, &session.clock);
    print_summary(session, &health.check_all());
    Ok(())
}

pub fn handle_wait(session: &Session, service: Option<Service>, timeout: Option<u64>) -> Result<()> {
    let gateway = session.gateway();
    wait_healthy(session, &gateway, service, timeout)
}

/// Block until the target is healthy. On timeout the current table is
/// printed and a `HealthCheckTimeout` error returned.
pub(crate) fn wait_healthy(
    session: &Session,
    gateway: &Gateway<'_>,
    service: Option<Service>,
    timeout: Option<u64>,
) -> Result<()> {
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| session.settings.health_timeout());
    let target = target_name(service);
    let seconds = timeout.as_secs().to_string();

    if !session.quiet {
        stack_println!(
            "{}",
            msg!(MESSAGES.health_waiting, target = target.as_str(), timeout = seconds.as_str())
        );
    }

    let health = HealthEngine::new(gateway, &session.settings, &session.clock);
    let policy = PollPolicy::new(timeout, session.settings.poll_interval());
    if health.wait_until_healthy(service, &policy)? {
        if !session.quiet {
            stack_success!("{}", msg!(MESSAGES.health_ready, target = target.as_str()));
        }
        return Ok(());
    }

    if !session.quiet {
        print_summary(session, &health.check_all());
    }
    Err(StackError::HealthCheckTimeout(msg!(
        MESSAGES.health_timeout,
        target = target.as_str(),
        timeout = seconds.as_str()
    )))
}

fn print_summary(session: &Session, summary: &HealthSummary) {
    let descriptors = ServiceDescriptor::all(&session.settings, &session.store);
    for row in &summary.services {
        let image = descriptors
            .iter()
            .find(|d| d.service == row.service)
            .map(ServiceDescriptor::image_ref)
            .unwrap_or_default();
        stack_println!(
            "{}",
            msg!(
                MESSAGES.health_row,
                service = format!("{:<10}", row.service.name()),
                container = format!("{:<18}", row.container),
                image = format!("{:<48}", image),
                status = row.status.as_str()
            )
        );
    }
    stack_println!(
        "{}",
        msg!(
            MESSAGES.health_summary,
            healthy = summary.healthy.to_string(),
            total = summary.total.to_string()
        )
    );
}
