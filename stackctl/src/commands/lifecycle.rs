use tracing::{debug, info};

use super::{credentials, ensure_success, network, status, target_name, Session};
use stack_config::Service;
use stack_core::{stack_println, Result};
use stack_messages::{msg, MESSAGES};
use stack_orchestrator::{Gateway, Operation};

pub fn start(
    session: &Session,
    service: Option<Service>,
    skip_preflight: bool,
    timeout: Option<u64>,
) -> Result<()> {
    let gateway = session.gateway();

    if skip_preflight {
        debug!("Preflight checks skipped");
    } else {
        network::preflight(session, &gateway)?;
        // Only a start that brings the database up can hit stale credentials.
        if matches!(service, None | Some(Service::Database)) {
            credentials::preflight(session, &gateway)?;
        }
    }

    let target = target_name(service);
    if !session.quiet {
        stack_println!("{}", msg!(MESSAGES.service_starting, service = target.as_str()));
    }
    gateway.execute(Operation::Up, service, &[])?;
    info!(service = target.as_str(), "Services started");
    if !session.quiet {
        stack_println!("{}", msg!(MESSAGES.service_started, service = target.as_str()));
    }

    status::wait_healthy(session, &gateway, service, timeout)
}

pub fn stop(session: &Session, service: Option<Service>) -> Result<()> {
    let gateway = session.gateway();
    let target = target_name(service);
    run_simple(
        session,
        &gateway,
        Operation::Stop,
        service,
        msg!(MESSAGES.service_stopping, service = target.as_str()),
        msg!(MESSAGES.service_stopped, service = target.as_str()),
    )
}

pub fn down(session: &Session) -> Result<()> {
    let gateway = session.gateway();
    let target = target_name(None);
    run_simple(
        session,
        &gateway,
        Operation::Down,
        None,
        msg!(MESSAGES.service_stopping, service = target.as_str()),
        MESSAGES.stack_down.to_string(),
    )
}

/// Recreate from the configured tags, then wait for health.
pub fn restart(session: &Session, service: Option<Service>) -> Result<()> {
    let gateway = session.gateway();
    let target = target_name(service);
    run_simple(
        session,
        &gateway,
        Operation::Restart,
        service,
        msg!(MESSAGES.service_restarting, service = target.as_str()),
        msg!(MESSAGES.service_restarted, service = target.as_str()),
    )?;
    status::wait_healthy(session, &gateway, service, None)
}

pub fn pull(session: &Session, service: Option<Service>) -> Result<()> {
    let gateway = session.gateway();
    let target = target_name(service);
    run_simple(
        session,
        &gateway,
        Operation::Pull,
        service,
        msg!(MESSAGES.service_pulling, service = target.as_str()),
        msg!(MESSAGES.service_pulled, service = target.as_str()),
    )
}

fn run_simple(
    session: &Session,
    gateway: &Gateway<'_>,
    operation: Operation,
    service: Option<Service>,
    before: String,
    after: String,
) -> Result<()> {
    if !session.quiet {
        stack_println!("{}", before);
    }
    let output = gateway.execute(operation, service, &[])?;
    ensure_success(gateway, operation, output)?;
    if !session.quiet {
        stack_println!("{}", after);
    }
    Ok(())
}
