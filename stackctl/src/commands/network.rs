use super::Session;
use crate::cli::RepairSubcommand;
use stack_core::{stack_error_with_details, stack_success, FailureKind, Result, StackError};
use stack_messages::MESSAGES;
use stack_orchestrator::network::NetworkConflict;
use stack_orchestrator::{Gateway, NetworkResolver};

pub fn handle_network(session: &Session, command: RepairSubcommand) -> Result<()> {
    let gateway = session.gateway();
    match command {
        RepairSubcommand::Check => check(session, &gateway),
        RepairSubcommand::Fix => preflight(session, &gateway),
    }
}

/// Report conflicts without touching them.
fn check(session: &Session, gateway: &Gateway<'_>) -> Result<()> {
    let resolver = NetworkResolver::new(gateway, &session.settings)?.quiet(session.quiet);
    let conflicts = resolver.find_conflicts()?;
    if conflicts.is_empty() {
        if !session.quiet {
            stack_success!("{}", MESSAGES.network_no_conflicts);
        }
        return Ok(());
    }

    let details: Vec<String> = conflicts.iter().map(describe).collect();
    stack_error_with_details!(
        format!("Networks overlapping {}:", resolver.target()),
        &details
    );
    Err(conflict_error(&resolver, &conflicts))
}

/// Remove unused conflicting networks; anything left standing is an error.
pub(crate) fn preflight(session: &Session, gateway: &Gateway<'_>) -> Result<()> {
    let resolver = NetworkResolver::new(gateway, &session.settings)?.quiet(session.quiet);
    let report = resolver.resolve_conflicts(session.confirm())?;
    if report.is_clear() {
        return Ok(());
    }

    let mut remaining = report.in_use.clone();
    remaining.extend(report.skipped.iter().map(|name| NetworkConflict {
        network: name.clone(),
        subnet: resolver.target().to_string(),
        attached_containers: 0,
    }));
    Err(conflict_error(&resolver, &remaining))
}

fn describe(conflict: &NetworkConflict) -> String {
    format!(
        "{} ({}, {} attached container(s))",
        conflict.network, conflict.subnet, conflict.attached_containers
    )
}

fn conflict_error(resolver: &NetworkResolver<'_>, conflicts: &[NetworkConflict]) -> StackError {
    let names: Vec<&str> = conflicts.iter().map(|c| c.network.as_str()).collect();
    StackError::classified(
        FailureKind::NetworkConflict,
        format!(
            "subnet {} overlaps existing network(s): {}",
            resolver.target(),
            names.join(", ")
        ),
        String::new(),
    )
}
