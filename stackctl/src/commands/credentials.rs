use tracing::info;

use super::Session;
use crate::cli::RepairSubcommand;
use stack_config::CredentialSet;
use stack_core::Result;
use stack_orchestrator::credentials::unresolved_mismatch_error;
use stack_orchestrator::{CredentialChecker, Gateway};

pub fn handle_credentials(session: &Session, command: RepairSubcommand) -> Result<()> {
    let gateway = session.gateway();
    match command {
        RepairSubcommand::Check => {
            if checker(session, &gateway).detect_mismatch()? {
                Err(unresolved_mismatch_error())
            } else {
                Ok(())
            }
        }
        RepairSubcommand::Fix => preflight(session, &gateway),
    }
}

/// Detect a mismatch and, with `--yes` or the operator's consent, reset
/// the database so it is initialised with the stored credentials.
pub(crate) fn preflight(session: &Session, gateway: &Gateway<'_>) -> Result<()> {
    let checker = checker(session, gateway);
    if !checker.detect_mismatch()? {
        return Ok(());
    }

    let interactive = !session.assume_yes;
    if checker.resolve_mismatch(interactive, session.confirm())? {
        info!("Credential mismatch resolved");
        Ok(())
    } else {
        Err(unresolved_mismatch_error())
    }
}

fn checker<'a>(session: &'a Session, gateway: &'a Gateway<'a>) -> CredentialChecker<'a> {
    CredentialChecker::new(
        gateway,
        &session.settings,
        CredentialSet::from_store(&session.store),
        &session.clock,
    )
    .quiet(session.quiet)
}
