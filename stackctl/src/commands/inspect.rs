use super::{ensure_success, Session};
use stack_config::Service;
use stack_core::{stack_error, stack_println, stack_success, FailureKind, Result, StackError};
use stack_messages::MESSAGES;
use stack_orchestrator::Operation;

pub fn logs(session: &Session, service: Option<Service>, tail: usize) -> Result<()> {
    let gateway = session.gateway();
    let args = vec!["--tail".to_string(), tail.to_string()];
    let output = gateway.execute(Operation::Logs, service, &args)?;
    let output = ensure_success(&gateway, Operation::Logs, output)?;
    print!("{}", output.stdout);
    Ok(())
}

/// The command's own output is passed through; a non-zero exit becomes a
/// command error.
pub fn exec(session: &Session, service: Service, command: &[String]) -> Result<()> {
    let gateway = session.gateway();
    let output = gateway.execute(Operation::Exec, Some(service), command)?;
    print!("{}", output.stdout);
    if !output.stderr.trim().is_empty() {
        stack_error!("{}", output.stderr.trim_end());
    }
    if output.success() {
        Ok(())
    } else {
        Err(StackError::Command(format!(
            "'{}' in {} exited with code {}",
            command.join(" "),
            service,
            output.exit_code
        )))
    }
}

pub fn config(session: &Session) -> Result<()> {
    let gateway = session.gateway();
    let output = gateway.execute(Operation::Config, None, &[])?;
    match ensure_success(&gateway, Operation::Config, output) {
        Ok(output) => {
            stack_println!("{}", output.stdout.trim_end());
            Ok(())
        }
        Err(e) => Err(invalid_config(e)),
    }
}

pub fn validate(session: &Session) -> Result<()> {
    let gateway = session.gateway();
    let output = gateway.execute(Operation::Validate, None, &[])?;
    ensure_success(&gateway, Operation::Validate, output).map_err(invalid_config)?;
    if !session.quiet {
        stack_success!("{}", MESSAGES.validate_ok);
    }
    Ok(())
}

/// Compose rejecting its own files is a configuration problem, whatever
/// the classifier made of the output.
fn invalid_config(error: StackError) -> StackError {
    let output = error.output().unwrap_or_default().to_string();
    StackError::classified(
        FailureKind::Configuration,
        "compose configuration is invalid",
        output,
    )
}
