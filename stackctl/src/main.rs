// External crates
use clap::Parser;
use tracing::debug;

// Internal imports
use stack_core::{stack_error, StackError};
use stack_messages::{msg, MESSAGES};

// Local modules
mod cli;
mod commands;
mod prompt;

use cli::Args;

/// Lines of captured runtime output shown with a failure.
const OUTPUT_TAIL_LINES: usize = 15;

fn main() {
    let args = Args::parse();
    let log_guard = stack_logging::init_subscriber(args.debug);
    debug!(command = ?args.command, "Starting stackctl");

    let exit_code = match commands::execute(args) {
        Ok(()) => 0,
        Err(error) => {
            report_error(&error);
            error.exit_code()
        }
    };

    // Flush the file writer before exiting.
    drop(log_guard);
    std::process::exit(exit_code);
}

fn report_error(error: &StackError) {
    stack_error!("{}", msg!(MESSAGES.common_error, error = error.to_string()));
    if let Some(output) = error.output() {
        stack_error!(
            "{}",
            msg!(MESSAGES.common_output_tail, output = tail(output, OUTPUT_TAIL_LINES))
        );
    }
    if let Some(hint) = error.remediation() {
        stack_error!("{}", msg!(MESSAGES.common_hint, hint = hint));
    }
}

fn tail(output: &str, n: usize) -> String {
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..]
        .iter()
        .map(|line| format!("   {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
