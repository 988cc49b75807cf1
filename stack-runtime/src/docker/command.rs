//! Docker command builder.
//!
//! Every `docker` invocation goes through [`DockerCommand`] so logging and
//! output capture are uniform.

use stack_core::command_stream::run_captured_with_stdin;
use stack_core::error::Result;
use stack_core::CapturedOutput;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct DockerCommand {
    subcommand: Option<String>,
    args: Vec<String>,
    stdin: Option<Vec<u8>>,
}

impl DockerCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Docker subcommand (e.g. `ps`, `network`, `compose`).
    pub fn subcommand<S: Into<String>>(mut self, cmd: S) -> Self {
        self.subcommand = Some(cmd.into());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` to the child's stdin (used for `--password-stdin`).
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Full argument vector after `docker`.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        if let Some(sub) = &self.subcommand {
            args.push(sub.clone());
        }
        args.extend(self.args.iter().cloned());
        args
    }

    /// Run to completion. A non-zero exit is reported in the output, not as
    /// an error.
    pub fn run(self) -> Result<CapturedOutput> {
        let args = self.build_args();
        debug!("Executing Docker command: docker {}", args.join(" "));
        run_captured_with_stdin("docker", &args, self.stdin.as_deref())
    }

    /// Run and return stdout, turning a non-zero exit into an error.
    pub fn run_checked(self) -> Result<String> {
        let rendered = self.build_args().join(" ");
        let output = self.run()?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(stack_core::StackError::Command(format!(
                "docker {} failed with exit code {}: {}",
                rendered,
                output.exit_code,
                output.stderr.trim()
            )))
        }
    }
}
