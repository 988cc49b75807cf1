// Standard library
use std::ffi::OsStr;

// External crates
use crate::error::{Result, StackError};
use duct::cmd;
use tracing::debug;
use which::which;

/// Output captured from a finished child process.
///
/// Nothing is discarded: both streams and the exit code are kept so that
/// failures can be classified after the fact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CapturedOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(stdout, "", 0)
    }

    /// A failed result with the given stderr.
    pub fn failed(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self::new("", stderr, exit_code)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, the text the error classifier reads.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// The last `n` non-empty lines of the combined output.
    pub fn tail(&self, n: usize) -> String {
        let combined = self.combined();
        let lines: Vec<&str> = combined.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

fn render_command<A: AsRef<OsStr>>(command: &str, args: &[A]) -> String {
    format!(
        "{} {}",
        command,
        args.iter()
            .map(|a| a.as_ref().to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    )
}

/// Run a command to completion and capture stdout, stderr and exit code.
///
/// A non-zero exit is not an error here; only a failure to spawn is.
pub fn run_captured<A: AsRef<OsStr>>(command: &str, args: &[A]) -> Result<CapturedOutput> {
    run_captured_with_stdin(command, args, None)
}

/// Same as [`run_captured`], feeding `stdin` to the child when given.
pub fn run_captured_with_stdin<A: AsRef<OsStr>>(
    command: &str,
    args: &[A],
    stdin: Option<&[u8]>,
) -> Result<CapturedOutput> {
    let full_command = render_command(command, args);
    debug!("Executing: {}", full_command);

    let mut expression = cmd(command, args)
        .stdout_capture()
        .stderr_capture()
        .unchecked();
    if let Some(bytes) = stdin {
        expression = expression.stdin_bytes(bytes.to_vec());
    }

    let output = expression.run().map_err(|e| {
        StackError::Command(format!("Failed to start command '{}': {}", full_command, e))
    })?;

    let captured = CapturedOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    };
    debug!("'{}' exited with {}", full_command, captured.exit_code);
    Ok(captured)
}

/// Checks if a command-line tool is available in the system's PATH.
pub fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}
