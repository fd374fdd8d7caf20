//! Blocking builder for the command-line tools behind the default
//! collaborators. Steps run on worker threads, so a plain
//! `std::process::Command` is enough; the call is not interruptible.

use std::ffi::{OsStr, OsString};
use std::process::{Command, ExitStatus, Stdio};

use tracing::debug;

use crate::error::CollaboratorError;

/// How many trailing stderr lines end up in an error message.
const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Last few stderr lines, for error messages.
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self
            .stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join(" | ")
    }
}

#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs to completion. A non-zero exit is still `Ok`; only a failed
    /// spawn is an error.
    pub fn execute(&self) -> Result<ToolOutput, CollaboratorError> {
        debug!(program = %self.program, args = self.args.len(), "spawning tool");

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| CollaboratorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        Ok(ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Runs and maps a non-zero exit through `on_failure`.
    pub fn execute_checked<F>(&self, on_failure: F) -> Result<ToolOutput, CollaboratorError>
    where
        F: FnOnce(String) -> CollaboratorError,
    {
        let output = self.execute()?;
        if !output.status.success() {
            return Err(on_failure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                output.stderr_tail()
            )));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonexistent_tool_is_spawn_error() {
        let result = ToolCommand::new("nonexistent_tool_subflow_12345").execute();
        assert!(matches!(result, Err(CollaboratorError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_is_mapped() {
        let result = ToolCommand::new("sh")
            .args(["-c", "echo first >&2; echo broken >&2; exit 3"])
            .execute_checked(CollaboratorError::Extraction);

        match result {
            Err(CollaboratorError::Extraction(message)) => {
                assert!(message.starts_with("sh exited with"));
                assert!(message.ends_with("first | broken"));
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.stdout)),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_captured() {
        let output = ToolCommand::new("sh")
            .args(["-c", "echo hello"])
            .execute_checked(CollaboratorError::Extraction)
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }
}
