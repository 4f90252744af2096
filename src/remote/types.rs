//! Command output type and the process runner abstraction.

use std::ffi::OsString;
use std::io::Write;
use std::process::{Command, Stdio};

use super::RemoteError;

/// Result of running an external command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError>;

    /// Runs `program`, writes `input` to its stdin and closes it, then
    /// captures stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started and
    /// [`RemoteError::Input`] if stdin cannot be written.
    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
    ) -> Result<CommandOutput, RemoteError>;

    /// Runs `program` with stdout attached to the terminal. Only stderr is
    /// captured; the returned stdout is always empty.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started.
    fn run_inherited(&self, program: &str, args: &[OsString])
    -> Result<CommandOutput, RemoteError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl ProcessCommandRunner {
    fn spawn_error(program: &str, err: &std::io::Error) -> RemoteError {
        RemoteError::Spawn {
            program: program.to_owned(),
            message: err.to_string(),
        }
    }

    fn collect(output: &std::process::Output) -> CommandOutput {
        CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| Self::spawn_error(program, &err))?;

        Ok(Self::collect(&output))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
    ) -> Result<CommandOutput, RemoteError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Self::spawn_error(program, &err))?;

        // Dropping the handle closes stdin so the remote side sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).map_err(|err| RemoteError::Input {
                program: program.to_owned(),
                message: err.to_string(),
            })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| Self::spawn_error(program, &err))?;
        Ok(Self::collect(&output))
    }

    fn run_inherited(
        &self,
        program: &str,
        args: &[OsString],
    ) -> Result<CommandOutput, RemoteError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| Self::spawn_error(program, &err))?;

        Ok(Self::collect(&output))
    }
}
