//! Remote command execution over the system `ssh` client.
//!
//! Every remote operation is a single command string sent through one `ssh`
//! invocation addressed by host, port, username and private key. The output
//! is returned verbatim; callers decide what counts as a negative result, so
//! a "No such file or directory" on stderr is data rather than an error.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::debug;

use crate::config::RemoteConfig;

mod types;
mod util;

pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use util::{expand_tilde, quote};

/// Marker printed by `ls` and `df` when a path is absent.
pub const MISSING_PATH_MARKER: &str = "No such file or directory";

/// Connection details for the backup host. Immutable for the run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteEndpoint {
    /// Hostname or IP address.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Remote user to connect as.
    pub user: String,
    /// Private key passed to `ssh -i`.
    pub identity_file: Utf8PathBuf,
}

impl RemoteEndpoint {
    /// Returns the `user@host` login target.
    #[must_use]
    pub fn login(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Errors raised when a local process cannot be started or fed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when stdin of a spawned command cannot be written.
    #[error("failed to write input to {program}: {message}")]
    Input {
        /// Command whose stdin was being written.
        program: String,
        /// Operating system error string.
        message: String,
    },
}

/// Runs commands on the backup host through `ssh`.
#[derive(Clone, Debug)]
pub struct RemoteShell<R: CommandRunner> {
    endpoint: RemoteEndpoint,
    ssh_bin: String,
    batch_mode: bool,
    strict_host_key_checking: bool,
    known_hosts_file: Option<String>,
    runner: R,
}

impl<R: CommandRunner> RemoteShell<R> {
    /// Creates a shell for the endpoint described by `config`.
    #[must_use]
    pub fn new(config: &RemoteConfig, runner: R) -> Self {
        Self {
            endpoint: config.endpoint(),
            ssh_bin: config.ssh_bin.clone(),
            batch_mode: config.batch_mode,
            strict_host_key_checking: config.strict_host_key_checking,
            known_hosts_file: config
                .known_hosts_file
                .as_deref()
                .filter(|path| !path.trim().is_empty())
                .map(expand_tilde),
            runner,
        }
    }

    /// Returns the endpoint this shell talks to.
    #[must_use]
    pub const fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    /// Returns the underlying command runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Executes `command` on the remote host and returns its output.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] when `ssh` cannot be started.
    pub fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        debug!(command, "remote command");
        let args = self.ssh_args(command);
        self.runner.run(&self.ssh_bin, &args)
    }

    /// Executes `command` on the remote host, feeding `input` to its stdin.
    ///
    /// The input is never logged.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when `ssh` cannot be started or fed.
    pub fn run_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput, RemoteError> {
        debug!(command, "remote command with stdin");
        let args = self.ssh_args(command);
        self.runner.run_with_input(&self.ssh_bin, &args, input)
    }

    /// Reports whether `path` exists on the remote host.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] when `ssh` cannot be started.
    pub fn path_exists(&self, path: &str) -> Result<bool, RemoteError> {
        let output = self.run(&format!("ls -lah {}", quote(path)))?;
        Ok(!output.stderr.contains(MISSING_PATH_MARKER))
    }

    /// Renders the `ssh` invocation used as rsync's remote shell.
    #[must_use]
    pub fn remote_shell_command(&self) -> String {
        let opts = self
            .common_ssh_options()
            .into_iter()
            .map(|arg| escape(arg.to_string_lossy()).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {}", self.ssh_bin, opts)
    }

    fn ssh_args(&self, command: &str) -> Vec<OsString> {
        let mut args = self.common_ssh_options();
        args.push(OsString::from(self.endpoint.login()));
        args.push(OsString::from(command));
        args
    }

    fn common_ssh_options(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.endpoint.port.to_string()),
            OsString::from("-i"),
            OsString::from(self.endpoint.identity_file.as_str()),
        ];

        if self.batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if let Some(ref known_hosts) = self.known_hosts_file {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!("UserKnownHostsFile={known_hosts}")));
        }

        args
    }
}

#[cfg(test)]
mod tests;
