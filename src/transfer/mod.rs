//! rsync transfer of one local source directory to the remote destination.
//!
//! rsync runs locally and reaches the backup host through the same `ssh`
//! options the remote shell uses. Each transfer writes a timestamped rsync
//! log file unless the configured arguments already name one.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TransferConfig;
use crate::remote::{CommandOutput, CommandRunner, RemoteError, RemoteShell};
use crate::timestamp::format_timestamp;

const LOG_FILE_FLAG: &str = "--log-file=";

/// Errors raised while transferring a source directory.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The local source directory is missing.
    #[error("source directory {path} does not exist")]
    MissingSource {
        /// Source that was requested.
        path: Utf8PathBuf,
    },
    /// rsync could not be started.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Result of one rsync run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferOutcome {
    /// Source directory that was transferred.
    pub source: String,
    /// rsync exit code, if the process reported one.
    pub code: Option<i32>,
    /// Generated log file, when one was requested.
    pub log_file: Option<Utf8PathBuf>,
}

impl TransferOutcome {
    /// Returns `true` when rsync exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Returns the log file name for a transfer of `source` started at `at`.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use offsite::transfer::log_file_name;
///
/// let at = Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).single().expect("valid");
/// assert_eq!(
///     log_file_name("/srv/data", at),
///     "rsync-log--2024-01-04--00-00-00--.srv.data"
/// );
/// ```
#[must_use]
pub fn log_file_name(source: &str, at: DateTime<Utc>) -> String {
    format!(
        "rsync-log--{}--{}",
        format_timestamp(at),
        source.replace('/', ".")
    )
}

/// Copies source directories to the remote destination with rsync.
pub struct Transfer<'a, R: CommandRunner> {
    shell: &'a RemoteShell<R>,
    config: &'a TransferConfig,
    destination: &'a str,
}

impl<'a, R: CommandRunner> Transfer<'a, R> {
    /// Creates a transfer into `destination` on the host behind `shell`.
    #[must_use]
    pub const fn new(
        shell: &'a RemoteShell<R>,
        config: &'a TransferConfig,
        destination: &'a str,
    ) -> Self {
        Self {
            shell,
            config,
            destination,
        }
    }

    /// Runs rsync for `source`.
    ///
    /// A non-zero rsync exit is logged as a warning and reported in the
    /// outcome rather than returned as an error.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MissingSource`] when `source` is not a local
    /// directory and [`TransferError::Remote`] when rsync cannot be started.
    pub fn run(&self, source: &str, at: DateTime<Utc>) -> Result<TransferOutcome, TransferError> {
        let (args, log_file) = self.build_args(source, at)?;
        info!(source, "rsync local directory");

        let runner = self.shell.runner();
        let output = if self.config.log_output {
            runner.run(&self.config.rsync_bin, &args)?
        } else {
            runner.run_inherited(&self.config.rsync_bin, &args)?
        };
        Self::log_output(source, &output);

        Ok(TransferOutcome {
            source: source.to_owned(),
            code: output.code,
            log_file,
        })
    }

    /// Builds the rsync argument vector for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MissingSource`] when `source` is not a local
    /// directory.
    pub fn build_args(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<(Vec<OsString>, Option<Utf8PathBuf>), TransferError> {
        if !Utf8Path::new(source).is_dir() {
            return Err(TransferError::MissingSource {
                path: Utf8PathBuf::from(source),
            });
        }

        let mut args: Vec<OsString> = self
            .config
            .rsync_args
            .split_whitespace()
            .map(OsString::from)
            .collect();

        let log_file = if self.config.rsync_args.contains(LOG_FILE_FLAG) {
            info!("log-file option present in rsync arguments; skipping generated log file");
            None
        } else {
            let path = Utf8Path::new(&self.config.log_dir).join(log_file_name(source, at));
            args.push(OsString::from(format!("{LOG_FILE_FLAG}{path}")));
            Some(path)
        };

        args.push(OsString::from("--rsh"));
        args.push(OsString::from(self.shell.remote_shell_command()));
        args.push(OsString::from(source));
        args.push(OsString::from(format!(
            "{}:{}",
            self.shell.endpoint().login(),
            self.destination
        )));
        Ok((args, log_file))
    }

    fn log_output(source: &str, output: &CommandOutput) {
        if !output.stdout.trim().is_empty() {
            info!("{}", output.stdout.trim_end());
        }
        if !output.stderr.trim().is_empty() {
            info!("{}", output.stderr.trim_end());
        }
        if !output.is_success() {
            let status = output
                .code
                .map_or_else(|| String::from("unknown"), |code| code.to_string());
            warn!(source, status = %status, "rsync reported a non-zero exit status");
        }
    }
}

#[cfg(test)]
mod tests;
