//! Ordered, fail-fast, read-only checks run before anything is changed.
//!
//! Every check is logged with a `[PASS]`/`[FAIL]` marker and the sequence
//! stops at the first failure. Nothing here issues a state-changing
//! command, so running the validator twice against an unchanged host gives
//! the same report.

use camino::Utf8Path;
use thiserror::Error;
use tracing::error;

use crate::config::BackupSettings;
use crate::remote::{CommandRunner, RemoteError, RemoteShell};
use crate::report::log_check;
use crate::status::{
    check_connectivity, directory_is_empty, query_pool_status, rsync_installed,
};

/// A single preflight check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Check {
    /// The local private key exists.
    IdentityFile,
    /// A configured source directory exists locally.
    SourceDirectory,
    /// `ls /` on the remote host looks like a root filesystem.
    Connectivity,
    /// The remote destination exists.
    DestinationExists,
    /// The remote destination ends with `/`.
    DestinationIsDirectory,
    /// rsync is installed on the remote host.
    RsyncInstalled,
    /// The pool is offline so it can be imported.
    PoolOffline,
    /// The pool is already online.
    PoolOnline,
    /// The encrypted container file exists.
    ContainerExists,
    /// The encrypted container is not yet unlocked.
    ContainerClosed,
    /// Mounting onto the destination does not clash with the pool.
    MountExclusive,
    /// The mount target has no entries.
    DestinationEmpty,
}

impl Check {
    /// Returns the human-readable label logged for this check.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::IdentityFile => "Private key present",
            Self::SourceDirectory => "Source directory present",
            Self::Connectivity => "Remote host reachable",
            Self::DestinationExists => "Remote destination exists",
            Self::DestinationIsDirectory => "Remote destination is a directory",
            Self::RsyncInstalled => "Remote rsync installed",
            Self::PoolOffline => "Pool offline before import",
            Self::PoolOnline => "Pool online",
            Self::ContainerExists => "Encrypted container exists",
            Self::ContainerClosed => "Encrypted container closed",
            Self::MountExclusive => "Mount target not managed by pool",
            Self::DestinationEmpty => "Mount target empty",
        }
    }
}

/// Outcome of one check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CheckResult {
    /// Which check ran.
    pub check: Check,
    /// Path or name the check was about, when there are several.
    pub subject: Option<String>,
    /// Whether the check passed.
    pub passed: bool,
}

impl CheckResult {
    fn label(&self) -> String {
        self.subject.as_ref().map_or_else(
            || self.check.label().to_owned(),
            |subject| format!("{} ({subject})", self.check.label()),
        )
    }
}

/// Checks run so far, in order; ends at the first failure.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PreflightReport {
    results: Vec<CheckResult>,
}

impl PreflightReport {
    /// Returns the results in the order the checks ran.
    #[must_use]
    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    /// Returns the failing check, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&CheckResult> {
        self.results.iter().find(|result| !result.passed)
    }

    /// Returns `true` when every check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failure().is_none()
    }

    fn record(&mut self, check: Check, subject: Option<&str>, passed: bool) -> bool {
        let result = CheckResult {
            check,
            subject: subject.map(str::to_owned),
            passed,
        };
        log_check(&result.label(), passed);
        self.results.push(result);
        passed
    }
}

/// Errors raised by [`Preflight::run`].
#[derive(Debug, Error)]
pub enum PreflightError {
    /// A check failed.
    #[error("preflight check failed: {}", .result.label())]
    CheckFailed {
        /// The failing check.
        result: CheckResult,
    },
    /// Mount-to-destination was requested with the pool enabled.
    #[error(
        "configuration error: mount_to_destination cannot be combined with pool_enabled"
    )]
    ConfigurationConflict,
    /// A remote query could not run.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Runs the preflight checks for one backup run.
pub struct Preflight<'a, R: CommandRunner> {
    settings: &'a BackupSettings,
    shell: &'a RemoteShell<R>,
}

impl<'a, R: CommandRunner> Preflight<'a, R> {
    /// Creates a validator over `settings`.
    #[must_use]
    pub const fn new(settings: &'a BackupSettings, shell: &'a RemoteShell<R>) -> Self {
        Self { settings, shell }
    }

    /// Runs the checks and fails on the first failing one.
    ///
    /// # Errors
    ///
    /// Returns [`PreflightError::ConfigurationConflict`] when a volume mount
    /// clashes with the pool, [`PreflightError::CheckFailed`] for any other
    /// failing check and [`PreflightError::Remote`] when a query cannot run.
    pub fn run(&self) -> Result<PreflightReport, PreflightError> {
        let report = self.evaluate()?;
        match report.failure() {
            None => Ok(report),
            Some(result) if result.check == Check::MountExclusive => {
                error!("configuration error: the pool mounts the destination itself");
                Err(PreflightError::ConfigurationConflict)
            }
            Some(result) => Err(PreflightError::CheckFailed {
                result: result.clone(),
            }),
        }
    }

    /// Runs the checks in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when a remote query cannot run.
    pub fn evaluate(&self) -> Result<PreflightReport, RemoteError> {
        let mut report = PreflightReport::default();
        let _completed = self.local_checks(&mut report)
            && self.remote_checks(&mut report)?
            && self.pool_checks(&mut report)?
            && self.volume_checks(&mut report)?;
        Ok(report)
    }

    fn local_checks(&self, report: &mut PreflightReport) -> bool {
        let identity = self.shell.endpoint().identity_file.clone();
        if !report.record(Check::IdentityFile, None, identity.exists()) {
            return false;
        }
        self.settings.transfer.sources.iter().all(|source| {
            report.record(
                Check::SourceDirectory,
                Some(source),
                Utf8Path::new(source).is_dir(),
            )
        })
    }

    fn remote_checks(&self, report: &mut PreflightReport) -> Result<bool, RemoteError> {
        let destination = self.settings.remote.destination.as_str();
        Ok(report.record(
            Check::Connectivity,
            None,
            check_connectivity(self.shell)?.is_reachable(),
        ) && report.record(
            Check::DestinationExists,
            None,
            self.shell.path_exists(destination)?,
        ) && report.record(
            Check::DestinationIsDirectory,
            None,
            destination.ends_with('/'),
        ) && report.record(Check::RsyncInstalled, None, rsync_installed(self.shell)?))
    }

    fn pool_checks(&self, report: &mut PreflightReport) -> Result<bool, RemoteError> {
        let pool = &self.settings.pool;
        if !pool.pool_enabled {
            return Ok(true);
        }
        let online = query_pool_status(self.shell, &pool.pool_name)?.online;
        Ok(if pool.import_pool {
            report.record(Check::PoolOffline, Some(&pool.pool_name), !online)
        } else {
            report.record(Check::PoolOnline, Some(&pool.pool_name), online)
        })
    }

    fn volume_checks(&self, report: &mut PreflightReport) -> Result<bool, RemoteError> {
        let volume = &self.settings.volume;
        if !volume.volume_enabled {
            return Ok(true);
        }
        let by_id = format!("/dev/disk/by-id/dm-name-{}", volume.mapper_name);
        let prepared = report.record(
            Check::ContainerExists,
            Some(&volume.container),
            self.shell.path_exists(&volume.container)?,
        ) && report.record(
            Check::ContainerClosed,
            Some(&volume.mapper_name),
            !self.shell.path_exists(&by_id)?,
        );
        if !prepared || !volume.mount_to_destination {
            return Ok(prepared);
        }

        let destination = self.settings.remote.destination.as_str();
        Ok(report.record(
            Check::MountExclusive,
            None,
            !self.settings.pool.pool_enabled,
        ) && report.record(
            Check::DestinationEmpty,
            Some(destination),
            directory_is_empty(self.shell, destination)?,
        ))
    }
}
