//! Storage pool controller.
//!
//! The pool moves between offline and online, and while online a scrub may
//! be idle or running. Every mutating command is followed by a fresh status
//! query; the command's own exit status is not trusted over ssh.

mod retention;

pub use retention::select_evictions;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::poller::{AdaptivePoller, WaitOutcome};
use crate::remote::{CommandRunner, RemoteError, RemoteShell, quote};
use crate::status::{PoolStatus, Snapshot, query_pool_status, query_snapshots};
use crate::timestamp::format_timestamp;

/// Errors raised by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The operation needs an online pool.
    #[error("pool {pool} is not online")]
    NotOnline {
        /// Pool name.
        pool: String,
    },
    /// Import was requested for a pool that is already online.
    #[error("pool {pool} is already online")]
    AlreadyOnline {
        /// Pool name.
        pool: String,
    },
    /// Export or a new scrub was requested while a scrub is running.
    #[error("pool {pool} has a scrub in progress")]
    ScrubInProgress {
        /// Pool name.
        pool: String,
    },
    /// The status query after a command did not show the expected state.
    #[error("pool {pool} is not {expected} after {action}")]
    StateMismatch {
        /// Pool name.
        pool: String,
        /// Command that was issued.
        action: &'static str,
        /// State the pool should have reached.
        expected: &'static str,
    },
    /// Refused to destroy a target that is not a snapshot.
    #[error("refusing to destroy {name}: not a snapshot")]
    NotASnapshot {
        /// Rejected target name.
        name: String,
    },
    /// Running a remote command failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Builds the `<pool>@<timestamp>` name of a snapshot taken at `at`.
#[must_use]
pub fn snapshot_name(pool: &str, at: DateTime<Utc>) -> String {
    format!("{pool}@{}", format_timestamp(at))
}

/// Controller for one named pool on the backup host.
pub struct StoragePool<'a, R: CommandRunner> {
    shell: &'a RemoteShell<R>,
    name: &'a str,
}

impl<'a, R: CommandRunner> StoragePool<'a, R> {
    /// Creates a controller for `name`.
    #[must_use]
    pub const fn new(shell: &'a RemoteShell<R>, name: &'a str) -> Self {
        Self { shell, name }
    }

    /// Returns the pool name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name
    }

    /// Queries the current pool status.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Remote`] when the query cannot run.
    pub fn status(&self) -> Result<PoolStatus, PoolError> {
        Ok(query_pool_status(self.shell, self.name)?)
    }

    /// Reports whether the pool is online.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Remote`] when the query cannot run.
    pub fn is_online(&self) -> Result<bool, PoolError> {
        Ok(self.status()?.online)
    }

    /// Imports an offline pool and confirms it came online.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AlreadyOnline`] when the pool is online before
    /// the import and [`PoolError::StateMismatch`] when it is not online
    /// afterwards.
    pub fn import(&self) -> Result<(), PoolError> {
        if self.is_online()? {
            return Err(PoolError::AlreadyOnline {
                pool: self.name.to_owned(),
            });
        }

        self.shell
            .run(&format!("sudo zpool import {}", quote(self.name)))?;
        if !self.is_online()? {
            return Err(self.mismatch("import", "online"));
        }
        info!(pool = self.name, "pool imported");
        Ok(())
    }

    /// Exports an online, idle pool and confirms it went offline.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotOnline`], [`PoolError::ScrubInProgress`] or
    /// [`PoolError::StateMismatch`].
    pub fn export(&self) -> Result<(), PoolError> {
        let status = self.status()?;
        self.require_idle(status)?;

        self.shell
            .run(&format!("sudo zpool export {}", quote(self.name)))?;
        if self.is_online()? {
            return Err(self.mismatch("export", "offline"));
        }
        info!(pool = self.name, "pool exported");
        Ok(())
    }

    /// Takes a snapshot named after `at`.
    ///
    /// The snapshot tool gives no usable failure signal, so the snapshot is
    /// reported as created once the command has run.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotOnline`] for an offline pool.
    pub fn create_snapshot(&self, at: DateTime<Utc>) -> Result<Snapshot, PoolError> {
        self.require_online()?;
        let snapshot = Snapshot::new(snapshot_name(self.name, at));
        self.shell
            .run(&format!("sudo zfs snapshot {}", quote(snapshot.name())))?;
        info!(snapshot = %snapshot, "snapshot created");
        Ok(snapshot)
    }

    /// Lists the pool's snapshots, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Remote`] when the query cannot run.
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>, PoolError> {
        Ok(query_snapshots(self.shell, self.name)?)
    }

    /// Destroys a single snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotASnapshot`] when `name` lacks the `@`
    /// separator; nothing is sent to the remote host in that case.
    pub fn destroy_snapshot(&self, name: &str) -> Result<(), PoolError> {
        if !name.contains('@') {
            return Err(PoolError::NotASnapshot {
                name: name.to_owned(),
            });
        }
        self.shell
            .run(&format!("sudo zfs destroy {}", quote(name)))?;
        info!(snapshot = name, "snapshot destroyed");
        Ok(())
    }

    /// Destroys the oldest snapshots until at most `limit` remain and
    /// returns the destroyed snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] when listing or destroying fails.
    pub fn apply_retention(&self, limit: u32) -> Result<Vec<Snapshot>, PoolError> {
        self.apply_retention_until(limit, || false)
    }

    /// Like [`Self::apply_retention`], but consults `stop` before each
    /// destroy and returns the snapshots destroyed so far once it reports
    /// `true`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] when listing or destroying fails.
    pub fn apply_retention_until(
        &self,
        limit: u32,
        stop: impl Fn() -> bool,
    ) -> Result<Vec<Snapshot>, PoolError> {
        let snapshots = self.list_snapshots()?;
        info!(pool = self.name, "snapshots: {}/{limit}", snapshots.len());

        let mut destroyed = Vec::new();
        for snapshot in select_evictions(&snapshots, limit) {
            if stop() {
                warn!(pool = self.name, "retention stopped before {snapshot}");
                break;
            }
            self.destroy_snapshot(snapshot.name())?;
            destroyed.push(snapshot.clone());
        }
        Ok(destroyed)
    }

    /// Starts a scrub and, when `poller` is given, waits for it to finish.
    ///
    /// Returns the wait outcome, or `None` when `wait_with` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotOnline`] or [`PoolError::ScrubInProgress`]
    /// before issuing anything, and [`PoolError::Remote`] when a status
    /// query fails while waiting.
    pub fn scrub(
        &self,
        wait_with: Option<&AdaptivePoller<'_>>,
    ) -> Result<Option<WaitOutcome>, PoolError> {
        let status = self.status()?;
        self.require_idle(status)?;

        self.shell
            .run(&format!("sudo zpool scrub {}", quote(self.name)))?;
        info!(pool = self.name, "scrub started");

        let Some(poller) = wait_with else {
            return Ok(None);
        };
        let outcome = poller.wait(|| self.status().map(|current| current.scrub))?;
        match outcome {
            WaitOutcome::Completed => info!(pool = self.name, "scrub finished"),
            WaitOutcome::Interrupted => warn!(pool = self.name, "stopped waiting for scrub"),
        }
        Ok(Some(outcome))
    }

    fn require_online(&self) -> Result<(), PoolError> {
        if self.is_online()? {
            Ok(())
        } else {
            Err(PoolError::NotOnline {
                pool: self.name.to_owned(),
            })
        }
    }

    fn require_idle(&self, status: PoolStatus) -> Result<(), PoolError> {
        if !status.online {
            return Err(PoolError::NotOnline {
                pool: self.name.to_owned(),
            });
        }
        if status.scrub.in_progress {
            return Err(PoolError::ScrubInProgress {
                pool: self.name.to_owned(),
            });
        }
        Ok(())
    }

    fn mismatch(&self, action: &'static str, expected: &'static str) -> PoolError {
        PoolError::StateMismatch {
            pool: self.name.to_owned(),
            action,
            expected,
        }
    }
}
