//! Error types for the backup orchestrator.

use thiserror::Error;

use super::TeardownAction;
use crate::pool::PoolError;
use crate::preflight::PreflightError;
use crate::remote::RemoteError;
use crate::transfer::TransferError;
use crate::volume::VolumeError;

/// Errors surfaced by [`super::BackupOrchestrator::execute`].
#[derive(Debug, Error)]
pub enum BackupError {
    /// Validation failed before anything was changed.
    #[error(transparent)]
    Preflight(#[from] PreflightError),
    /// An encrypted volume transition failed.
    #[error(transparent)]
    Volume(#[from] VolumeError),
    /// A pool operation failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// A transfer could not run.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// A remote query could not run.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// `df` output for the destination could not be parsed.
    #[error("could not get disk space information for {path}")]
    DiskUsageUnavailable {
        /// Remote destination that was queried.
        path: String,
    },
    /// A step failed after the operator interrupted the run.
    #[error("operation aborted by user: {source}")]
    Aborted {
        /// Failure of the interrupted step.
        source: Box<Self>,
    },
    /// A teardown step failed; later steps were not attempted.
    #[error("teardown failed to {action}: {source}")]
    Teardown {
        /// Step that failed.
        action: TeardownAction,
        /// Underlying failure.
        source: Box<Self>,
    },
    /// A forward step failed and unwinding also failed.
    #[error("{source} (teardown also failed: {teardown})")]
    TeardownAfterFailure {
        /// Failure of the forward step.
        source: Box<Self>,
        /// Failure raised while unwinding.
        teardown: Box<Self>,
    },
}
