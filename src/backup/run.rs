//! Per-invocation run state: current phase and pending teardown.

use std::fmt;

use crate::cancel::{CancellationToken, Phase};

/// Undo step registered by a successful setup step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TeardownAction {
    /// Export the storage pool.
    ExportPool,
    /// Unmount the encrypted volume from the destination.
    UnmountVolume,
    /// Lock the encrypted volume.
    CloseVolume,
}

impl fmt::Display for TeardownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ExportPool => "export pool",
            Self::UnmountVolume => "unmount volume",
            Self::CloseVolume => "close volume",
        };
        f.write_str(label)
    }
}

/// Transient state of one backup invocation.
#[derive(Debug)]
pub struct BackupRun {
    token: CancellationToken,
    phase: Phase,
    teardown: Vec<TeardownAction>,
}

impl BackupRun {
    /// Starts a run in [`Phase::Preflight`], publishing phases to `token`.
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        token.enter(Phase::Preflight);
        Self {
            token,
            phase: Phase::Preflight,
            teardown: Vec::new(),
        }
    }

    /// Moves the run into `phase`.
    pub fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.token.enter(phase);
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Registers an undo step.
    pub fn register(&mut self, action: TeardownAction) {
        self.teardown.push(action);
    }

    /// Returns the pending undo steps in registration order.
    #[must_use]
    pub fn pending(&self) -> &[TeardownAction] {
        &self.teardown
    }

    /// Removes and returns the next undo step (last registered first).
    pub fn next_teardown(&mut self) -> Option<TeardownAction> {
        self.teardown.pop()
    }
}
