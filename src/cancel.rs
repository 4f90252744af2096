//! Cancellation token and the interrupt policy of each run phase.
//!
//! An interrupt is only recoverable inside the transfer block
//! (transfer, snapshot, usage report, scrub). There the first signal is
//! recorded and the run proceeds to teardown; everywhere else a signal
//! terminates the process without teardown. The asymmetry lives in
//! [`Phase::interrupt_policy`] so it can be read and tested as a table.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Step of a backup run currently executing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Read-only validation, including volume unlock and mount.
    Preflight,
    /// Pool import.
    Import,
    /// Disk usage before the transfer.
    UsageBefore,
    /// rsync transfers.
    Transfer,
    /// Snapshot creation and retention.
    Snapshot,
    /// Disk usage after the transfer.
    UsageAfter,
    /// Scrub start and wait.
    Scrub,
    /// Export, unmount and close.
    Teardown,
    /// Run completed.
    Finished,
}

/// What a cancellation signal does in a given phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterruptPolicy {
    /// Record the interrupt and continue into teardown.
    ProceedToTeardown,
    /// Exit immediately without teardown.
    Terminate,
}

impl Phase {
    /// Returns the interrupt policy for this phase.
    #[must_use]
    pub const fn interrupt_policy(self) -> InterruptPolicy {
        match self {
            Self::Transfer | Self::Snapshot | Self::UsageAfter | Self::Scrub => {
                InterruptPolicy::ProceedToTeardown
            }
            Self::Preflight
            | Self::Import
            | Self::UsageBefore
            | Self::Teardown
            | Self::Finished => InterruptPolicy::Terminate,
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Preflight => 0,
            Self::Import => 1,
            Self::UsageBefore => 2,
            Self::Transfer => 3,
            Self::Snapshot => 4,
            Self::UsageAfter => 5,
            Self::Scrub => 6,
            Self::Teardown => 7,
            Self::Finished => 8,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Import,
            2 => Self::UsageBefore,
            3 => Self::Transfer,
            4 => Self::Snapshot,
            5 => Self::UsageAfter,
            6 => Self::Scrub,
            7 => Self::Teardown,
            8 => Self::Finished,
            _ => Self::Preflight,
        }
    }
}

/// Outcome of delivering a signal to the token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalDisposition {
    /// The interrupt was recorded; the run will wind down through teardown.
    Deferred,
    /// The caller must terminate the process now.
    Terminate,
}

/// Shared cancellation state between the signal handler and the run.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    interrupted: Arc<AtomicBool>,
    phase: Arc<AtomicU8>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Creates a token in the [`Phase::Preflight`] phase.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interrupted: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(AtomicU8::new(Phase::Preflight.to_u8())),
        }
    }

    /// Records the phase the run has entered.
    pub fn enter(&self, phase: Phase) {
        self.phase.store(phase.to_u8(), Ordering::SeqCst);
    }

    /// Returns the phase the run is currently in.
    #[must_use]
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Delivers a cancellation signal.
    ///
    /// The first signal in a phase whose policy is
    /// [`InterruptPolicy::ProceedToTeardown`] is deferred; any other signal
    /// asks the caller to terminate.
    pub fn signal(&self) -> SignalDisposition {
        match self.phase().interrupt_policy() {
            InterruptPolicy::ProceedToTeardown => {
                if self.interrupted.swap(true, Ordering::SeqCst) {
                    SignalDisposition::Terminate
                } else {
                    SignalDisposition::Deferred
                }
            }
            InterruptPolicy::Terminate => SignalDisposition::Terminate,
        }
    }

    /// Returns `true` once a deferred interrupt has been recorded.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Phase::Preflight, InterruptPolicy::Terminate)]
    #[case(Phase::Import, InterruptPolicy::Terminate)]
    #[case(Phase::UsageBefore, InterruptPolicy::Terminate)]
    #[case(Phase::Transfer, InterruptPolicy::ProceedToTeardown)]
    #[case(Phase::Snapshot, InterruptPolicy::ProceedToTeardown)]
    #[case(Phase::UsageAfter, InterruptPolicy::ProceedToTeardown)]
    #[case(Phase::Scrub, InterruptPolicy::ProceedToTeardown)]
    #[case(Phase::Teardown, InterruptPolicy::Terminate)]
    #[case(Phase::Finished, InterruptPolicy::Terminate)]
    fn policy_table(#[case] phase: Phase, #[case] expected: InterruptPolicy) {
        assert_eq!(phase.interrupt_policy(), expected);
    }

    #[rstest]
    fn signal_outside_block_terminates() {
        let token = CancellationToken::new();
        token.enter(Phase::Import);
        assert_eq!(token.signal(), SignalDisposition::Terminate);
        assert!(!token.is_interrupted());
    }

    #[rstest]
    fn first_signal_in_block_is_deferred_second_terminates() {
        let token = CancellationToken::new();
        token.enter(Phase::Transfer);
        assert_eq!(token.signal(), SignalDisposition::Deferred);
        assert!(token.is_interrupted());
        assert_eq!(token.signal(), SignalDisposition::Terminate);
    }

    #[rstest]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let handler = token.clone();
        token.enter(Phase::Scrub);
        assert_eq!(handler.phase(), Phase::Scrub);
        assert_eq!(handler.signal(), SignalDisposition::Deferred);
        assert!(token.is_interrupted());
    }
}
