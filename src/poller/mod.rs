//! Adaptive wait for long-running pool maintenance.
//!
//! The scrub reports its own remaining time, which may be missing or jump
//! around. A consistent estimate lets the poller sleep for a fraction of the
//! remaining time; a missing or drifting one falls back to a short fixed
//! interval. The loop has no iteration cap and ends only when the scrub
//! reports completion or the run is interrupted.

use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::cancel::CancellationToken;
use crate::status::ScrubStatus;

/// Shortest sleep between two status queries.
pub const MIN_SLEEP: Duration = Duration::from_secs(60);
/// Sleep used before the first estimate has been seen.
pub const DEFAULT_SLEEP: Duration = Duration::from_secs(60);
/// Longest sleep between two status queries.
pub const MAX_SLEEP: Duration = Duration::from_secs(60 * 60);
/// Sleep used when the estimate is missing or untrustworthy.
pub const NO_ESTIMATE_SLEEP: Duration = Duration::from_secs(60);
/// Largest tolerated difference between expected and reported remaining time.
pub const ACCEPTED_DRIFT: Duration = Duration::from_secs(2 * 60);
/// Share of the remaining time slept when the estimate is trusted.
pub const SLEEP_PERCENT_OF_REMAINING: u32 = 20;

const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// Computes the next sleep from the previous estimate, the previous sleep
/// and the currently reported remaining time.
///
/// The drift is `|previous_estimate - previous_sleep - current_remaining|`,
/// which assumes the previous sleep matched the elapsed wall-clock time.
///
/// ```
/// use std::time::Duration;
/// use offsite::poller::next_sleep;
///
/// let sleep = next_sleep(
///     Duration::from_secs(3_060),
///     Duration::from_secs(60),
///     Duration::from_secs(3_000),
/// );
/// assert_eq!(sleep, Duration::from_secs(600));
/// ```
#[must_use]
pub fn next_sleep(
    previous_estimate: Duration,
    previous_sleep: Duration,
    current_remaining: Duration,
) -> Duration {
    let proposed = if current_remaining.is_zero() {
        NO_ESTIMATE_SLEEP
    } else {
        let expected =
            i128::from(previous_estimate.as_secs()) - i128::from(previous_sleep.as_secs());
        let drift = (expected - i128::from(current_remaining.as_secs())).unsigned_abs();
        if drift > u128::from(ACCEPTED_DRIFT.as_secs()) {
            NO_ESTIMATE_SLEEP
        } else {
            let share = current_remaining.saturating_mul(SLEEP_PERCENT_OF_REMAINING) / 100;
            Duration::from_secs(share.as_secs())
        }
    };
    proposed.clamp(MIN_SLEEP, MAX_SLEEP)
}

/// Blocking sleep seam so the wait loop runs without real time in tests.
pub trait Sleeper {
    /// Sleeps for `duration`.
    fn sleep(&self, duration: Duration);

    /// Sleeps for `duration`, returning early once `token` records an
    /// interrupt.
    fn sleep_cancellable(&self, duration: Duration, token: &CancellationToken) {
        if !token.is_interrupted() {
            self.sleep(duration);
        }
    }
}

/// Sleeps on the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn sleep_cancellable(&self, duration: Duration, token: &CancellationToken) {
        let mut left = duration;
        while !left.is_zero() && !token.is_interrupted() {
            let slice = left.min(SLEEP_SLICE);
            thread::sleep(slice);
            left = left.saturating_sub(slice);
        }
    }
}

/// How a wait ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitOutcome {
    /// The task reported completion.
    Completed,
    /// An interrupt was recorded before completion.
    Interrupted,
}

/// Wait loop driven by self-reported remaining-time estimates.
pub struct AdaptivePoller<'a> {
    sleeper: &'a dyn Sleeper,
    token: &'a CancellationToken,
}

impl<'a> AdaptivePoller<'a> {
    /// Creates a poller that sleeps through `sleeper` and stops early when
    /// `token` records an interrupt.
    #[must_use]
    pub fn new(sleeper: &'a dyn Sleeper, token: &'a CancellationToken) -> Self {
        Self { sleeper, token }
    }

    /// Polls `query` until it reports no task in progress.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `query`.
    pub fn wait<E, F>(&self, mut query: F) -> Result<WaitOutcome, E>
    where
        F: FnMut() -> Result<ScrubStatus, E>,
    {
        let mut previous_estimate = Duration::ZERO;
        let mut previous_sleep = DEFAULT_SLEEP;

        loop {
            if self.token.is_interrupted() {
                return Ok(WaitOutcome::Interrupted);
            }

            let status = query()?;
            if !status.in_progress {
                return Ok(WaitOutcome::Completed);
            }

            let sleep = next_sleep(previous_estimate, previous_sleep, status.time_remaining);
            let wake = chrono::Duration::from_std(sleep)
                .ok()
                .and_then(|delta| Utc::now().checked_add_signed(delta))
                .map_or_else(String::new, |at| at.format("%H:%M:%S UTC").to_string());
            info!(
                remaining_secs = status.time_remaining.as_secs(),
                sleep_secs = sleep.as_secs(),
                "scrub in progress, next check at {wake}"
            );

            previous_estimate = status.time_remaining;
            previous_sleep = sleep;
            self.sleeper.sleep_cancellable(sleep, self.token);
        }
    }
}

#[cfg(test)]
mod tests;
