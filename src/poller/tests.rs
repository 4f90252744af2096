//! Tests for the backoff function and the wait loop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use rstest::rstest;

use super::*;
use crate::cancel::{CancellationToken, Phase};
use crate::test_support::RecordingSleeper;

const fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

fn running(remaining: u64) -> ScrubStatus {
    ScrubStatus {
        in_progress: true,
        time_remaining: secs(remaining),
    }
}

const DONE: ScrubStatus = ScrubStatus {
    in_progress: false,
    time_remaining: Duration::ZERO,
};

#[rstest]
#[case::unknown_estimate(secs(0), secs(60), secs(0), NO_ESTIMATE_SLEEP)]
#[case::first_estimate_drifts(secs(0), secs(60), secs(2_713), NO_ESTIMATE_SLEEP)]
#[case::consistent(secs(2_713), secs(60), secs(2_653), secs(530))]
#[case::consistent_small_clamps_to_min(secs(360), secs(60), secs(300), MIN_SLEEP)]
#[case::consistent_large_clamps_to_max(secs(36_060), secs(60), secs(36_000), MAX_SLEEP)]
#[case::drift_at_threshold(secs(3_180), secs(60), secs(3_000), secs(600))]
#[case::drift_over_threshold(secs(3_181), secs(60), secs(3_000), NO_ESTIMATE_SLEEP)]
#[case::estimate_grew(secs(1_000), secs(200), secs(2_000), NO_ESTIMATE_SLEEP)]
fn next_sleep_table(
    #[case] previous_estimate: Duration,
    #[case] previous_sleep: Duration,
    #[case] current: Duration,
    #[case] expected: Duration,
) {
    assert_eq!(next_sleep(previous_estimate, previous_sleep, current), expected);
}

#[rstest]
#[case(secs(301))]
#[case(secs(4_000))]
#[case(secs(90_000))]
fn consistent_estimate_sleeps_a_fifth_clamped(#[case] remaining: Duration) {
    let sleep = next_sleep(remaining + secs(60), secs(60), remaining);
    let fifth = secs((remaining / 5).as_secs());
    assert_eq!(sleep, fifth.clamp(MIN_SLEEP, MAX_SLEEP));
}

#[rstest]
fn wait_returns_when_scrub_finishes() {
    let statuses = RefCell::new(VecDeque::from([
        running(2_713),
        running(2_653),
        running(0),
        DONE,
    ]));
    let sleeper = RecordingSleeper::new();
    let token = CancellationToken::new();
    let poller = AdaptivePoller::new(&sleeper, &token);

    let outcome = poller
        .wait(|| {
            statuses
                .borrow_mut()
                .pop_front()
                .ok_or("status sequence exhausted")
        })
        .expect("wait should finish");

    assert_eq!(outcome, WaitOutcome::Completed);
    assert_eq!(sleeper.sleeps(), vec![secs(60), secs(530), secs(60)]);
}

#[rstest]
fn wait_propagates_status_errors() {
    let sleeper = RecordingSleeper::new();
    let token = CancellationToken::new();
    let poller = AdaptivePoller::new(&sleeper, &token);

    let result: Result<WaitOutcome, &str> = poller.wait(|| Err("ssh failed"));

    assert_eq!(result, Err("ssh failed"));
    assert!(sleeper.sleeps().is_empty());
}

#[rstest]
fn wait_stops_after_interrupt() {
    let sleeper = RecordingSleeper::new();
    let token = CancellationToken::new();
    token.enter(Phase::Scrub);
    let poller = AdaptivePoller::new(&sleeper, &token);
    let mut queries = 0_u32;

    let outcome = poller
        .wait(|| -> Result<ScrubStatus, ()> {
            queries += 1;
            token.signal();
            Ok(running(600))
        })
        .expect("wait should stop");

    assert_eq!(outcome, WaitOutcome::Interrupted);
    assert_eq!(queries, 1);
}

#[rstest]
fn thread_sleeper_returns_immediately_when_interrupted() {
    let token = CancellationToken::new();
    token.enter(Phase::Scrub);
    token.signal();
    let started = std::time::Instant::now();

    ThreadSleeper.sleep_cancellable(secs(30), &token);

    assert!(started.elapsed() < secs(1));
}
