//! Pure parsers over the human-readable output of the remote tools.

use std::fmt;
use std::time::Duration;

use crate::remote::{CommandOutput, MISSING_PATH_MARKER};

const ONLINE_MARKER: &str = "state: ONLINE";
const SCRUB_RUNNING_MARKER: &str = "scrub in progress";
const NO_ESTIMATE_MARKER: &str = "no estimated completion time";
const PROGRESS_PREFIX: &str = "% done, ";
const PROGRESS_SUFFIX: &str = " to go";
const NO_DATASETS_MARKER: &str = "no datasets available";
const PERMISSION_DENIED_MARKER: &str = "permission denied";
const ROOT_DIRECTORIES: [&str; 3] = ["bin", "boot", "dev"];

/// Scrub state reported by `zpool status`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScrubStatus {
    /// Whether a scrub is currently running.
    pub in_progress: bool,
    /// Estimated remaining time; zero when unknown.
    pub time_remaining: Duration,
}

/// Snapshot of a pool's state, derived fresh on every query.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStatus {
    /// Whether `zpool status` knows the pool.
    pub exists: bool,
    /// Whether the pool reports `state: ONLINE`.
    pub online: bool,
    /// Scrub progress.
    pub scrub: ScrubStatus,
}

/// Parses `zpool status <pool>` output.
///
/// ```
/// use std::time::Duration;
/// use offsite::status::parse_pool_status;
///
/// let text = " pool: tank\n state: ONLINE\n  scan: scrub in progress since Sun\n\
///     \t0B repaired, 25.00% done, 00:45:13 to go\n";
/// let status = parse_pool_status("tank", text);
/// assert!(status.online);
/// assert_eq!(status.scrub.time_remaining, Duration::from_secs(45 * 60 + 13));
/// ```
#[must_use]
pub fn parse_pool_status(pool: &str, text: &str) -> PoolStatus {
    if !text.contains(&format!("pool: {pool}")) {
        return PoolStatus::default();
    }

    let in_progress = text.contains(SCRUB_RUNNING_MARKER);
    let time_remaining = if in_progress && !text.contains(NO_ESTIMATE_MARKER) {
        remaining_estimate(text).unwrap_or_default()
    } else {
        Duration::ZERO
    };

    PoolStatus {
        exists: true,
        online: text.contains(ONLINE_MARKER),
        scrub: ScrubStatus {
            in_progress,
            time_remaining,
        },
    }
}

fn remaining_estimate(text: &str) -> Option<Duration> {
    let start = text.find(PROGRESS_PREFIX)? + PROGRESS_PREFIX.len();
    let rest = text.get(start..)?;
    let end = rest.find(PROGRESS_SUFFIX)?;
    parse_remaining(rest.get(..end)?)
}

/// Parses `HH:MM:SS` or `N days HH:MM:SS`.
///
/// Returns `None` for anything else.
#[must_use]
pub fn parse_remaining(value: &str) -> Option<Duration> {
    let trimmed = value.trim();
    let (days, clock) = match trimmed.split_once(" days ") {
        Some((day_part, clock_part)) => (day_part.trim().parse::<u64>().ok()?, clock_part),
        None => (0, trimmed),
    };

    let mut fields = clock.trim().split(':');
    let hours = fields.next()?.parse::<u64>().ok()?;
    let minutes = fields.next()?.parse::<u64>().ok()?;
    let seconds = fields.next()?.parse::<u64>().ok()?;
    if fields.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }

    let total = days
        .checked_mul(24)?
        .checked_add(hours)?
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(seconds)?;
    Some(Duration::from_secs(total))
}

/// Disk usage of a directory as reported by `df -h`.
///
/// Values stay human-readable strings; they are only displayed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiskSpaceInfo {
    /// Filesystem or device backing the directory.
    pub filesystem: String,
    /// Total capacity.
    pub total: String,
    /// Used capacity.
    pub used: String,
}

impl fmt::Display for DiskSpaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.used, self.total, self.filesystem)
    }
}

/// Parses `df -h <dir>` output.
///
/// Returns `None` when the directory is missing or the output does not split
/// into exactly three newline-separated pieces. Only the line count is
/// checked; the text after the data line is ignored.
#[must_use]
pub fn parse_disk_space(output: &CommandOutput) -> Option<DiskSpaceInfo> {
    if output.stderr.contains(MISSING_PATH_MARKER) {
        return None;
    }

    let lines: Vec<&str> = output.stdout.split('\n').collect();
    let [_header, row, _trailing] = lines.as_slice() else {
        return None;
    };

    let mut tokens = row.split_whitespace();
    Some(DiskSpaceInfo {
        filesystem: tokens.next()?.to_owned(),
        total: tokens.next()?.to_owned(),
        used: tokens.next()?.to_owned(),
    })
}

/// A pool snapshot named `<pool>@<timestamp>`.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Snapshot {
    name: String,
}

impl Snapshot {
    /// Wraps a full snapshot name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the full `<pool>@<timestamp>` name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pool part of the name.
    #[must_use]
    pub fn pool(&self) -> &str {
        self.name.split_once('@').map_or(&self.name, |(pool, _)| pool)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Parses `zfs list -t snapshot` output into the snapshots of `pool`,
/// oldest first.
#[must_use]
pub fn parse_snapshot_list(pool: &str, text: &str) -> Vec<Snapshot> {
    if !text.contains(pool) || text.contains(NO_DATASETS_MARKER) {
        return Vec::new();
    }

    let prefix = format!("{pool}@");
    let mut snapshots: Vec<Snapshot> = text
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| name.starts_with(&prefix))
        .map(Snapshot::new)
        .collect();
    snapshots.sort();
    snapshots
}

/// Result of listing `/` on the remote host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Connectivity {
    /// The listing looks like a root filesystem.
    Reachable,
    /// The remote side refused access.
    PermissionDenied,
    /// The listing lacks expected top-level directories.
    UnexpectedListing,
}

impl Connectivity {
    /// Returns `true` for [`Connectivity::Reachable`].
    #[must_use]
    pub const fn is_reachable(self) -> bool {
        matches!(self, Self::Reachable)
    }
}

/// Classifies the output of `ls /`.
#[must_use]
pub fn parse_connectivity(output: &CommandOutput) -> Connectivity {
    if output
        .stderr
        .to_lowercase()
        .contains(PERMISSION_DENIED_MARKER)
    {
        return Connectivity::PermissionDenied;
    }

    let entries: Vec<&str> = output.stdout.split_whitespace().collect();
    if ROOT_DIRECTORIES
        .iter()
        .all(|expected| entries.contains(expected))
    {
        Connectivity::Reachable
    } else {
        Connectivity::UnexpectedListing
    }
}

/// Interprets `whereis rsync`: installed when a path follows the label.
#[must_use]
pub fn parse_whereis(output: &CommandOutput) -> bool {
    output
        .stdout
        .trim()
        .strip_prefix("rsync:")
        .is_some_and(|paths| !paths.trim().is_empty())
}
