//! Read-only status queries against the backup host.
//!
//! Each query issues one remote command and hands the captured text to a
//! pure parser in [`parse`]. Parsers never see the transport and queries
//! never interpret text themselves, so format drift in the remote tools is
//! contained in one place and covered by fixtures.

mod parse;

pub use parse::{
    Connectivity, DiskSpaceInfo, PoolStatus, ScrubStatus, Snapshot, parse_connectivity,
    parse_disk_space, parse_pool_status, parse_remaining, parse_snapshot_list, parse_whereis,
};

use crate::remote::{CommandRunner, RemoteError, RemoteShell, quote};

/// Lists `/` on the remote host and classifies the result.
///
/// # Errors
///
/// Returns [`RemoteError`] when `ssh` cannot be started.
pub fn check_connectivity<R: CommandRunner>(
    shell: &RemoteShell<R>,
) -> Result<Connectivity, RemoteError> {
    let output = shell.run("ls /")?;
    Ok(parse_connectivity(&output))
}

/// Reports whether rsync is installed on the remote host.
///
/// # Errors
///
/// Returns [`RemoteError`] when `ssh` cannot be started.
pub fn rsync_installed<R: CommandRunner>(shell: &RemoteShell<R>) -> Result<bool, RemoteError> {
    let output = shell.run("whereis rsync")?;
    Ok(parse_whereis(&output))
}

/// Reports whether a remote directory has no entries.
///
/// # Errors
///
/// Returns [`RemoteError`] when `ssh` cannot be started.
pub fn directory_is_empty<R: CommandRunner>(
    shell: &RemoteShell<R>,
    dir: &str,
) -> Result<bool, RemoteError> {
    let output = shell.run(&format!("ls {}", quote(dir)))?;
    Ok(output.stdout.trim().is_empty())
}

/// Queries disk usage of a remote directory; `None` when unavailable.
///
/// # Errors
///
/// Returns [`RemoteError`] when `ssh` cannot be started.
pub fn query_disk_space<R: CommandRunner>(
    shell: &RemoteShell<R>,
    dir: &str,
) -> Result<Option<DiskSpaceInfo>, RemoteError> {
    let output = shell.run(&format!("df -h {}", quote(dir)))?;
    Ok(parse_disk_space(&output))
}

/// Queries the state of a storage pool.
///
/// # Errors
///
/// Returns [`RemoteError`] when `ssh` cannot be started.
pub fn query_pool_status<R: CommandRunner>(
    shell: &RemoteShell<R>,
    pool: &str,
) -> Result<PoolStatus, RemoteError> {
    let output = shell.run(&format!("zpool status {}", quote(pool)))?;
    Ok(parse_pool_status(pool, &output.stdout))
}

/// Lists the snapshots of `pool`, oldest first.
///
/// # Errors
///
/// Returns [`RemoteError`] when `ssh` cannot be started.
pub fn query_snapshots<R: CommandRunner>(
    shell: &RemoteShell<R>,
    pool: &str,
) -> Result<Vec<Snapshot>, RemoteError> {
    let output = shell.run("zfs list -t snapshot")?;
    // `zfs` reports the empty state on stderr.
    let text = format!("{}{}", output.stdout, output.stderr);
    Ok(parse_snapshot_list(pool, &text))
}
