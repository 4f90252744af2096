//! Snapshot retention policy.

use crate::status::Snapshot;

/// Returns the snapshots to destroy so at most `limit` remain.
///
/// `snapshots` must be ordered oldest first; the oldest excess entries are
/// selected and nothing is selected when the list is within the limit.
///
/// ```
/// use offsite::pool::select_evictions;
/// use offsite::status::Snapshot;
///
/// let snapshots = [
///     Snapshot::new("p@2024-01-01--00-00-00"),
///     Snapshot::new("p@2024-01-02--00-00-00"),
///     Snapshot::new("p@2024-01-03--00-00-00"),
/// ];
/// assert_eq!(select_evictions(&snapshots, 2), &snapshots[..1]);
/// ```
#[must_use]
pub fn select_evictions(snapshots: &[Snapshot], limit: u32) -> &[Snapshot] {
    let keep = usize::try_from(limit).unwrap_or(usize::MAX);
    let excess = snapshots.len().saturating_sub(keep);
    snapshots.get(..excess).unwrap_or_default()
}
