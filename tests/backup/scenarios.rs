//! BDD scenarios for the backup workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{BackupContext, backup_context};

#[scenario(
    path = "tests/features/backup.feature",
    name = "Back up a source into an imported pool"
)]
fn scenario_full_backup(backup_context: BackupContext) {
    drop(backup_context);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Keep only the newest snapshots"
)]
fn scenario_retention(backup_context: BackupContext) {
    drop(backup_context);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Tear down after an interrupt during transfer"
)]
fn scenario_interrupt_teardown(backup_context: BackupContext) {
    drop(backup_context);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Reject mounting the volume while a pool is configured"
)]
fn scenario_mount_conflict(backup_context: BackupContext) {
    drop(backup_context);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Validation is read-only and repeatable"
)]
fn scenario_read_only_validation(backup_context: BackupContext) {
    drop(backup_context);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Interrupt while the snapshot is taken keeps old snapshots"
)]
fn scenario_interrupt_snapshot(backup_context: BackupContext) {
    drop(backup_context);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Interrupt that kills the usage query still tears down"
)]
fn scenario_interrupt_usage_query(backup_context: BackupContext) {
    drop(backup_context);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Interrupt during the scrub leaves the busy pool imported"
)]
fn scenario_interrupt_scrub(backup_context: BackupContext) {
    drop(backup_context);
}
