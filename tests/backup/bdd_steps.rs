//! BDD step definitions for the `offsite backup` workflow.

use offsite::{BackupError, PoolError, PreflightError, TeardownAction};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{BackupContext, BackupOutcome, CONTAINER};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Preflight(#[from] PreflightError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn take_outcome(backup_context: &BackupContext) -> Result<BackupOutcome, StepError> {
    backup_context
        .outcome
        .borrow_mut()
        .take()
        .ok_or_else(|| StepError::Assertion(String::from("no backup has run")))
}

fn restore(backup_context: &BackupContext, outcome: BackupOutcome) {
    backup_context.outcome.replace(Some(outcome));
}

#[given("a backup host with pool \"{name}\" offline")]
fn host_with_offline_pool(backup_context: &BackupContext, name: String) {
    backup_context.host.add_pool(&name, false);
    backup_context.settings.borrow_mut().pool.pool_name = name;
}

#[given("the pool already holds 3 dated snapshots")]
fn pool_with_snapshots(backup_context: &BackupContext) {
    backup_context.host.add_snapshots(&[
        "tank@2024-01-01--00-00-00",
        "tank@2024-01-02--00-00-00",
        "tank@2024-01-03--00-00-00",
    ]);
}

#[given("the snapshot limit is \"{limit}\"")]
fn snapshot_limit(backup_context: &BackupContext, limit: u32) {
    backup_context.settings.borrow_mut().pool.snapshot_limit = limit;
}

fn configure_volume(backup_context: &BackupContext, mapper: &str, mount: bool) {
    backup_context
        .host
        .add_volume(CONTAINER, mapper, "correct horse");
    let mut settings = backup_context.settings.borrow_mut();
    settings.volume.volume_enabled = true;
    settings.volume.container = String::from(CONTAINER);
    settings.volume.mapper_name = mapper.to_owned();
    settings.volume.mount_to_destination = mount;
}

#[given("an encrypted volume \"{mapper}\" opened without mounting")]
fn volume_without_mount(backup_context: &BackupContext, mapper: String) {
    configure_volume(backup_context, &mapper, false);
}

#[given("an encrypted volume \"{mapper}\" mounted at the destination")]
fn volume_with_mount(backup_context: &BackupContext, mapper: String) {
    configure_volume(backup_context, &mapper, true);
}

#[given("the operator interrupts during the first transfer")]
fn interrupt_during_transfer(backup_context: &BackupContext) {
    backup_context
        .host
        .interrupt_during_rsync(backup_context.token.clone());
}

#[given("the operator interrupts when the snapshot is taken")]
fn interrupt_during_snapshot(backup_context: &BackupContext) {
    backup_context
        .host
        .interrupt_on("sudo zfs snapshot", backup_context.token.clone());
}

#[given("the operator interrupt kills the disk usage query after the transfer")]
fn interrupt_kills_usage_query(backup_context: &BackupContext) {
    backup_context
        .host
        .interrupt_and_kill("df -h", backup_context.token.clone());
}

#[given("the operator interrupts while the pool is scrubbing")]
fn interrupt_during_scrub(backup_context: &BackupContext) {
    backup_context.host.queue_scrub_estimates(&[Some(600)]);
    backup_context
        .host
        .interrupt_on("sudo zpool scrub", backup_context.token.clone());
}

#[when("I run the backup")]
fn run_backup(backup_context: &BackupContext) {
    backup_context.run_backup();
}

#[when("I validate the host twice")]
fn validate_twice(backup_context: &BackupContext) -> Result<(), StepError> {
    let first = backup_context.validate()?;
    let second = backup_context.validate()?;
    restore(backup_context, BackupOutcome::Validated(vec![first, second]));
    Ok(())
}

#[then("the backup succeeds")]
fn backup_succeeds(backup_context: &BackupContext) -> Result<(), StepError> {
    let outcome = take_outcome(backup_context)?;
    let result = match &outcome {
        BackupOutcome::Finished(summary) if !summary.interrupted => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a completed backup, got {other:?}"
        ))),
    };
    restore(backup_context, outcome);
    result
}

#[then("the run reports an interrupt")]
fn run_interrupted(backup_context: &BackupContext) -> Result<(), StepError> {
    let outcome = take_outcome(backup_context)?;
    let result = match &outcome {
        BackupOutcome::Finished(summary) if summary.interrupted => {
            if summary.transfers.len() == 1 {
                Ok(())
            } else {
                Err(StepError::Assertion(format!(
                    "expected one transfer before the interrupt, got {}",
                    summary.transfers.len()
                )))
            }
        }
        other => Err(StepError::Assertion(format!(
            "expected an interrupted run, got {other:?}"
        ))),
    };
    restore(backup_context, outcome);
    result
}

#[then("the backup fails with a configuration conflict")]
fn configuration_conflict(backup_context: &BackupContext) -> Result<(), StepError> {
    match take_outcome(backup_context)? {
        BackupOutcome::Failed(BackupError::Preflight(PreflightError::ConfigurationConflict)) => {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected a configuration conflict, got {other:?}"
        ))),
    }
}

#[then("the run is aborted because disk usage was unavailable")]
fn aborted_on_usage(backup_context: &BackupContext) -> Result<(), StepError> {
    match take_outcome(backup_context)? {
        BackupOutcome::Failed(BackupError::Aborted { source })
            if matches!(*source, BackupError::DiskUsageUnavailable { .. }) =>
        {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected an aborted run, got {other:?}"
        ))),
    }
}

#[then("exporting the scrubbing pool is refused")]
fn export_refused(backup_context: &BackupContext) -> Result<(), StepError> {
    match take_outcome(backup_context)? {
        BackupOutcome::Failed(BackupError::Teardown {
            action: TeardownAction::ExportPool,
            source,
        }) if matches!(
            *source,
            BackupError::Pool(PoolError::ScrubInProgress { .. })
        ) =>
        {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected a refused export, got {other:?}"
        ))),
    }
}

#[then("the pool is still imported")]
fn pool_still_imported(backup_context: &BackupContext) -> Result<(), StepError> {
    if backup_context.host.pool_online() {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from("pool was exported")))
    }
}

#[then("no snapshot was destroyed")]
fn nothing_destroyed(backup_context: &BackupContext) -> Result<(), StepError> {
    let events = backup_context.host.events();
    if events.iter().any(|event| event.starts_with("zfs destroy")) {
        return Err(StepError::Assertion(format!(
            "expected no destroy, found {events:?}"
        )));
    }
    Ok(())
}

#[then("the host saw \"{first}\" before \"{second}\"")]
fn event_order(backup_context: &BackupContext, first: String, second: String) -> Result<(), StepError> {
    let events = backup_context.host.events();
    let position = |needle: &str| events.iter().position(|event| event == needle);
    match (position(&first), position(&second)) {
        (Some(earlier), Some(later)) if earlier < later => Ok(()),
        _ => Err(StepError::Assertion(format!(
            "expected {first:?} before {second:?} in {events:?}"
        ))),
    }
}

#[then("the pool is exported")]
fn pool_exported(backup_context: &BackupContext) -> Result<(), StepError> {
    if backup_context.host.pool_online() {
        return Err(StepError::Assertion(String::from("pool is still imported")));
    }
    Ok(())
}

#[then("the pool holds 2 snapshots")]
fn pool_holds_two(backup_context: &BackupContext) -> Result<(), StepError> {
    let snapshots = backup_context.host.snapshots();
    let expected = vec![
        String::from("tank@2024-01-03--00-00-00"),
        String::from("tank@2024-01-04--00-00-00"),
    ];
    if snapshots == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, found {snapshots:?}"
        )))
    }
}

#[then("the oldest snapshot was destroyed")]
fn oldest_destroyed(backup_context: &BackupContext) -> Result<(), StepError> {
    let destroyed = backup_context
        .host
        .events()
        .into_iter()
        .filter(|event| event.starts_with("zfs destroy"))
        .collect::<Vec<_>>();
    let oldest = String::from("zfs destroy tank@2024-01-01--00-00-00");
    if destroyed.first() == Some(&oldest) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {oldest:?} first, destroyed {destroyed:?}"
        )))
    }
}

#[then("teardown follows the grace delay in reverse order")]
fn teardown_order(backup_context: &BackupContext) -> Result<(), StepError> {
    let events = backup_context.host.events();
    let mapper = backup_context.settings.borrow().volume.mapper_name.clone();
    let expected = vec![
        format!("cryptsetup luksOpen --key-file=- {CONTAINER} {mapper}"),
        String::from("zpool import tank"),
        format!("rsync {}", backup_context.source),
        String::from("sleep 10s"),
        String::from("zpool export tank"),
        format!("cryptsetup luksClose {mapper}"),
    ];
    if events == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, found {events:?}"
        )))
    }
}

#[then("the encrypted volume is locked")]
fn volume_locked(backup_context: &BackupContext) -> Result<(), StepError> {
    if backup_context.host.volume_open() {
        return Err(StepError::Assertion(String::from("volume is still open")));
    }
    Ok(())
}

#[then("the host saw no state-changing command")]
fn no_mutation(backup_context: &BackupContext) -> Result<(), StepError> {
    let events = backup_context.host.events();
    if !events.is_empty() {
        return Err(StepError::Assertion(format!(
            "expected no state changes, found {events:?}"
        )));
    }
    if backup_context.credentials.requests() != 0 {
        return Err(StepError::Assertion(String::from(
            "passphrase was requested",
        )));
    }
    Ok(())
}

#[then("both validations agree")]
fn validations_agree(backup_context: &BackupContext) -> Result<(), StepError> {
    match take_outcome(backup_context)? {
        BackupOutcome::Validated(reports) => match reports.as_slice() {
            [first, second] if first == second && first.passed() => Ok(()),
            _ => Err(StepError::Assertion(format!(
                "validations differ or failed: {reports:?}"
            ))),
        },
        other => Err(StepError::Assertion(format!(
            "expected validation reports, got {other:?}"
        ))),
    }
}
