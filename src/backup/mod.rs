//! Backup orchestrator sequencing validation, setup, transfer and teardown.
//!
//! The forward sequence is: preflight, volume unlock and mount, pool import,
//! disk usage, one rsync per source, snapshot with retention, disk usage
//! again, scrub. Each setup step that changes the
//! remote host registers its undo step on the [`BackupRun`]; teardown pops
//! them in reverse order after normal completion, after an interrupt inside
//! the transfer block, and when a forward step after validation fails.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::cancel::{CancellationToken, Phase};
use crate::config::BackupSettings;
use crate::poller::{AdaptivePoller, Sleeper, WaitOutcome};
use crate::pool::StoragePool;
use crate::preflight::Preflight;
use crate::remote::{CommandRunner, RemoteShell};
use crate::status::{DiskSpaceInfo, Snapshot, query_disk_space};
use crate::timestamp;
use crate::transfer::{Transfer, TransferOutcome};
use crate::volume::{CredentialProvider, EncryptedVolume};

mod error;
mod run;

pub use error::BackupError;
pub use run::{BackupRun, TeardownAction};

/// Pause between an interrupt and the start of teardown.
pub const DEFAULT_GRACE_DELAY: Duration = Duration::from_secs(10);

/// What a completed (or interrupted) run did.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BackupSummary {
    /// Whether an interrupt cut the transfer block short.
    pub interrupted: bool,
    /// Destination usage before the transfers.
    pub usage_before: Option<DiskSpaceInfo>,
    /// Destination usage after the transfers.
    pub usage_after: Option<DiskSpaceInfo>,
    /// One entry per rsync run, in source order.
    pub transfers: Vec<TransferOutcome>,
    /// Snapshot taken after the transfers.
    pub snapshot: Option<Snapshot>,
    /// Snapshots removed by the retention policy.
    pub destroyed: Vec<Snapshot>,
    /// How the scrub wait ended, when a scrub ran.
    pub scrub: Option<WaitOutcome>,
}

/// Runs one backup against the configured host.
pub struct BackupOrchestrator<'a, R: CommandRunner> {
    settings: &'a BackupSettings,
    shell: RemoteShell<R>,
    token: CancellationToken,
    sleeper: &'a dyn Sleeper,
    credentials: &'a dyn CredentialProvider,
    grace: Duration,
    clock: fn() -> DateTime<Utc>,
}

impl<'a, R: CommandRunner> BackupOrchestrator<'a, R> {
    /// Creates an orchestrator issuing commands through `runner`.
    #[must_use]
    pub fn new(
        settings: &'a BackupSettings,
        runner: R,
        token: CancellationToken,
        sleeper: &'a dyn Sleeper,
        credentials: &'a dyn CredentialProvider,
    ) -> Self {
        Self {
            settings,
            shell: RemoteShell::new(&settings.remote, runner),
            token,
            sleeper,
            credentials,
            grace: DEFAULT_GRACE_DELAY,
            clock: timestamp::now,
        }
    }

    /// Overrides the pause taken after an interrupt.
    #[must_use]
    pub const fn with_grace_delay(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Overrides the clock used for snapshot and log file names.
    #[must_use]
    pub const fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the remote shell used for every command.
    #[must_use]
    pub const fn shell(&self) -> &RemoteShell<R> {
        &self.shell
    }

    /// Runs the backup.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Preflight`] when validation fails (nothing has
    /// been changed), the failing step's error when a forward step fails
    /// (after unwinding registered setup steps), [`BackupError::Aborted`]
    /// when a step fails after an interrupt was recorded (after the grace
    /// delay and unwinding), or [`BackupError::Teardown`] when a teardown
    /// step fails.
    pub fn execute(&self) -> Result<BackupSummary, BackupError> {
        let mut run = BackupRun::new(self.token.clone());
        Preflight::new(self.settings, &self.shell).run()?;

        let summary = match self.forward(&mut run) {
            Ok(summary) => summary,
            Err(err) if self.token.is_interrupted() => {
                error!(error = %err, "step failed after interrupt");
                self.pause_after_abort();
                let aborted = BackupError::Aborted {
                    source: Box::new(err),
                };
                return Err(self.unwind(&mut run, aborted));
            }
            Err(err) => return Err(self.unwind(&mut run, err)),
        };

        if summary.interrupted {
            self.pause_after_abort();
        }
        self.teardown(&mut run)?;
        run.enter(Phase::Finished);
        info!("backup finished");
        Ok(summary)
    }

    fn pause_after_abort(&self) {
        warn!("operation aborted by user");
        info!(
            grace_secs = self.grace.as_secs(),
            "waiting before teardown"
        );
        self.sleeper.sleep(self.grace);
    }

    fn forward(&self, run: &mut BackupRun) -> Result<BackupSummary, BackupError> {
        self.prepare_volume(run)?;
        self.prepare_pool(run)?;

        run.enter(Phase::UsageBefore);
        let mut summary = BackupSummary {
            usage_before: Some(self.disk_usage("before")?),
            ..BackupSummary::default()
        };

        run.enter(Phase::Transfer);
        self.transfer_all(&mut summary)?;
        if self.stop_requested(&mut summary) {
            return Ok(summary);
        }

        run.enter(Phase::Snapshot);
        self.snapshot(&mut summary)?;
        if self.stop_requested(&mut summary) {
            return Ok(summary);
        }

        run.enter(Phase::UsageAfter);
        summary.usage_after = Some(self.disk_usage("after")?);
        if self.stop_requested(&mut summary) {
            return Ok(summary);
        }

        run.enter(Phase::Scrub);
        summary.scrub = self.scrub()?;
        summary.interrupted = self.token.is_interrupted();
        Ok(summary)
    }

    fn prepare_volume(&self, run: &mut BackupRun) -> Result<(), BackupError> {
        let config = &self.settings.volume;
        if !config.volume_enabled {
            return Ok(());
        }

        let volume = self.volume();
        volume.open(self.credentials)?;
        run.register(TeardownAction::CloseVolume);

        if config.mount_to_destination {
            volume.mount(&self.settings.remote.destination)?;
            run.register(TeardownAction::UnmountVolume);
        }
        Ok(())
    }

    fn prepare_pool(&self, run: &mut BackupRun) -> Result<(), BackupError> {
        let config = &self.settings.pool;
        if !config.pool_enabled {
            return Ok(());
        }

        run.enter(Phase::Import);
        if config.import_pool {
            self.pool().import()?;
        }
        if config.export_pool {
            run.register(TeardownAction::ExportPool);
        }
        Ok(())
    }

    fn disk_usage(&self, when: &str) -> Result<DiskSpaceInfo, BackupError> {
        let destination = &self.settings.remote.destination;
        let usage = query_disk_space(&self.shell, destination)?.ok_or_else(|| {
            BackupError::DiskUsageUnavailable {
                path: destination.clone(),
            }
        })?;
        info!("disk space {when}: {}/{}", usage.used, usage.total);
        Ok(usage)
    }

    fn transfer_all(&self, summary: &mut BackupSummary) -> Result<(), BackupError> {
        let transfer = Transfer::new(
            &self.shell,
            &self.settings.transfer,
            &self.settings.remote.destination,
        );
        info!("starting rsync");
        for source in &self.settings.transfer.sources {
            summary.transfers.push(transfer.run(source, (self.clock)())?);
            if self.token.is_interrupted() {
                break;
            }
        }
        Ok(())
    }

    fn snapshot(&self, summary: &mut BackupSummary) -> Result<(), BackupError> {
        let config = &self.settings.pool;
        if !config.pool_enabled || config.snapshot_limit == 0 {
            return Ok(());
        }

        let pool = self.pool();
        summary.snapshot = Some(pool.create_snapshot((self.clock)())?);
        if self.token.is_interrupted() {
            return Ok(());
        }
        summary.destroyed =
            pool.apply_retention_until(config.snapshot_limit, || self.token.is_interrupted())?;
        Ok(())
    }

    fn scrub(&self) -> Result<Option<WaitOutcome>, BackupError> {
        let config = &self.settings.pool;
        if !config.pool_enabled || !config.scrub_pool {
            return Ok(None);
        }

        info!(pool = %config.pool_name, "scrubbing pool");
        let poller = AdaptivePoller::new(self.sleeper, &self.token);
        Ok(self.pool().scrub(Some(&poller))?)
    }

    fn stop_requested(&self, summary: &mut BackupSummary) -> bool {
        summary.interrupted = self.token.is_interrupted();
        summary.interrupted
    }

    fn teardown(&self, run: &mut BackupRun) -> Result<(), BackupError> {
        run.enter(Phase::Teardown);
        while let Some(action) = run.next_teardown() {
            self.undo(action)
                .map_err(|source| BackupError::Teardown {
                    action,
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    fn unwind(&self, run: &mut BackupRun, err: BackupError) -> BackupError {
        error!(error = %err, "backup step failed");
        if run.pending().is_empty() {
            return err;
        }
        match self.teardown(run) {
            Ok(()) => err,
            Err(teardown) => BackupError::TeardownAfterFailure {
                source: Box::new(err),
                teardown: Box::new(teardown),
            },
        }
    }

    fn undo(&self, action: TeardownAction) -> Result<(), BackupError> {
        match action {
            TeardownAction::ExportPool => self.pool().export()?,
            TeardownAction::UnmountVolume => {
                self.volume().unmount(&self.settings.remote.destination)?;
            }
            TeardownAction::CloseVolume => self.volume().close()?,
        }
        info!("{action}: done");
        Ok(())
    }

    fn pool(&self) -> StoragePool<'_, R> {
        StoragePool::new(&self.shell, &self.settings.pool.pool_name)
    }

    fn volume(&self) -> EncryptedVolume<'_, R> {
        EncryptedVolume::new(
            &self.shell,
            &self.settings.volume,
            self.settings.pool.pool_enabled,
        )
    }
}
