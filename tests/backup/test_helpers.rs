//! Shared fixtures for backup BDD scenarios.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use offsite::test_support::{SimulatedHost, StaticCredentials, sample_settings};
use offsite::{
    BackupError, BackupOrchestrator, BackupSettings, BackupSummary, CancellationToken, Preflight,
    PreflightError, PreflightReport, RemoteShell,
};
use rstest::fixture;
use tempfile::{NamedTempFile, TempDir};
use thiserror::Error;

pub const CONTAINER: &str = "/srv/secure.img";

#[derive(Debug, Error)]
pub enum BackupTestError {
    #[error("invalid backup fixture: {0}")]
    Fixture(String),
}

/// What the last `When` step produced.
#[derive(Debug)]
pub enum BackupOutcome {
    Finished(BackupSummary),
    Failed(BackupError),
    Validated(Vec<PreflightReport>),
}

#[derive(Clone, Debug)]
pub struct BackupContext {
    pub host: SimulatedHost,
    pub token: CancellationToken,
    pub credentials: StaticCredentials,
    pub settings: Rc<RefCell<BackupSettings>>,
    pub outcome: Rc<RefCell<Option<BackupOutcome>>>,
    pub source: String,
    _source_dir: Rc<TempDir>,
    _key: Rc<NamedTempFile>,
}

impl BackupContext {
    pub fn run_backup(&self) {
        let settings = self.settings.borrow();
        let result = BackupOrchestrator::new(
            &settings,
            self.host.clone(),
            self.token.clone(),
            &self.host,
            &self.credentials,
        )
        .with_clock(fixed_clock)
        .execute();
        let outcome = match result {
            Ok(summary) => BackupOutcome::Finished(summary),
            Err(err) => BackupOutcome::Failed(err),
        };
        self.outcome.replace(Some(outcome));
    }

    pub fn validate(&self) -> Result<PreflightReport, PreflightError> {
        let settings = self.settings.borrow();
        let shell = RemoteShell::new(&settings.remote, self.host.clone());
        Ok(Preflight::new(&settings, &shell).evaluate()?)
    }
}

pub fn fixed_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn utf8(path: &std::path::Path, label: &str) -> Result<String, BackupTestError> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| BackupTestError::Fixture(format!("{label} path is not UTF-8")))
}

pub fn build_backup_context() -> Result<BackupContext, BackupTestError> {
    let key = NamedTempFile::new()
        .map_err(|err| BackupTestError::Fixture(format!("identity file: {err}")))?;
    let source_dir =
        TempDir::new().map_err(|err| BackupTestError::Fixture(format!("source: {err}")))?;
    let source = utf8(source_dir.path(), "source")?;

    let mut settings = sample_settings();
    settings.remote.identity_file = utf8(key.path(), "identity file")?;
    settings.transfer.sources = vec![source.clone()];

    let host = SimulatedHost::new();
    host.add_path(&settings.remote.destination);

    Ok(BackupContext {
        host,
        token: CancellationToken::new(),
        credentials: StaticCredentials::new("correct horse"),
        settings: Rc::new(RefCell::new(settings)),
        outcome: Rc::new(RefCell::new(None)),
        source,
        _source_dir: Rc::new(source_dir),
        _key: Rc::new(key),
    })
}

#[fixture]
pub fn backup_context() -> BackupContext {
    build_backup_context()
        .unwrap_or_else(|err| panic!("backup context fixture should initialise: {err}"))
}
