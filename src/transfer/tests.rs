//! Tests for rsync argument construction and transfer outcomes.

use chrono::TimeZone;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::config::BackupSettings;
use crate::test_support::{ScriptedRunner, sample_settings};

struct Harness {
    settings: BackupSettings,
    runner: ScriptedRunner,
    source_dir: TempDir,
}

impl Harness {
    fn source(&self) -> String {
        self.source_dir
            .path()
            .to_str()
            .expect("utf8 temp path")
            .to_owned()
    }

    fn shell(&self) -> RemoteShell<ScriptedRunner> {
        RemoteShell::new(&self.settings.remote, self.runner.clone())
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        settings: sample_settings(),
        runner: ScriptedRunner::new(),
        source_dir: TempDir::new().expect("temp dir"),
    }
}

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn strings(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[rstest]
fn arguments_follow_rsync_layout(harness: Harness) {
    let shell = harness.shell();
    let transfer = Transfer::new(&shell, &harness.settings.transfer, "/mnt/tank/backup/");
    let source = harness.source();

    let (args, log_file) = transfer.build_args(&source, at()).expect("args");

    let expected_log = format!("/var/log/offsite/{}", log_file_name(&source, at()));
    assert_eq!(
        log_file.as_deref().map(Utf8Path::as_str),
        Some(expected_log.as_str())
    );
    assert_eq!(
        strings(&args),
        vec![
            String::from("-a"),
            String::from("--delete"),
            format!("--log-file={expected_log}"),
            String::from("--rsh"),
            String::from("ssh -p 2222 -i /home/operator/.ssh/id_ed25519 -o BatchMode=yes"),
            source,
            String::from("backup@backup.example.net:/mnt/tank/backup/"),
        ]
    );
}

#[rstest]
fn configured_log_file_suppresses_generated_one(mut harness: Harness) {
    harness.settings.transfer.rsync_args = String::from("-a --log-file=/tmp/rsync.log");
    let shell = harness.shell();
    let transfer = Transfer::new(&shell, &harness.settings.transfer, "/mnt/tank/backup/");

    let (args, log_file) = transfer
        .build_args(&harness.source(), at())
        .expect("args");

    assert_eq!(log_file, None);
    let rendered = strings(&args);
    assert_eq!(
        rendered
            .iter()
            .filter(|arg| arg.starts_with("--log-file="))
            .count(),
        1
    );
    assert!(rendered.contains(&String::from("--log-file=/tmp/rsync.log")));
}

#[rstest]
fn missing_source_is_rejected_before_spawning(harness: Harness) {
    let shell = harness.shell();
    let transfer = Transfer::new(&shell, &harness.settings.transfer, "/mnt/tank/backup/");

    let err = transfer
        .run("/nonexistent/source", at())
        .expect_err("missing source");

    assert!(matches!(err, TransferError::MissingSource { .. }));
    assert!(harness.runner.invocations().is_empty());
}

#[rstest]
fn rsync_runs_locally_with_configured_binary(harness: Harness) {
    harness.runner.push_success();
    let shell = harness.shell();
    let transfer = Transfer::new(&shell, &harness.settings.transfer, "/mnt/tank/backup/");

    let outcome = transfer.run(&harness.source(), at()).expect("transfer");

    assert!(outcome.is_success());
    let invocations = harness.runner.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(
        invocations.first().map(|call| call.program.as_str()),
        Some("rsync")
    );
}

#[rstest]
#[case::captured(true)]
#[case::streamed(false)]
fn non_zero_exit_is_reported_not_raised(mut harness: Harness, #[case] log_output: bool) {
    harness.settings.transfer.log_output = log_output;
    harness
        .runner
        .push_output(Some(23), "", "rsync error: some files could not be transferred");
    let shell = harness.shell();
    let transfer = Transfer::new(&shell, &harness.settings.transfer, "/mnt/tank/backup/");

    let outcome = transfer.run(&harness.source(), at()).expect("outcome");

    assert_eq!(outcome.code, Some(23));
    assert!(!outcome.is_success());
}

#[rstest]
fn spawn_failure_surfaces(harness: Harness) {
    let shell = harness.shell();
    let transfer = Transfer::new(&shell, &harness.settings.transfer, "/mnt/tank/backup/");

    let err = transfer.run(&harness.source(), at()).expect_err("no response");

    assert!(matches!(err, TransferError::Remote(RemoteError::Spawn { .. })));
}

#[rstest]
#[case::nested("/srv/data/photos", "rsync-log--2024-01-04--00-00-00--.srv.data.photos")]
#[case::root("/", "rsync-log--2024-01-04--00-00-00--.")]
fn log_file_name_flattens_source_path(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(log_file_name(source, at()), expected);
}
