//! Binary entry point for the `offsite` backup tool.

use std::env;
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use offsite::{
    BackupError, BackupOrchestrator, BackupSettings, CancellationToken, ConfigError,
    CredentialProvider, PassphraseFile, ProcessCommandRunner, SignalDisposition, TerminalPrompt,
    ThreadSleeper,
};

mod cli;

use cli::{BackupCommand, Cli};

const CONFIG_PATH_ENV: &str = "OFFSITE_CONFIG_PATH";
const LOG_ENV: &str = "OFFSITE_LOG";
const INTERRUPT_EXIT_CODE: i32 = 130;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to install interrupt handler: {0}")]
    Signal(String),
    #[error("backup failed: {0}")]
    Backup(#[from] BackupError),
    #[error("backup interrupted; teardown completed")]
    Interrupted,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            error!("{err}");
            1
        }
    };

    process::exit(exit_code);
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Backup(command) => run_backup(command),
    }
}

fn run_backup(command: BackupCommand) -> Result<(), CliError> {
    init_logging(command.verbose);
    if let Some(path) = command.config {
        // SAFETY: No other threads exist yet; the interrupt handler thread is
        // installed below.
        unsafe { env::set_var(CONFIG_PATH_ENV, path) };
    }

    let settings = BackupSettings::load_without_cli_args()?;
    settings.validate()?;

    let token = CancellationToken::new();
    install_interrupt_handler(token.clone())?;

    let credentials = credential_provider(&settings);
    let orchestrator = BackupOrchestrator::new(
        &settings,
        ProcessCommandRunner,
        token,
        &ThreadSleeper,
        credentials.as_ref(),
    );
    let summary = match orchestrator.execute() {
        Ok(summary) => summary,
        Err(BackupError::Aborted { source }) => {
            warn!(error = %source, "interrupted step failed");
            return Err(CliError::Interrupted);
        }
        Err(err) => return Err(err.into()),
    };

    info!(
        transfers = summary.transfers.len(),
        destroyed = summary.destroyed.len(),
        "backup summary"
    );
    if summary.interrupted {
        return Err(CliError::Interrupted);
    }
    Ok(())
}

fn credential_provider(settings: &BackupSettings) -> Box<dyn CredentialProvider> {
    match settings.volume.passphrase_file.as_deref() {
        Some(path) if !path.trim().is_empty() => Box::new(PassphraseFile::new(path)),
        _ => Box::new(TerminalPrompt),
    }
}

fn install_interrupt_handler(token: CancellationToken) -> Result<(), CliError> {
    ctrlc::set_handler(move || match token.signal() {
        SignalDisposition::Deferred => {
            warn!("interrupt received; stopping after the current step and tearing down");
        }
        SignalDisposition::Terminate => {
            error!("interrupt received; exiting without teardown");
            process::exit(INTERRUPT_EXIT_CODE);
        }
    })
    .map_err(|err| CliError::Signal(err.to_string()))
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("offsite=debug,warn")
        } else {
            EnvFilter::new("offsite=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    use camino::Utf8Path;
    use cap_std::{ambient_authority, fs_utf8::Dir};
    use offsite::test_support::sample_settings;
    use rstest::rstest;

    #[rstest]
    fn parses_backup_with_config_path() {
        let cli = Cli::try_parse_from(["offsite", "backup", "--config", "/etc/offsite.toml", "-v"])
            .expect("arguments should parse");

        let Cli::Backup(command) = cli;
        assert_eq!(command.config.as_deref(), Some("/etc/offsite.toml"));
        assert!(command.verbose);
    }

    #[rstest]
    fn backup_is_the_only_operation() {
        assert!(Cli::try_parse_from(["offsite", "restore"]).is_err());
    }

    #[rstest]
    fn credential_provider_reads_passphrase_file() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let root = Utf8Path::from_path(temp.path()).expect("utf8 temp path");
        let dir = Dir::open_ambient_dir(root, ambient_authority()).expect("open temp dir");
        dir.write("passphrase", "s3cret\n").expect("write passphrase");
        let mut settings = sample_settings();
        settings.volume.passphrase_file = Some(root.join("passphrase").into_string());

        let secret = credential_provider(&settings)
            .passphrase("/srv/secure.img")
            .expect("passphrase from file");

        assert_eq!(secret.expose(), b"s3cret");
    }

    #[rstest]
    fn interrupted_run_maps_to_failure_message() {
        assert_eq!(
            CliError::Interrupted.to_string(),
            "backup interrupted; teardown completed"
        );
    }
}
