//! Command-line interface definitions for the `offsite` binary.
//!
//! The binary and the build script both include this module; the build
//! script renders the manual page from it.

use clap::{Args, Parser};

/// Top-level CLI for the `offsite` binary.
#[derive(Debug, Parser)]
#[command(
    name = "offsite",
    version,
    about = "Back up local directories to a remote host over rsync and SSH",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Validate the remote host, transfer every source, then tear down.
    #[command(
        name = "backup",
        about = "Validate the remote host, transfer every source, then tear down"
    )]
    Backup(BackupCommand),
}

/// Arguments for the `offsite backup` subcommand.
#[derive(Debug, Args)]
pub(crate) struct BackupCommand {
    /// Read configuration from PATH instead of the discovered offsite.toml.
    ///
    /// Equivalent to setting OFFSITE_CONFIG_PATH. Environment variables
    /// prefixed with OFFSITE_ still override values from the file.
    #[arg(long, value_name = "PATH")]
    pub(crate) config: Option<String>,
    /// Log at debug level, including every remote command issued.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}
