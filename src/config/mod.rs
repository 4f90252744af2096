//! Configuration loading via `ortho-config`.
//!
//! The settings are split across four structs that read the same top-level
//! keys of `offsite.toml` and the same `OFFSITE_` environment prefix, so key
//! names are unique across structs. Each merges defaults, configuration
//! files and environment variables; the result is validated once before the
//! run starts and handed to controllers by reference.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::remote::{RemoteEndpoint, expand_tilde};

/// Remote host, login and destination settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OFFSITE",
    discovery(
        app_name = "offsite",
        env_var = "OFFSITE_CONFIG_PATH",
        config_file_name = "offsite.toml",
        dotfile_name = ".offsite.toml",
        project_file_name = "offsite.toml"
    )
)]
pub struct RemoteConfig {
    /// Hostname or IP address of the backup host.
    #[ortho_config(default = String::new())]
    pub host: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub user: String,
    /// SSH port exposed by the backup host.
    #[ortho_config(default = 22)]
    pub port: u16,
    /// Private key used for authentication. Supports tilde expansion.
    #[ortho_config(default = "~/.ssh/id_ed25519".to_owned())]
    pub identity_file: String,
    /// Absolute remote directory receiving the backup. Must end with `/`.
    #[ortho_config(default = String::new())]
    pub destination: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Whether to force batch mode so ssh never prompts for a password.
    #[ortho_config(default = true)]
    pub batch_mode: bool,
    /// Whether to enforce host key checking.
    #[ortho_config(default = true)]
    pub strict_host_key_checking: bool,
    /// Known hosts file override.
    pub known_hosts_file: Option<String>,
}

impl RemoteConfig {
    /// Builds the endpoint used by every remote command.
    #[must_use]
    pub fn endpoint(&self) -> RemoteEndpoint {
        RemoteEndpoint {
            host: self.host.trim().to_owned(),
            port: self.port,
            user: self.user.trim().to_owned(),
            identity_file: Utf8PathBuf::from(expand_tilde(self.identity_file.trim())),
        }
    }
}

/// rsync settings for the local source directories.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OFFSITE",
    discovery(
        app_name = "offsite",
        env_var = "OFFSITE_CONFIG_PATH",
        config_file_name = "offsite.toml",
        dotfile_name = ".offsite.toml",
        project_file_name = "offsite.toml"
    )
)]
pub struct TransferConfig {
    /// Path to the `rsync` executable.
    #[ortho_config(default = "rsync".to_owned())]
    pub rsync_bin: String,
    /// Absolute local directories to back up, transferred in order.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Extra rsync arguments, split on whitespace.
    #[ortho_config(default = "-a".to_owned())]
    pub rsync_args: String,
    /// Capture rsync stdout into the log instead of streaming it.
    #[ortho_config(default = false)]
    pub log_output: bool,
    /// Directory receiving the generated `rsync-log--*` files.
    #[ortho_config(default = ".".to_owned())]
    pub log_dir: String,
}

/// Storage pool settings on the backup host.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OFFSITE",
    discovery(
        app_name = "offsite",
        env_var = "OFFSITE_CONFIG_PATH",
        config_file_name = "offsite.toml",
        dotfile_name = ".offsite.toml",
        project_file_name = "offsite.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "configuration struct with user-facing toggle settings that are naturally expressed as booleans"
)]
pub struct PoolConfig {
    /// Whether the destination lives on a storage pool.
    #[ortho_config(default = false)]
    pub pool_enabled: bool,
    /// Pool name as known to `zpool`.
    #[ortho_config(default = String::new())]
    pub pool_name: String,
    /// Number of snapshots to keep. Zero disables snapshotting.
    #[ortho_config(default = 0)]
    pub snapshot_limit: u32,
    /// Import the pool before the transfer. The pool must be offline.
    #[ortho_config(default = false)]
    pub import_pool: bool,
    /// Export the pool during teardown.
    #[ortho_config(default = false)]
    pub export_pool: bool,
    /// Scrub the pool after the transfer and wait for completion.
    #[ortho_config(default = false)]
    pub scrub_pool: bool,
}

/// Encrypted container settings on the backup host.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OFFSITE",
    discovery(
        app_name = "offsite",
        env_var = "OFFSITE_CONFIG_PATH",
        config_file_name = "offsite.toml",
        dotfile_name = ".offsite.toml",
        project_file_name = "offsite.toml"
    )
)]
pub struct VolumeConfig {
    /// Whether an encrypted container must be unlocked for the run.
    #[ortho_config(default = false)]
    pub volume_enabled: bool,
    /// Remote path of the encrypted container file.
    #[ortho_config(default = String::new())]
    pub container: String,
    /// Device-mapper name for the unlocked container.
    #[ortho_config(default = String::new())]
    pub mapper_name: String,
    /// Mount the unlocked container onto the remote destination.
    #[ortho_config(default = false)]
    pub mount_to_destination: bool,
    /// Local file holding the passphrase; prompts on the terminal when unset.
    pub passphrase_file: Option<String>,
}

/// The complete, immutable configuration for one backup run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupSettings {
    /// Remote host settings.
    pub remote: RemoteConfig,
    /// Transfer settings.
    pub transfer: TransferConfig,
    /// Storage pool settings.
    pub pool: PoolConfig,
    /// Encrypted volume settings.
    pub volume: VolumeConfig,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Raised when a path that must be absolute is relative.
    #[error("{field} must be an absolute path: {path}")]
    RelativePath {
        /// Configuration key holding the path.
        field: String,
        /// Offending value.
        path: String,
    },
    /// Raised when no source directories are configured.
    #[error("no source directories configured: add sources to offsite.toml or set OFFSITE_SOURCES")]
    NoSources,
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl BackupSettings {
    /// Loads every section from defaults, configuration files and
    /// environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when any section fails to merge.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let args = || [OsString::from("offsite")];
        let parse = |err: &dyn std::fmt::Display| ConfigError::Parse(err.to_string());
        Ok(Self {
            remote: RemoteConfig::load_from_iter(args()).map_err(|err| parse(&err))?,
            transfer: TransferConfig::load_from_iter(args()).map_err(|err| parse(&err))?,
            pool: PoolConfig::load_from_iter(args()).map_err(|err| parse(&err))?,
            volume: VolumeConfig::load_from_iter(args()).map_err(|err| parse(&err))?,
        })
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_remote()?;
        self.validate_transfer()?;
        if self.pool.pool_enabled {
            require_field(
                &self.pool.pool_name,
                &FieldMetadata::new("pool name", "OFFSITE_POOL_NAME", "pool_name"),
            )?;
        }
        if self.volume.volume_enabled {
            require_field(
                &self.volume.container,
                &FieldMetadata::new(
                    "encrypted container path",
                    "OFFSITE_CONTAINER",
                    "container",
                ),
            )?;
            require_field(
                &self.volume.mapper_name,
                &FieldMetadata::new("device-mapper name", "OFFSITE_MAPPER_NAME", "mapper_name"),
            )?;
        }
        Ok(())
    }

    fn validate_remote(&self) -> Result<(), ConfigError> {
        require_field(
            &self.remote.host,
            &FieldMetadata::new("remote host", "OFFSITE_HOST", "host"),
        )?;
        require_field(
            &self.remote.user,
            &FieldMetadata::new("remote user", "OFFSITE_USER", "user"),
        )?;
        require_field(
            &self.remote.identity_file,
            &FieldMetadata::new("private key", "OFFSITE_IDENTITY_FILE", "identity_file"),
        )?;
        require_field(
            &self.remote.ssh_bin,
            &FieldMetadata::new("ssh binary", "OFFSITE_SSH_BIN", "ssh_bin"),
        )?;
        require_field(
            &self.remote.destination,
            &FieldMetadata::new("remote destination", "OFFSITE_DESTINATION", "destination"),
        )?;
        require_absolute("destination", &self.remote.destination)
    }

    fn validate_transfer(&self) -> Result<(), ConfigError> {
        require_field(
            &self.transfer.rsync_bin,
            &FieldMetadata::new("rsync binary", "OFFSITE_RSYNC_BIN", "rsync_bin"),
        )?;
        if self.transfer.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        for source in &self.transfer.sources {
            require_absolute("sources", source)?;
        }
        Ok(())
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to offsite.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

fn require_absolute(field: &str, path: &str) -> Result<(), ConfigError> {
    if Utf8Path::new(path).is_absolute() {
        return Ok(());
    }
    Err(ConfigError::RelativePath {
        field: field.to_owned(),
        path: path.to_owned(),
    })
}
