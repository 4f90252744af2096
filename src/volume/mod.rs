//! Encrypted volume controller.
//!
//! The container moves Closed → Open → Mounted and back. Each transition
//! issues one command and is then confirmed by re-querying the host, since
//! `cryptsetup` and `mount` exit codes are unreliable through `ssh`.

mod credentials;

pub use credentials::{CredentialError, CredentialProvider, PassphraseFile, Secret, TerminalPrompt};

use std::fmt;

use thiserror::Error;
use tracing::info;

use crate::config::VolumeConfig;
use crate::remote::{CommandRunner, RemoteError, RemoteShell, quote};
use crate::status::{directory_is_empty, query_disk_space};

/// Observable state of the encrypted container.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EncryptedVolumeState {
    /// Locked; no decrypted device exists.
    Closed,
    /// Unlocked; the decrypted device exists but is not mounted.
    Open,
    /// Unlocked and mounted.
    Mounted,
}

impl fmt::Display for EncryptedVolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Mounted => "mounted",
        })
    }
}

/// Errors raised by volume transitions.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// The transition is not legal from the observed state.
    #[error("cannot {action} volume {name}: it is {state}")]
    InvalidTransition {
        /// Device-mapper name.
        name: String,
        /// Requested transition.
        action: &'static str,
        /// Observed state.
        state: EncryptedVolumeState,
    },
    /// The state observed after a command is not the expected one.
    #[error("volume {name} is not {expected} after {action}")]
    StateMismatch {
        /// Device-mapper name.
        name: String,
        /// Command that was issued.
        action: &'static str,
        /// State the volume should have reached.
        expected: EncryptedVolumeState,
    },
    /// Mounting onto the destination conflicts with the storage pool.
    #[error(
        "volume mount_to_destination cannot be combined with an enabled pool; the pool mounts the destination itself"
    )]
    ConfigurationConflict,
    /// The mount target already has entries.
    #[error("mount target {path} is not empty")]
    DestinationNotEmpty {
        /// Remote mount target.
        path: String,
    },
    /// No passphrase could be obtained.
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// Running a remote command failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Controller for the encrypted container on the backup host.
pub struct EncryptedVolume<'a, R: CommandRunner> {
    shell: &'a RemoteShell<R>,
    config: &'a VolumeConfig,
    pool_enabled: bool,
}

impl<'a, R: CommandRunner> EncryptedVolume<'a, R> {
    /// Creates a controller. `pool_enabled` forbids mounting, since the pool
    /// mounts the destination itself.
    #[must_use]
    pub const fn new(shell: &'a RemoteShell<R>, config: &'a VolumeConfig, pool_enabled: bool) -> Self {
        Self {
            shell,
            config,
            pool_enabled,
        }
    }

    /// Path of the decrypted block device.
    #[must_use]
    pub fn device_path(&self) -> String {
        format!("/dev/mapper/{}", self.config.mapper_name)
    }

    fn by_id_path(&self) -> String {
        format!("/dev/disk/by-id/dm-name-{}", self.config.mapper_name)
    }

    /// Reports whether the container file exists.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Remote`] when the query cannot run.
    pub fn exists(&self) -> Result<bool, VolumeError> {
        Ok(self.shell.path_exists(&self.config.container)?)
    }

    /// Reports whether the decrypted device is present.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Remote`] when the query cannot run.
    pub fn is_open(&self) -> Result<bool, VolumeError> {
        Ok(self.shell.path_exists(&self.by_id_path())?)
    }

    /// Reports whether the decrypted device backs `target`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Remote`] when the query cannot run.
    pub fn is_mounted_at(&self, target: &str) -> Result<bool, VolumeError> {
        let device = self.device_path();
        Ok(query_disk_space(self.shell, target)?.is_some_and(|info| info.filesystem == device))
    }

    /// Derives the current state with respect to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Remote`] when a query cannot run.
    pub fn state(&self, target: &str) -> Result<EncryptedVolumeState, VolumeError> {
        if !self.is_open()? {
            return Ok(EncryptedVolumeState::Closed);
        }
        if self.is_mounted_at(target)? {
            return Ok(EncryptedVolumeState::Mounted);
        }
        Ok(EncryptedVolumeState::Open)
    }

    /// Unlocks the container with a passphrase from `credentials`.
    ///
    /// The passphrase is piped to `cryptsetup` on stdin and never logged.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidTransition`] when already open,
    /// [`VolumeError::Credential`] when no passphrase is available and
    /// [`VolumeError::StateMismatch`] when the device does not appear.
    pub fn open(&self, credentials: &dyn CredentialProvider) -> Result<(), VolumeError> {
        if self.is_open()? {
            return Err(self.invalid("open", EncryptedVolumeState::Open));
        }

        let secret = credentials.passphrase(&self.config.container)?;
        let command = format!(
            "sudo cryptsetup luksOpen --key-file=- {} {}",
            quote(&self.config.container),
            quote(&self.config.mapper_name)
        );
        self.shell.run_with_input(&command, secret.expose())?;
        drop(secret);

        if !self.is_open()? {
            return Err(self.mismatch("open", EncryptedVolumeState::Open));
        }
        info!(volume = %self.config.mapper_name, "volume opened");
        Ok(())
    }

    /// Mounts the decrypted device onto `target`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::ConfigurationConflict`] when the pool is
    /// enabled, [`VolumeError::InvalidTransition`] when the volume is not
    /// open, [`VolumeError::DestinationNotEmpty`] when `target` has entries
    /// and [`VolumeError::StateMismatch`] when no mount is observed.
    pub fn mount(&self, target: &str) -> Result<(), VolumeError> {
        if self.pool_enabled {
            return Err(VolumeError::ConfigurationConflict);
        }
        if !self.is_open()? {
            return Err(self.invalid("mount", EncryptedVolumeState::Closed));
        }
        if !directory_is_empty(self.shell, target)? {
            return Err(VolumeError::DestinationNotEmpty {
                path: target.to_owned(),
            });
        }

        self.shell.run(&format!(
            "sudo mount {} {}",
            quote(&self.device_path()),
            quote(target)
        ))?;
        if !self.is_mounted_at(target)? {
            return Err(self.mismatch("mount", EncryptedVolumeState::Mounted));
        }
        info!(volume = %self.config.mapper_name, target, "volume mounted");
        Ok(())
    }

    /// Unmounts the decrypted device from `target`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::StateMismatch`] when the mount persists.
    pub fn unmount(&self, target: &str) -> Result<(), VolumeError> {
        self.shell
            .run(&format!("sudo umount {}", quote(&self.device_path())))?;
        if self.is_mounted_at(target)? {
            return Err(self.mismatch("unmount", EncryptedVolumeState::Open));
        }
        info!(volume = %self.config.mapper_name, target, "volume unmounted");
        Ok(())
    }

    /// Locks the container.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::StateMismatch`] when the device persists.
    pub fn close(&self) -> Result<(), VolumeError> {
        self.shell.run(&format!(
            "sudo cryptsetup luksClose {}",
            quote(&self.config.mapper_name)
        ))?;
        if self.is_open()? {
            return Err(self.mismatch("close", EncryptedVolumeState::Closed));
        }
        info!(volume = %self.config.mapper_name, "volume closed");
        Ok(())
    }

    fn invalid(&self, action: &'static str, state: EncryptedVolumeState) -> VolumeError {
        VolumeError::InvalidTransition {
            name: self.config.mapper_name.clone(),
            action,
            state,
        }
    }

    fn mismatch(&self, action: &'static str, expected: EncryptedVolumeState) -> VolumeError {
        VolumeError::StateMismatch {
            name: self.config.mapper_name.clone(),
            action,
            expected,
        }
    }
}
