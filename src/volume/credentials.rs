//! Passphrase sources for unlocking the encrypted container.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use zeroize::ZeroizeOnDrop;

use crate::remote::expand_tilde;

/// A passphrase that is wiped from memory on drop and never printed.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Secret {
    inner: String,
}

impl Secret {
    /// Wraps a passphrase.
    #[must_use]
    pub const fn new(inner: String) -> Self {
        Self { inner }
    }

    /// Exposes the passphrase bytes. Do not store or log them.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Returns `true` when the passphrase is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED {} bytes])", self.inner.len())
    }
}

/// Errors raised while obtaining a passphrase.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The terminal prompt failed.
    #[error("passphrase prompt failed: {0}")]
    Prompt(String),
    /// The passphrase file could not be read.
    #[error("failed to read passphrase file {path}: {message}")]
    Read {
        /// File that was read.
        path: String,
        /// Operating system error string.
        message: String,
    },
    /// An empty passphrase was supplied.
    #[error("empty passphrase for {target}")]
    Empty {
        /// Container the passphrase was requested for.
        target: String,
    },
}

/// Supplies the secret needed to unlock a container.
pub trait CredentialProvider {
    /// Returns the passphrase for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when no passphrase can be obtained.
    fn passphrase(&self, target: &str) -> Result<Secret, CredentialError>;
}

/// Prompts on the controlling terminal without echo.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompt;

impl CredentialProvider for TerminalPrompt {
    fn passphrase(&self, target: &str) -> Result<Secret, CredentialError> {
        let entered = dialoguer::Password::new()
            .with_prompt(format!("Passphrase for {target}"))
            .interact()
            .map_err(|err| CredentialError::Prompt(err.to_string()))?;
        non_empty(Secret::new(entered), target)
    }
}

/// Reads the passphrase from a local file, dropping one trailing newline.
#[derive(Clone, Debug)]
pub struct PassphraseFile {
    path: Utf8PathBuf,
}

impl PassphraseFile {
    /// Creates a provider reading `path`, with `~` expanded.
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            path: Utf8PathBuf::from(expand_tilde(path)),
        }
    }
}

impl CredentialProvider for PassphraseFile {
    fn passphrase(&self, target: &str) -> Result<Secret, CredentialError> {
        let mut contents = self.read().map_err(|message| CredentialError::Read {
            path: self.path.to_string(),
            message,
        })?;
        if contents.ends_with('\n') {
            contents.pop();
            if contents.ends_with('\r') {
                contents.pop();
            }
        }
        non_empty(Secret::new(contents), target)
    }
}

impl PassphraseFile {
    fn read(&self) -> Result<String, String> {
        let (dir_path, file_name) = match (self.path.parent(), self.path.file_name()) {
            (Some(parent), Some(name)) if self.path.is_absolute() => (parent, Utf8Path::new(name)),
            (_, Some(_)) => (Utf8Path::new("."), self.path.as_path()),
            (_, None) => return Err(String::from("path has no file name")),
        };
        let dir =
            Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
        dir.read_to_string(file_name).map_err(|err| err.to_string())
    }
}

fn non_empty(secret: Secret, target: &str) -> Result<Secret, CredentialError> {
    if secret.is_empty() {
        return Err(CredentialError::Empty {
            target: target.to_owned(),
        });
    }
    Ok(secret)
}
