//! Core library for the `offsite` backup tool.
//!
//! A run validates the remote host read-only, optionally unlocks and mounts
//! an encrypted volume and imports a storage pool, copies each local source
//! directory with rsync over SSH, snapshots the pool and applies the
//! retention limit, scrubs, then exports and locks everything again in
//! reverse order. All remote state is inspected through text parsers in
//! [`status`]; all commands go through the [`remote::CommandRunner`] seam so
//! the sequence can run against [`test_support::SimulatedHost`].

pub mod backup;
pub mod cancel;
pub mod config;
pub mod poller;
pub mod pool;
pub mod preflight;
pub mod remote;
pub mod report;
pub mod status;
pub mod test_support;
pub mod timestamp;
pub mod transfer;
pub mod volume;

pub use backup::{BackupError, BackupOrchestrator, BackupRun, BackupSummary, TeardownAction};
pub use cancel::{CancellationToken, InterruptPolicy, Phase, SignalDisposition};
pub use config::{
    BackupSettings, ConfigError, PoolConfig, RemoteConfig, TransferConfig, VolumeConfig,
};
pub use poller::{AdaptivePoller, Sleeper, ThreadSleeper, WaitOutcome, next_sleep};
pub use pool::{PoolError, StoragePool};
pub use preflight::{Check, Preflight, PreflightError, PreflightReport};
pub use remote::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteEndpoint, RemoteError, RemoteShell,
};
pub use transfer::{Transfer, TransferError, TransferOutcome};
pub use volume::{
    CredentialError, CredentialProvider, EncryptedVolume, EncryptedVolumeState, PassphraseFile,
    Secret, TerminalPrompt, VolumeError,
};
