//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedRunner`] replays pre-seeded outputs in FIFO order.
//! [`SimulatedHost`] is a stateful stand-in for the backup host that
//! understands the remote commands the controllers issue and keeps an
//! ordered log of every state-changing command, rsync run and sleep.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cancel::{CancellationToken, SignalDisposition};
use crate::config::{BackupSettings, PoolConfig, RemoteConfig, TransferConfig, VolumeConfig};
use crate::poller::Sleeper;
use crate::remote::{CommandOutput, CommandRunner, RemoteError};
use crate::volume::{CredentialError, CredentialProvider, Secret};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through a test runner.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Bytes written to stdin, if any.
    pub input: Option<Vec<u8>>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().map(|arg| arg.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    /// Returns the final argument, which is the remote command for `ssh`.
    #[must_use]
    pub fn remote_command(&self) -> String {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    fn next(
        &self,
        program: &str,
        args: &[OsString],
        input: Option<&[u8]>,
    ) -> Result<CommandOutput, RemoteError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            input: input.map(<[u8]>::to_vec),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| RemoteError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        self.next(program, args, None)
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
    ) -> Result<CommandOutput, RemoteError> {
        self.next(program, args, Some(input))
    }

    fn run_inherited(
        &self,
        program: &str,
        args: &[OsString],
    ) -> Result<CommandOutput, RemoteError> {
        self.next(program, args, None)
    }
}

/// Stateful fake of the backup host.
///
/// Clones share state, so a test keeps one handle for assertions while the
/// controllers own another.
#[derive(Clone, Debug, Default)]
pub struct SimulatedHost {
    state: Rc<RefCell<HostState>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

#[derive(Debug)]
struct HostState {
    reachable: bool,
    rsync_installed: bool,
    paths: BTreeSet<String>,
    non_empty_dirs: BTreeSet<String>,
    pool: Option<SimulatedPool>,
    volume: Option<SimulatedVolume>,
    rsync_exit_code: i32,
    transfers: u32,
    interrupt_on_rsync: Option<CancellationToken>,
    interrupt_hooks: Vec<InterruptHook>,
    ignored: Vec<String>,
    events: Vec<String>,
}

/// Signal delivered when a remote command with `prefix` runs.
#[derive(Debug)]
struct InterruptHook {
    prefix: String,
    token: CancellationToken,
    kills_command: bool,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            reachable: true,
            rsync_installed: true,
            paths: BTreeSet::new(),
            non_empty_dirs: BTreeSet::new(),
            pool: None,
            volume: None,
            rsync_exit_code: 0,
            transfers: 0,
            interrupt_on_rsync: None,
            interrupt_hooks: Vec::new(),
            ignored: Vec::new(),
            events: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct SimulatedPool {
    name: String,
    online: bool,
    scrubbing: bool,
    estimates: VecDeque<Option<u64>>,
    snapshots: BTreeSet<String>,
}

#[derive(Debug)]
struct SimulatedVolume {
    container: String,
    mapper_name: String,
    passphrase: String,
    open: bool,
    mounted_at: Option<String>,
}

fn reply(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: stdout.into(),
        stderr: stderr.into(),
    }
}

fn clock(secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        secs.div_euclid(3_600),
        secs.div_euclid(60).rem_euclid(60),
        secs.rem_euclid(60)
    )
}

impl SimulatedHost {
    /// Creates a reachable host with rsync installed and nothing else.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `ls /` fail with a permission error.
    pub fn deny_access(&self) {
        self.state.borrow_mut().reachable = false;
    }

    /// Makes `whereis rsync` report nothing.
    pub fn remove_rsync(&self) {
        self.state.borrow_mut().rsync_installed = false;
    }

    /// Creates a remote file or directory.
    pub fn add_path(&self, path: &str) {
        self.state.borrow_mut().paths.insert(path.to_owned());
    }

    /// Creates a remote directory with entries.
    pub fn add_non_empty_dir(&self, path: &str) {
        let mut state = self.state.borrow_mut();
        state.paths.insert(path.to_owned());
        state.non_empty_dirs.insert(path.to_owned());
    }

    /// Adds a storage pool.
    pub fn add_pool(&self, name: &str, online: bool) {
        self.state.borrow_mut().pool = Some(SimulatedPool {
            name: name.to_owned(),
            online,
            scrubbing: false,
            estimates: VecDeque::new(),
            snapshots: BTreeSet::new(),
        });
    }

    /// Adds existing snapshots to the pool.
    pub fn add_snapshots(&self, names: &[&str]) {
        if let Some(pool) = self.state.borrow_mut().pool.as_mut() {
            pool.snapshots.extend(names.iter().map(|name| (*name).to_owned()));
        }
    }

    /// Queues remaining-time estimates (seconds, `None` for no estimate)
    /// reported by successive status queries while scrubbing. The scrub
    /// finishes once the queue is empty.
    pub fn queue_scrub_estimates(&self, estimates: &[Option<u64>]) {
        if let Some(pool) = self.state.borrow_mut().pool.as_mut() {
            pool.estimates.extend(estimates.iter().copied());
        }
    }

    /// Marks a scrub as already running.
    pub fn start_scrub(&self) {
        if let Some(pool) = self.state.borrow_mut().pool.as_mut() {
            pool.scrubbing = true;
        }
    }

    /// Adds an encrypted container unlocked by `passphrase`.
    pub fn add_volume(&self, container: &str, mapper_name: &str, passphrase: &str) {
        let mut state = self.state.borrow_mut();
        state.paths.insert(container.to_owned());
        state.volume = Some(SimulatedVolume {
            container: container.to_owned(),
            mapper_name: mapper_name.to_owned(),
            passphrase: passphrase.to_owned(),
            open: false,
            mounted_at: None,
        });
    }

    /// Marks the container as already unlocked.
    pub fn unlock_volume(&self) {
        if let Some(volume) = self.state.borrow_mut().volume.as_mut() {
            volume.open = true;
        }
    }

    /// Sets the exit code rsync reports.
    pub fn set_rsync_exit_code(&self, code: i32) {
        self.state.borrow_mut().rsync_exit_code = code;
    }

    /// Delivers a cancellation signal to `token` whenever rsync runs.
    pub fn interrupt_during_rsync(&self, token: CancellationToken) {
        self.state.borrow_mut().interrupt_on_rsync = Some(token);
    }

    /// Delivers a cancellation signal to `token` after a remote command
    /// starting with `prefix` runs. The hook fires once the signal is
    /// deferred; signals the token refuses leave it armed.
    pub fn interrupt_on(&self, prefix: &str, token: CancellationToken) {
        self.arm(prefix, token, false);
    }

    /// Like [`Self::interrupt_on`], but the interrupted command returns no
    /// output, as an `ssh` child killed by the same signal would.
    pub fn interrupt_and_kill(&self, prefix: &str, token: CancellationToken) {
        self.arm(prefix, token, true);
    }

    fn arm(&self, prefix: &str, token: CancellationToken, kills_command: bool) {
        self.state.borrow_mut().interrupt_hooks.push(InterruptHook {
            prefix: prefix.to_owned(),
            token,
            kills_command,
        });
    }

    /// Records but otherwise ignores remote commands starting with `prefix`.
    pub fn ignore_command(&self, prefix: &str) {
        self.state.borrow_mut().ignored.push(prefix.to_owned());
    }

    /// Returns the ordered log of state-changing commands, transfers and
    /// sleeps.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.state.borrow().events.clone()
    }

    /// Returns every invocation, queries included.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Reports whether the pool is online.
    #[must_use]
    pub fn pool_online(&self) -> bool {
        self.state
            .borrow()
            .pool
            .as_ref()
            .is_some_and(|pool| pool.online)
    }

    /// Returns the pool's snapshots in name order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<String> {
        self.state
            .borrow()
            .pool
            .as_ref()
            .map(|pool| pool.snapshots.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Reports whether the container is unlocked.
    #[must_use]
    pub fn volume_open(&self) -> bool {
        self.state
            .borrow()
            .volume
            .as_ref()
            .is_some_and(|volume| volume.open)
    }

    /// Returns the mount target of the container, if mounted.
    #[must_use]
    pub fn volume_mount(&self) -> Option<String> {
        self.state
            .borrow()
            .volume
            .as_ref()
            .and_then(|volume| volume.mounted_at.clone())
    }

    fn respond(&self, program: &str, args: &[OsString], input: Option<&[u8]>) -> CommandOutput {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            input: input.map(<[u8]>::to_vec),
        });

        if program.ends_with("rsync") {
            return self.state.borrow_mut().rsync(args);
        }

        let command = args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tokens: Vec<String> = command
            .split_whitespace()
            .map(|token| token.trim_matches('\'').to_owned())
            .collect();
        let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let mut state = self.state.borrow_mut();
        let output = state.execute(&command, &words, input);
        state.deliver_interrupt(&tokens.join(" ")).unwrap_or(output)
    }
}

impl HostState {
    /// Fires the first armed hook matching `command`; returns the killed
    /// command's output when the hook kills it.
    fn deliver_interrupt(&mut self, command: &str) -> Option<CommandOutput> {
        let index = self
            .interrupt_hooks
            .iter()
            .position(|hook| command.starts_with(&hook.prefix))?;
        let hook = self.interrupt_hooks.get(index)?;
        if hook.token.signal() != SignalDisposition::Deferred {
            return None;
        }
        let hook = self.interrupt_hooks.remove(index);
        hook.kills_command.then(|| reply(255, "", ""))
    }

    fn execute(&mut self, command: &str, words: &[&str], input: Option<&[u8]>) -> CommandOutput {
        if let Some(("sudo", rest)) = words.split_first().map(|(head, tail)| (*head, tail)) {
            self.events.push(rest.join(" "));
            if self.ignored.iter().any(|prefix| command.starts_with(prefix)) {
                return reply(0, "", "");
            }
            return self.mutate(rest, input);
        }

        match words {
            ["ls", "/"] => self.root_listing(),
            ["ls", "-lah", path] => self.long_listing(path),
            ["ls", dir] => reply(
                0,
                if self.non_empty_dirs.contains(*dir) { "data\n" } else { "" },
                "",
            ),
            ["whereis", "rsync"] => reply(
                0,
                if self.rsync_installed {
                    "rsync: /usr/bin/rsync /usr/share/man/man1/rsync.1.gz\n"
                } else {
                    "rsync:\n"
                },
                "",
            ),
            ["df", "-h", dir] => self.disk_usage(dir),
            ["zpool", "status", name] => self.pool_status(name),
            ["zfs", "list", "-t", "snapshot"] => self.snapshot_listing(),
            _ => reply(127, "", format!("bash: {command}: command not found\n")),
        }
    }

    fn mutate(&mut self, words: &[&str], input: Option<&[u8]>) -> CommandOutput {
        match words {
            ["zpool", "import", name] => self.with_pool(name, |pool| pool.online = true),
            ["zpool", "export", name] => self.with_pool(name, |pool| {
                pool.online = false;
                pool.scrubbing = false;
            }),
            ["zpool", "scrub", name] => self.with_pool(name, |pool| pool.scrubbing = pool.online),
            ["zfs", "snapshot", snapshot] => self.with_snapshot_pool(snapshot, |pool| {
                pool.snapshots.insert((*snapshot).to_owned());
            }),
            ["zfs", "destroy", snapshot] => self.with_snapshot_pool(snapshot, |pool| {
                pool.snapshots.remove(*snapshot);
            }),
            ["cryptsetup", "luksOpen", "--key-file=-", container, mapper] => {
                self.unlock(container, mapper, input.unwrap_or_default())
            }
            ["cryptsetup", "luksClose", mapper] => self.lock(mapper),
            ["mount", device, dir] => self.mount(device, dir),
            ["umount", device] => {
                if let Some(volume) = self.volume.as_mut()
                    && *device == format!("/dev/mapper/{}", volume.mapper_name)
                {
                    volume.mounted_at = None;
                }
                reply(0, "", "")
            }
            _ => reply(1, "", "sudo: unsupported command\n"),
        }
    }

    fn with_pool(&mut self, name: &str, change: impl FnOnce(&mut SimulatedPool)) -> CommandOutput {
        match self.pool.as_mut() {
            Some(pool) if pool.name == name => {
                change(pool);
                reply(0, "", "")
            }
            _ => reply(1, "", format!("cannot open '{name}': no such pool\n")),
        }
    }

    fn with_snapshot_pool(
        &mut self,
        snapshot: &str,
        change: impl FnOnce(&mut SimulatedPool),
    ) -> CommandOutput {
        let pool_name = snapshot.split_once('@').map_or(snapshot, |(pool, _)| pool);
        match self.pool.as_mut() {
            Some(pool) if pool.name == pool_name && pool.online => {
                change(pool);
                reply(0, "", "")
            }
            _ => reply(1, "", format!("cannot open '{snapshot}': dataset does not exist\n")),
        }
    }

    fn unlock(&mut self, container: &str, mapper: &str, input: &[u8]) -> CommandOutput {
        match self.volume.as_mut() {
            Some(volume)
                if volume.container == container
                    && volume.mapper_name == mapper
                    && volume.passphrase.as_bytes() == input =>
            {
                volume.open = true;
                reply(0, "", "")
            }
            _ => reply(2, "", "No key available with this passphrase.\n"),
        }
    }

    fn lock(&mut self, mapper: &str) -> CommandOutput {
        match self.volume.as_mut() {
            Some(volume) if volume.mapper_name == mapper && volume.mounted_at.is_none() => {
                volume.open = false;
                reply(0, "", "")
            }
            Some(_) => reply(5, "", format!("Device {mapper} is still in use.\n")),
            None => reply(4, "", format!("Device {mapper} is not active.\n")),
        }
    }

    fn mount(&mut self, device: &str, dir: &str) -> CommandOutput {
        let dir_exists = self.paths.contains(dir);
        match self.volume.as_mut() {
            Some(volume)
                if volume.open
                    && dir_exists
                    && device == format!("/dev/mapper/{}", volume.mapper_name) =>
            {
                volume.mounted_at = Some(dir.to_owned());
                reply(0, "", "")
            }
            _ => reply(32, "", format!("mount: {dir}: special device {device} does not exist.\n")),
        }
    }

    fn rsync(&mut self, args: &[OsString]) -> CommandOutput {
        let source = args
            .len()
            .checked_sub(2)
            .and_then(|index| args.get(index))
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.events.push(format!("rsync {source}"));
        self.transfers = self.transfers.saturating_add(1);
        if let Some(token) = self.interrupt_on_rsync.as_ref() {
            token.signal();
        }
        if self.rsync_exit_code == 0 {
            reply(0, "", "")
        } else {
            reply(
                self.rsync_exit_code,
                "",
                "rsync error: some files/attrs were not transferred\n",
            )
        }
    }

    fn root_listing(&self) -> CommandOutput {
        if self.reachable {
            reply(0, "bin\nboot\ndev\netc\nhome\nmnt\nusr\nvar\n", "")
        } else {
            reply(2, "", "ls: cannot open directory '/': Permission denied\n")
        }
    }

    fn long_listing(&self, path: &str) -> CommandOutput {
        let device_present = self.volume.as_ref().is_some_and(|volume| {
            volume.open && path == format!("/dev/disk/by-id/dm-name-{}", volume.mapper_name)
        });
        if device_present || self.paths.contains(path) {
            reply(0, format!("total 0\n{path}\n"), "")
        } else {
            reply(
                2,
                "",
                format!("ls: cannot access '{path}': No such file or directory\n"),
            )
        }
    }

    fn disk_usage(&self, dir: &str) -> CommandOutput {
        if !self.paths.contains(dir) {
            return reply(1, "", format!("df: {dir}: No such file or directory\n"));
        }
        let filesystem = match (&self.volume, &self.pool) {
            (Some(volume), _) if volume.mounted_at.as_deref() == Some(dir) => {
                format!("/dev/mapper/{}", volume.mapper_name)
            }
            (_, Some(pool)) if pool.online => pool.name.clone(),
            _ => String::from("/dev/root"),
        };
        let used = 120_u32.saturating_add(self.transfers.saturating_mul(5));
        reply(
            0,
            format!(
                "Filesystem      Size  Used Avail Use% Mounted on\n{filesystem}  3.6T  {used}G  3.4T   4% {dir}\n"
            ),
            "",
        )
    }

    fn pool_status(&mut self, name: &str) -> CommandOutput {
        let Some(pool) = self.pool.as_mut().filter(|pool| pool.name == name && pool.online) else {
            return reply(1, "", format!("cannot open '{name}': no such pool\n"));
        };

        let scan = if pool.scrubbing {
            match pool.estimates.pop_front() {
                Some(Some(secs)) => format!(
                    "scrub in progress since Sun Mar 10 00:24:01 2024\n\t0B repaired, 50.00% done, {} to go",
                    clock(secs)
                ),
                Some(None) => String::from(
                    "scrub in progress since Sun Mar 10 00:24:01 2024\n\t0B repaired, 0.00% done, no estimated completion time",
                ),
                None => {
                    pool.scrubbing = false;
                    String::from("scrub repaired 0B in 01:02:03 with 0 errors")
                }
            }
        } else {
            String::from("scrub repaired 0B in 01:02:03 with 0 errors")
        };

        reply(
            0,
            format!("  pool: {name}\n state: ONLINE\n  scan: {scan}\nerrors: No known data errors\n"),
            "",
        )
    }

    fn snapshot_listing(&self) -> CommandOutput {
        let snapshots = self
            .pool
            .as_ref()
            .filter(|pool| pool.online)
            .map(|pool| pool.snapshots.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        if snapshots.is_empty() {
            return reply(1, "", "no datasets available\n");
        }
        let rows: String = snapshots
            .iter()
            .map(|name| format!("{name}  0B  -  1.2T  -\n"))
            .collect();
        reply(0, format!("NAME  USED  AVAIL  REFER  MOUNTPOINT\n{rows}"), "")
    }
}

impl CommandRunner for SimulatedHost {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        Ok(self.respond(program, args, None))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
    ) -> Result<CommandOutput, RemoteError> {
        Ok(self.respond(program, args, Some(input)))
    }

    fn run_inherited(
        &self,
        program: &str,
        args: &[OsString],
    ) -> Result<CommandOutput, RemoteError> {
        Ok(self.respond(program, args, None))
    }
}

impl Sleeper for SimulatedHost {
    fn sleep(&self, duration: Duration) {
        self.state
            .borrow_mut()
            .events
            .push(format!("sleep {}s", duration.as_secs()));
    }
}

/// Sleeper that records requested durations instead of sleeping.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded durations in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Credential provider returning a fixed passphrase.
#[derive(Clone, Debug)]
pub struct StaticCredentials {
    passphrase: String,
    requests: Rc<Cell<u32>>,
}

impl StaticCredentials {
    /// Creates a provider that always answers `passphrase`.
    #[must_use]
    pub fn new(passphrase: &str) -> Self {
        Self {
            passphrase: passphrase.to_owned(),
            requests: Rc::new(Cell::new(0)),
        }
    }

    /// Returns how many times a passphrase was requested.
    #[must_use]
    pub fn requests(&self) -> u32 {
        self.requests.get()
    }
}

impl CredentialProvider for StaticCredentials {
    fn passphrase(&self, _target: &str) -> Result<Secret, CredentialError> {
        self.requests.set(self.requests.get().saturating_add(1));
        Ok(Secret::new(self.passphrase.clone()))
    }
}

/// Builds a complete configuration for a pool-backed backup of `/srv/data`
/// to `backup@backup.example.net:/mnt/tank/backup/`.
#[must_use]
pub fn sample_settings() -> BackupSettings {
    BackupSettings {
        remote: RemoteConfig {
            host: String::from("backup.example.net"),
            user: String::from("backup"),
            port: 2222,
            identity_file: String::from("/home/operator/.ssh/id_ed25519"),
            destination: String::from("/mnt/tank/backup/"),
            ssh_bin: String::from("ssh"),
            batch_mode: true,
            strict_host_key_checking: true,
            known_hosts_file: None,
        },
        transfer: TransferConfig {
            rsync_bin: String::from("rsync"),
            sources: vec![String::from("/srv/data")],
            rsync_args: String::from("-a --delete"),
            log_output: false,
            log_dir: String::from("/var/log/offsite"),
        },
        pool: PoolConfig {
            pool_enabled: true,
            pool_name: String::from("tank"),
            snapshot_limit: 2,
            import_pool: true,
            export_pool: true,
            scrub_pool: true,
        },
        volume: VolumeConfig {
            volume_enabled: false,
            container: String::new(),
            mapper_name: String::new(),
            mount_to_destination: false,
            passphrase_file: None,
        },
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    #[must_use]
    pub fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
