//! Tests for ssh argument construction and path probing.

use rstest::{fixture, rstest};

use super::*;
use crate::config::RemoteConfig;
use crate::test_support::{ScriptedRunner, sample_settings};

#[fixture]
fn remote() -> RemoteConfig {
    sample_settings().remote
}

fn lossy(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[rstest]
fn run_addresses_endpoint_with_command_last(remote: RemoteConfig) {
    let runner = ScriptedRunner::new();
    runner.push_success();
    let shell = RemoteShell::new(&remote, runner.clone());

    shell.run("zpool status tank").expect("run should succeed");

    let invocations = runner.invocations();
    let call = invocations.first().expect("one invocation");
    assert_eq!(call.program, "ssh");
    assert_eq!(
        lossy(&call.args),
        vec![
            "-p",
            "2222",
            "-i",
            "/home/operator/.ssh/id_ed25519",
            "-o",
            "BatchMode=yes",
            "backup@backup.example.net",
            "zpool status tank",
        ]
    );
    assert_eq!(call.input, None);
}

#[rstest]
fn relaxed_host_checking_and_known_hosts_are_forwarded(remote: RemoteConfig) {
    let cfg = RemoteConfig {
        batch_mode: false,
        strict_host_key_checking: false,
        known_hosts_file: Some(String::from("/tmp/known_hosts")),
        ..remote
    };
    let runner = ScriptedRunner::new();
    runner.push_success();
    let shell = RemoteShell::new(&cfg, runner.clone());

    shell.run("ls /").expect("run should succeed");

    let args = runner
        .invocations()
        .first()
        .map(|call| lossy(&call.args))
        .unwrap_or_default();
    assert!(!args.contains(&String::from("BatchMode=yes")));
    assert!(args.contains(&String::from("StrictHostKeyChecking=no")));
    assert!(args.contains(&String::from("UserKnownHostsFile=/tmp/known_hosts")));
}

#[rstest]
fn run_with_input_passes_bytes_to_runner(remote: RemoteConfig) {
    let runner = ScriptedRunner::new();
    runner.push_success();
    let shell = RemoteShell::new(&remote, runner.clone());

    shell
        .run_with_input("cat > /dev/null", b"hunter2")
        .expect("run should succeed");

    let input = runner
        .invocations()
        .first()
        .and_then(|call| call.input.clone());
    assert_eq!(input.as_deref(), Some(b"hunter2".as_slice()));
}

#[rstest]
#[case::present("total 0\n", "", true)]
#[case::missing("", "ls: cannot access '/mnt/x': No such file or directory\n", false)]
#[case::other_error("", "ls: cannot open directory '/mnt/x': Permission denied\n", true)]
fn path_exists_reads_missing_marker(
    remote: RemoteConfig,
    #[case] stdout: &str,
    #[case] stderr: &str,
    #[case] expected: bool,
) {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(2), stdout, stderr);
    let shell = RemoteShell::new(&remote, runner.clone());

    assert_eq!(shell.path_exists("/mnt/x").expect("path query"), expected);
    assert_eq!(
        runner.invocations().first().map(|call| call.remote_command()),
        Some(String::from("ls -lah /mnt/x"))
    );
}

#[rstest]
fn remote_shell_command_includes_port_and_identity(remote: RemoteConfig) {
    let shell = RemoteShell::new(&remote, ScriptedRunner::new());

    let command = shell.remote_shell_command();

    assert!(
        command.starts_with("ssh -p 2222 -i /home/operator/.ssh/id_ed25519"),
        "unexpected remote shell: {command}"
    );
    assert!(command.contains("BatchMode=yes"));
}

#[rstest]
fn spawn_failures_surface_as_errors(remote: RemoteConfig) {
    let shell = RemoteShell::new(&remote, ScriptedRunner::new());

    let err = shell.run("ls /").expect_err("no scripted response");

    assert!(matches!(err, RemoteError::Spawn { ref program, .. } if program == "ssh"));
}

#[rstest]
fn endpoint_login_joins_user_and_host(remote: RemoteConfig) {
    let endpoint = remote.endpoint();
    assert_eq!(endpoint.login(), "backup@backup.example.net");
    assert_eq!(endpoint.port, 2222);
}

#[rstest]
fn process_runner_reports_missing_program() {
    let err = ProcessCommandRunner
        .run("offsite-test-no-such-binary", &[])
        .expect_err("spawn should fail");
    assert!(matches!(err, RemoteError::Spawn { .. }));
}
