// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Exit decisions of the entrypoint with a fake Mountpoint

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use csi_mounter::{ExitDecision, Mounter, MounterConfig, MounterError};
use csi_test_utils::{assert_same_file, open_dev_null};
use mount_options::{CommDir, ExchangeContext, MountOptions};
use mountpoint_runner::{CommandRunner, ForegroundRunner, MountpointCommand, RunOutcome};
use tempfile::TempDir;

/// Stands in for Mountpoint: records what it was asked to run and exits as told.
#[derive(Debug)]
struct FakeMountpoint {
    exit_code: i32,
    stderr: &'static [u8],
    fail_to_spawn: bool,
    seen: Mutex<Vec<SeenCommand>>,
}

#[derive(Debug, Clone)]
struct SeenCommand {
    args: Vec<String>,
    env: Vec<(String, String)>,
    cache_dir_existed: Option<bool>,
}

impl FakeMountpoint {
    fn exiting(exit_code: i32, stderr: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            exit_code,
            stderr,
            fail_to_spawn: false,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn unspawnable() -> Arc<Self> {
        Arc::new(Self {
            exit_code: 0,
            stderr: b"",
            fail_to_spawn: true,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<SeenCommand> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeMountpoint {
    async fn run(&self, command: MountpointCommand) -> mountpoint_runner::Result<RunOutcome> {
        if self.fail_to_spawn {
            return Err(mountpoint_runner::Error::Spawn {
                program: command.program,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        assert_same_file(&command.fuse_device, open_dev_null());
        let cache_dir_existed = command
            .args
            .iter()
            .find_map(|arg| arg.strip_prefix("--cache="))
            .map(|dir| Path::new(dir).is_dir());

        self.seen.lock().unwrap().push(SeenCommand {
            args: command.args,
            env: command.env,
            cache_dir_existed,
        });

        Ok(RunOutcome {
            exit_code: self.exit_code,
            stderr: self.stderr.to_vec(),
        })
    }
}

struct Fixture {
    comm: TempDir,
    cache_parent: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            comm: tempfile::tempdir().unwrap(),
            cache_parent: tempfile::tempdir().unwrap(),
        }
    }

    fn config(&self, recv_timeout: Duration) -> MounterConfig {
        MounterConfig {
            recv_timeout,
            mountpoint_path: PathBuf::from("/mountpoint-s3/bin/mount-s3"),
            comm: CommDir::new(self.comm.path()),
            cache_parent_dir: Some(self.cache_parent.path().to_path_buf()),
        }
    }

    fn mounter(&self, fake: Arc<FakeMountpoint>) -> Mounter {
        Mounter::new(self.config(Duration::from_secs(10)))
            .with_runner(ForegroundRunner::new(fake))
    }

    fn comm_dir(&self) -> CommDir {
        CommDir::new(self.comm.path())
    }

    fn mark_unmounted(&self) {
        std::fs::write(self.comm_dir().mount_exit(), b"").unwrap();
    }

    fn mount_error(&self) -> Option<Vec<u8>> {
        std::fs::read(self.comm_dir().mount_error()).ok()
    }
}

fn options(args: &[&str]) -> MountOptions {
    MountOptions::new(
        "test-bucket",
        args.iter().map(|a| a.to_string()).collect(),
        vec!["TEST_ENV=testing".to_string()],
        open_dev_null(),
    )
}

#[tokio::test]
async fn clean_exit_without_unmount_restarts() {
    let fixture = Fixture::new();
    let fake = FakeMountpoint::exiting(0, b"");

    let decision = fixture
        .mounter(fake.clone())
        .run_mountpoint(options(&["--read-only"]))
        .await
        .unwrap();

    assert_eq!(decision, ExitDecision::Restart);
    assert_eq!(decision.exit_code(), 1);
    assert!(fixture.mount_error().is_none());

    let seen = fake.seen();
    assert_eq!(
        seen[0].args,
        vec!["test-bucket", "/dev/fd/3", "--read-only", "--foreground"]
    );
    assert_eq!(
        seen[0].env,
        vec![("TEST_ENV".to_string(), "testing".to_string())]
    );
}

#[tokio::test]
async fn failed_exit_persists_stderr_and_restarts() {
    let fixture = Fixture::new();
    let fake = FakeMountpoint::exiting(2, b"Error: Failed to create S3 client\n");

    let decision = fixture
        .mounter(fake)
        .run_mountpoint(options(&[]))
        .await
        .unwrap();

    assert_eq!(decision, ExitDecision::Restart);
    assert_eq!(
        fixture.mount_error().unwrap(),
        b"Error: Failed to create S3 client\n"
    );

    let mode = std::fs::metadata(fixture.comm_dir().mount_error())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn unmount_sentinel_wins_over_exit_code() {
    let fixture = Fixture::new();
    fixture.mark_unmounted();
    let fake = FakeMountpoint::exiting(1, b"fuse: unmounted\n");

    let decision = fixture
        .mounter(fake)
        .run_mountpoint(options(&[]))
        .await
        .unwrap();

    assert_eq!(decision, ExitDecision::Success);
    assert_eq!(decision.exit_code(), 0);
}

#[tokio::test]
async fn cache_argument_gets_fresh_directory_for_the_run() {
    let fixture = Fixture::new();
    let fake = FakeMountpoint::exiting(0, b"");

    fixture
        .mounter(fake.clone())
        .run_mountpoint(options(&["--cache=/user/supplied", "--read-only"]))
        .await
        .unwrap();

    let seen = fake.seen();
    let cache_arg = seen[0]
        .args
        .iter()
        .find_map(|arg| arg.strip_prefix("--cache="))
        .unwrap()
        .to_string();

    assert_ne!(cache_arg, "/user/supplied");
    assert!(Path::new(&cache_arg).starts_with(fixture.cache_parent.path()));
    assert_eq!(seen[0].cache_dir_existed, Some(true));
    assert!(!Path::new(&cache_arg).exists(), "cache dir must be removed after exit");
}

#[tokio::test]
async fn missing_cache_parent_is_fatal() {
    let fixture = Fixture::new();
    let mut config = fixture.config(Duration::from_secs(10));
    config.cache_parent_dir = Some(fixture.cache_parent.path().join("missing"));
    let fake = FakeMountpoint::exiting(0, b"");

    let err = Mounter::new(config)
        .with_runner(ForegroundRunner::new(fake.clone()))
        .run_mountpoint(options(&["--cache=/x"]))
        .await
        .unwrap_err();

    assert!(matches!(err, MounterError::CacheDir { .. }), "unexpected error: {err}");
    assert!(fake.seen().is_empty());
}

#[tokio::test]
async fn spawn_failure_is_fatal() {
    let fixture = Fixture::new();

    let err = fixture
        .mounter(FakeMountpoint::unspawnable())
        .run_mountpoint(options(&[]))
        .await
        .unwrap_err();

    assert!(matches!(err, MounterError::Run(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn recv_timeout_after_unmount_succeeds() {
    let fixture = Fixture::new();
    fixture.mark_unmounted();

    let decision = Mounter::new(fixture.config(Duration::from_millis(100)))
        .with_runner(ForegroundRunner::new(FakeMountpoint::exiting(0, b"")))
        .run()
        .await
        .unwrap();

    assert_eq!(decision, ExitDecision::Success);
}

#[tokio::test]
async fn recv_timeout_without_unmount_is_fatal() {
    let fixture = Fixture::new();

    let err = Mounter::new(fixture.config(Duration::from_millis(100)))
        .with_runner(ForegroundRunner::new(FakeMountpoint::exiting(0, b"")))
        .run()
        .await
        .unwrap_err();

    match err {
        MounterError::Recv(inner) => assert!(inner.is_timeout(), "unexpected error: {inner}"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fixture.comm_dir().mount_sock().exists());
}

#[tokio::test]
async fn receives_options_from_node_and_runs_mountpoint() {
    let fixture = Fixture::new();
    let fake = FakeMountpoint::exiting(0, b"");
    let mounter = fixture.mounter(fake.clone());
    let sock = fixture.comm_dir().mount_sock();

    let sender = tokio::spawn(async move {
        let ctx = ExchangeContext::with_timeout(Duration::from_secs(10));
        mount_options::send(&ctx, &sock, &options(&["allow-other", "-f"])).await
    });

    let decision = mounter.run().await.unwrap();
    sender.await.unwrap().unwrap();

    assert_eq!(decision, ExitDecision::Restart);
    assert_eq!(
        fake.seen()[0].args,
        vec!["test-bucket", "/dev/fd/3", "--allow-other", "--foreground"]
    );
}
