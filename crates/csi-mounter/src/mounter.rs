// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::os::fd::AsFd;
use std::path::Path;

use mount_options::{ExchangeContext, MountOptions, MountOptionsChannel};
use mountpoint_args::{Args, ARG_CACHE};
use mountpoint_runner::{ForegroundOptions, ForegroundRunner};
use tempfile::TempDir;
use tracing::{info, warn};

use crate::config::MounterConfig;
use crate::decision::{self, ExitDecision};
use crate::error::{MounterError, Result};

/// Permissions of the error artifact; it may contain sensitive log lines.
const MOUNT_ERROR_FILE_MODE: u32 = 0o600;

const CACHE_DIR_PREFIX: &str = "mountpoint-cache";

/// Receives mount options once and supervises a single Mountpoint run
#[derive(Debug, Clone)]
pub struct Mounter {
    config: MounterConfig,
    channel: MountOptionsChannel,
    runner: ForegroundRunner,
}

impl Mounter {
    pub fn new(config: MounterConfig) -> Self {
        Self {
            config,
            channel: MountOptionsChannel::default(),
            runner: ForegroundRunner::default(),
        }
    }

    pub fn with_channel(mut self, channel: MountOptionsChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_runner(mut self, runner: ForegroundRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn config(&self) -> &MounterConfig {
        &self.config
    }

    /// Receive mount options, run Mountpoint and decide how the Pod exits.
    ///
    /// An `Err` means the entrypoint must terminate with the fatal exit code.
    pub async fn run(&self) -> Result<ExitDecision> {
        let sock = self.config.comm.mount_sock();
        let ctx = ExchangeContext::with_timeout(self.config.recv_timeout);

        info!(operation = "recv", socket_path = %sock.display(), "Trying to receive mount options");
        let options = match self.channel.recv(&ctx, &sock).await {
            Ok(options) => options,
            Err(err) => {
                let unmounted = self.unmounted().await;
                return match decision::after_recv_failure(unmounted) {
                    Some(decision) => {
                        warn!(
                            operation = "recv",
                            socket_path = %sock.display(),
                            error = %err,
                            "Failed to receive mount options, but the volume is already unmounted"
                        );
                        Ok(decision)
                    }
                    None => Err(MounterError::Recv(err)),
                };
            }
        };

        self.run_mountpoint(options).await
    }

    /// Run Mountpoint with already received `options`.
    pub async fn run_mountpoint(&self, mut options: MountOptions) -> Result<ExitDecision> {
        let fuse_device = options.take_fd().ok_or_else(|| {
            MounterError::Recv(mount_options::Error::MissingDescriptor {
                path: self.config.comm.mount_sock(),
            })
        })?;

        let mut args = Args::parse(&options.args);
        let cache_dir = self.replace_cache_dir(&mut args)?;

        let outcome = self
            .runner
            .run(ForegroundOptions {
                binary_path: self.config.mountpoint_path.clone(),
                bucket_name: std::mem::take(&mut options.bucket_name),
                fuse_fd: fuse_device.as_fd(),
                args,
                env: std::mem::take(&mut options.env),
            })
            .await?;

        drop(fuse_device);
        drop(cache_dir);

        if decision::should_persist_stderr(outcome.exit_code) {
            self.persist_mount_error(&outcome.stderr).await;
        }

        let unmounted = self.unmounted().await;
        let decision = decision::after_mountpoint_exit(outcome.exit_code, unmounted);
        info!(
            operation = "run",
            exit_code = outcome.exit_code,
            unmounted,
            ?decision,
            "Mountpoint exited"
        );
        Ok(decision)
    }

    /// Point `--cache` at a fresh directory that lives until the returned guard drops.
    fn replace_cache_dir(&self, args: &mut Args) -> Result<Option<TempDir>> {
        if !args.has(ARG_CACHE) {
            return Ok(None);
        }

        let parent = self
            .config
            .cache_parent_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let dir = tempfile::Builder::new()
            .prefix(CACHE_DIR_PREFIX)
            .tempdir_in(&parent)
            .map_err(|source| MounterError::CacheDir { parent, source })?;

        let path = dir.path().to_string_lossy().into_owned();
        info!(operation = "cache", cache_dir = %path, "Using fresh cache directory");
        args.set(ARG_CACHE, Some(&path));
        Ok(Some(dir))
    }

    async fn persist_mount_error(&self, stderr: &[u8]) {
        let path = self.config.comm.mount_error();
        if let Err(err) = write_private_file(&path, stderr).await {
            warn!(
                operation = "persist_mount_error",
                path = %path.display(),
                error = %err,
                "Failed to write mount error logs"
            );
        }
    }

    async fn unmounted(&self) -> bool {
        file_exists(&self.config.comm.mount_exit()).await
    }
}

async fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(MOUNT_ERROR_FILE_MODE)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.flush().await
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}
