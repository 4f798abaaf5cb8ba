// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::PathBuf;
use std::sync::Arc;

use mountpoint_args::{Args, ARG_FOREGROUND, ARG_FOREGROUND_SHORT};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::process::{CommandRunner, MountpointCommand, ProcessRunner, RunOutcome, FUSE_DEV_PATH};

/// Options for running Mountpoint in the foreground
#[derive(Debug)]
pub struct ForegroundOptions<'fd> {
    /// Path to the `mount-s3` binary.
    pub binary_path: PathBuf,
    pub bucket_name: String,
    /// FUSE device; duplicated for the child, the caller keeps ownership.
    pub fuse_fd: BorrowedFd<'fd>,
    pub args: Args,
    /// `KEY=VALUE` entries making up the child's whole environment.
    pub env: Vec<String>,
}

/// Runs Mountpoint attached to the calling process until it exits
#[derive(Debug, Clone)]
pub struct ForegroundRunner {
    runner: Arc<dyn CommandRunner>,
}

impl Default for ForegroundRunner {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRunner))
    }
}

impl ForegroundRunner {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Run Mountpoint and wait for it to exit.
    ///
    /// Returns the real exit status even when it is non-zero. Errors mean the
    /// process never ran: bad inputs, an unusable descriptor, or a failed
    /// spawn or wait.
    pub async fn run(&self, options: ForegroundOptions<'_>) -> Result<RunOutcome> {
        if options.binary_path.as_os_str().is_empty() {
            return Err(Error::MissingBinaryPath);
        }
        if options.bucket_name.is_empty() {
            return Err(Error::MissingBucketName);
        }

        let fuse_device =
            options
                .fuse_fd
                .try_clone_to_owned()
                .map_err(|source| Error::InvalidDescriptor {
                    fd: options.fuse_fd.as_raw_fd(),
                    source,
                })?;

        let command = MountpointCommand {
            args: build_args(&options.bucket_name, &options.args),
            env: parse_env(&options.env),
            program: options.binary_path,
            fuse_device,
        };
        debug!(?command, "Running Mountpoint in the foreground");

        self.runner.run(command).await
    }
}

/// Positional bucket and device path, then sorted flags, always ending up in foreground mode.
pub fn build_args(bucket_name: &str, args: &Args) -> Vec<String> {
    let mut list = vec![bucket_name.to_string(), FUSE_DEV_PATH.to_string()];
    list.extend(args.sorted_list());
    if !args.has(ARG_FOREGROUND) && !args.has(ARG_FOREGROUND_SHORT) {
        list.push(ARG_FOREGROUND.to_string());
    }
    list
}

/// Split `KEY=VALUE` entries, dropping malformed ones.
pub fn parse_env(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Some((key.to_string(), value.to_string())),
            _ => {
                warn!(entry = %entry, "Ignoring malformed environment entry");
                None
            }
        })
        .collect()
}
