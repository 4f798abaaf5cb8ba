// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use csi_logging::CliLoggingArgs;
use mount_options::CommDir;

/// File name of the Mountpoint client inside the binary directory.
pub const MOUNTPOINT_BIN: &str = "mount-s3";

pub const DEFAULT_RECV_TIMEOUT_SECS: u64 = 120;

/// Command line of `aws-s3-csi-mounter`
#[derive(Parser, Debug, Clone)]
#[command(
    name = "aws-s3-csi-mounter",
    author,
    version,
    about = "Receives mount options from the CSI node and runs Mountpoint in the foreground"
)]
pub struct MounterArgs {
    /// Seconds to wait for mount options on the Unix socket
    #[arg(long, env = "MOUNT_SOCK_RECV_TIMEOUT_SECS", default_value_t = DEFAULT_RECV_TIMEOUT_SECS)]
    pub mount_sock_recv_timeout_secs: u64,

    /// Directory of the mount-s3 binary
    #[arg(long, env = "MOUNTPOINT_BIN_DIR", default_value = "/mountpoint-s3/bin")]
    pub mountpoint_bin_dir: PathBuf,

    /// Communication directory shared with the CSI node
    #[arg(long, env = "MOUNTPOINT_COMM_DIR", default_value = "/comm")]
    pub comm_dir: PathBuf,

    /// Where fresh cache directories are created (defaults to the system temp dir)
    #[arg(long, env = "MOUNTPOINT_CACHE_PARENT_DIR")]
    pub cache_parent_dir: Option<PathBuf>,

    #[command(flatten)]
    pub logging: CliLoggingArgs,
}

/// Resolved entrypoint settings
#[derive(Debug, Clone)]
pub struct MounterConfig {
    pub recv_timeout: Duration,
    pub mountpoint_path: PathBuf,
    pub comm: CommDir,
    pub cache_parent_dir: Option<PathBuf>,
}

impl Default for MounterConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(DEFAULT_RECV_TIMEOUT_SECS),
            mountpoint_path: PathBuf::from("/mountpoint-s3/bin").join(MOUNTPOINT_BIN),
            comm: CommDir::inside_mountpoint_pod(),
            cache_parent_dir: None,
        }
    }
}

impl From<&MounterArgs> for MounterConfig {
    fn from(args: &MounterArgs) -> Self {
        Self {
            recv_timeout: Duration::from_secs(args.mount_sock_recv_timeout_secs),
            mountpoint_path: args.mountpoint_bin_dir.join(MOUNTPOINT_BIN),
            comm: CommDir::new(&args.comm_dir),
            cache_parent_dir: args.cache_parent_dir.clone(),
        }
    }
}
