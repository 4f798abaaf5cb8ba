// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Foreground supervisor for the Mountpoint FUSE client
//!
//! Mountpoint daemonizes by default. The supervisor keeps it attached with
//! `--foreground`, hands it the FUSE device at descriptor 3 and waits for it
//! to exit, so the Pod's lifetime tracks the mount's lifetime.

pub mod error;
pub mod foreground;
pub mod process;

pub use error::{Error, Result};
pub use foreground::{build_args, parse_env, ForegroundOptions, ForegroundRunner};
pub use process::{
    CommandRunner, MountpointCommand, ProcessRunner, RunOutcome, FUSE_DEV_PATH, FUSE_FD_SLOT,
    STDERR_CAPTURE_LIMIT,
};
