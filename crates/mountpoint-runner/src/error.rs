// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that prevented Mountpoint from running at all
///
/// A Mountpoint process that started and exited non-zero is not an error; its
/// exit code is reported in [`crate::RunOutcome`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("runner: missing Mountpoint binary path")]
    MissingBinaryPath,

    #[error("runner: missing S3 Bucket name")]
    MissingBucketName,

    #[error("runner: passed file descriptor {fd} is not a valid FUSE file descriptor: {source}")]
    InvalidDescriptor {
        fd: i32,
        #[source]
        source: io::Error,
    },

    #[error("runner: failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("runner: failed to wait for {program}: {source}")]
    Wait {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
