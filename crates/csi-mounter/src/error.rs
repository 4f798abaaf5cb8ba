// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that end the entrypoint with the fatal exit code
#[derive(Error, Debug)]
pub enum MounterError {
    #[error("failed to receive mount options: {0}")]
    Recv(#[from] mount_options::Error),

    #[error("failed to run Mountpoint: {0}")]
    Run(#[from] mountpoint_runner::Error),

    #[error("failed to create cache directory in {parent}: {source}")]
    CacheDir {
        parent: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MounterError>;
