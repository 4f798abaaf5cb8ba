// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Unix socket path length workaround
//!
//! `sun_path` holds 108 bytes including the terminating NUL. Paths that do
//! not fit are reached through a symlink to their parent directory placed in a
//! short private temporary directory. Binding or connecting through the
//! symlink resolves to the real location, so the socket file itself still
//! lands at the caller's logical path.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

/// Longest usable socket path is one byte shorter than this.
pub const MAX_SOCKET_PATH_LEN: usize = 108;

const LINK_DIR_PREFIX: &str = "mountoptions";
const LINK_NAME: &str = "d";

/// Path to hand to the OS for a logical socket path
///
/// Holds the temporary symlink directory, if one was needed, and removes it
/// on drop.
#[derive(Debug)]
pub struct ResolvedSocketPath {
    wire: PathBuf,
    link_dir: Option<TempDir>,
}

impl ResolvedSocketPath {
    pub fn resolve(path: &Path) -> io::Result<Self> {
        if !is_too_long(path) {
            return Ok(Self {
                wire: path.to_path_buf(),
                link_dir: None,
            });
        }

        let (parent, file_name) = match (path.parent(), path.file_name()) {
            (Some(parent), Some(file_name)) if !parent.as_os_str().is_empty() => (parent, file_name),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cannot shorten unix socket path {}", path.display()),
                ))
            }
        };

        // The socket itself does not exist yet on the receiving side, only its directory.
        let target = std::fs::canonicalize(parent)?;
        let link_dir = tempfile::Builder::new().prefix(LINK_DIR_PREFIX).tempdir()?;
        let link = link_dir.path().join(LINK_NAME);
        std::os::unix::fs::symlink(&target, &link)?;

        let wire = link.join(file_name);
        if is_too_long(&wire) {
            warn!(
                socket_path = %path.display(),
                wire_path = %wire.display(),
                "Unix socket path is still longer than {} bytes after shortening, binding or connecting may fail",
                MAX_SOCKET_PATH_LEN - 1
            );
        } else {
            debug!(
                socket_path = %path.display(),
                wire_path = %wire.display(),
                "Using shortened unix socket path"
            );
        }

        Ok(Self {
            wire,
            link_dir: Some(link_dir),
        })
    }

    /// Path to pass to `bind`/`connect`.
    pub fn wire_path(&self) -> &Path {
        &self.wire
    }

    pub fn is_substituted(&self) -> bool {
        self.link_dir.is_some()
    }
}

fn is_too_long(path: &Path) -> bool {
    path.as_os_str().len() >= MAX_SOCKET_PATH_LEN
}
