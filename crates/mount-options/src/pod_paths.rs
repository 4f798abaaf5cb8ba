// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Well-known files shared between the node agent and a Mountpoint Pod
//!
//! Each Mountpoint Pod mounts an `emptyDir` volume named [`COMM_DIR`]. The node
//! agent sees it under the kubelet pod directory, the Pod sees it at `/comm`.

use std::path::{Path, PathBuf};

pub const COMM_DIR: &str = "comm";

/// Unix socket used for the mount option exchange.
pub const MOUNT_SOCK: &str = "mount.sock";

/// Captured stderr of a failed Mountpoint run.
pub const MOUNT_ERROR: &str = "mount.err";

/// Created by the node agent once it has unmounted cleanly.
pub const MOUNT_EXIT: &str = "mount.exit";

pub fn path_inside_mountpoint_pod(name: &str) -> PathBuf {
    Path::new("/").join(COMM_DIR).join(name)
}

/// Host-side path of `name` for a pod whose kubelet directory is `pod_dir`.
pub fn path_on_host(pod_dir: &Path, name: &str) -> PathBuf {
    pod_dir
        .join("volumes")
        .join("kubernetes.io~empty-dir")
        .join(COMM_DIR)
        .join(name)
}

/// The communication directory as seen by one side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommDir {
    root: PathBuf,
}

impl CommDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn inside_mountpoint_pod() -> Self {
        Self::new(Path::new("/").join(COMM_DIR))
    }

    pub fn on_host(pod_dir: &Path) -> Self {
        Self::new(path_on_host(pod_dir, ""))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mount_sock(&self) -> PathBuf {
        self.root.join(MOUNT_SOCK)
    }

    pub fn mount_error(&self) -> PathBuf {
        self.root.join(MOUNT_ERROR)
    }

    pub fn mount_exit(&self) -> PathBuf {
        self.root.join(MOUNT_EXIT)
    }
}
