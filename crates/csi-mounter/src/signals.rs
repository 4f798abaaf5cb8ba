// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Termination signal absorption
//!
//! Kubernetes sends SIGTERM to the Mountpoint Pod while workloads using the
//! mount may still be running. The entrypoint logs and ignores it; shutdown
//! happens when Mountpoint exits after the node unmounts the filesystem.

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::info;

/// Keeps SIGTERM and SIGINT handled for as long as it lives
#[derive(Debug)]
pub struct SignalAbsorber {
    task: JoinHandle<()>,
}

impl SignalAbsorber {
    /// Must be called within a tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = sigterm.recv() => {
                        info!(operation = "absorb_signal", signal = "SIGTERM", "Received SIGTERM, waiting for Mountpoint to exit");
                    }
                    Some(()) = sigint.recv() => {
                        info!(operation = "absorb_signal", signal = "SIGINT", "Received SIGINT, waiting for Mountpoint to exit");
                    }
                    else => break,
                }
            }
        });

        Ok(Self { task })
    }
}

impl Drop for SignalAbsorber {
    fn drop(&mut self) {
        self.task.abort();
    }
}
