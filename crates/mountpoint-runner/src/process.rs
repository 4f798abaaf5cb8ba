// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Spawning the Mountpoint process

use std::collections::VecDeque;
use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Descriptor slot the FUSE device occupies in the child.
pub const FUSE_FD_SLOT: RawFd = 3;

/// Device path Mountpoint opens to reach the inherited FUSE descriptor.
pub const FUSE_DEV_PATH: &str = "/dev/fd/3";

/// Most recent stderr bytes kept per run; older output is only relayed.
pub const STDERR_CAPTURE_LIMIT: usize = 64 * 1024;

/// Everything needed to launch one Mountpoint process
pub struct MountpointCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// The complete child environment; nothing is inherited from the caller.
    pub env: Vec<(String, String)>,
    /// Lands at [`FUSE_FD_SLOT`] in the child.
    pub fuse_device: OwnedFd,
}

impl fmt::Debug for MountpointCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, csi_logging::redact(value)))
            .collect();
        f.debug_struct("MountpointCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env)
            .field("fuse_device", &self.fuse_device.as_raw_fd())
            .finish()
    }
}

/// How a Mountpoint process ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Process exit code, or `128 + signal` when killed by a signal.
    pub exit_code: i32,
    /// Tail of what the process wrote to stderr, at most [`STDERR_CAPTURE_LIMIT`] bytes.
    pub stderr: Vec<u8>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a [`MountpointCommand`] to completion
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    async fn run(&self, command: MountpointCommand) -> Result<RunOutcome>;
}

/// Spawns a real child process
///
/// stdout is inherited; stderr is relayed to ours while its tail is kept for
/// the error artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: MountpointCommand) -> Result<RunOutcome> {
        let MountpointCommand {
            program,
            args,
            env,
            fuse_device,
        } = command;

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .env_clear()
            .envs(env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());

        let source_fd = fuse_device.as_raw_fd();
        // SAFETY: the closure only calls async-signal-safe libc functions.
        unsafe {
            cmd.pre_exec(move || place_fuse_fd(source_fd));
        }

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;
        // The child owns its slot-3 copy now.
        drop(fuse_device);

        info!(
            operation = "run",
            program = %program.display(),
            pid = child.id(),
            "Mountpoint process started"
        );

        let relay = child.stderr.take().map(|stderr| tokio::spawn(tee_stderr(stderr, STDERR_CAPTURE_LIMIT)));

        let status = child.wait().await.map_err(|source| Error::Wait {
            program: program.clone(),
            source,
        })?;

        let stderr = match relay {
            Some(handle) => handle.await.unwrap_or_else(|err| {
                warn!(error = %err, "stderr relay task failed");
                Vec::new()
            }),
            None => Vec::new(),
        };

        if let Some(signal) = status.signal() {
            warn!(
                operation = "run",
                program = %program.display(),
                signal = %signal_name(signal),
                "Mountpoint process was terminated by a signal"
            );
        }
        let exit_code = exit_code_of(status);
        info!(operation = "run", program = %program.display(), exit_code, "Mountpoint process exited");
        Ok(RunOutcome { exit_code, stderr })
    }
}

/// Runs in the forked child before exec.
fn place_fuse_fd(source_fd: RawFd) -> std::io::Result<()> {
    if source_fd == FUSE_FD_SLOT {
        let flags = unsafe { libc::fcntl(source_fd, libc::F_GETFD) };
        if flags < 0 || unsafe { libc::fcntl(source_fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
    } else if unsafe { libc::dup2(source_fd, FUSE_FD_SLOT) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Copy the child's stderr to ours, keeping the last `limit` bytes.
async fn tee_stderr<R>(mut stderr: R, limit: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(limit.min(8192));
    let mut out = tokio::io::stderr();
    let mut buf = [0u8; 4096];

    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                keep_tail(&mut tail, &buf[..n], limit);
                if let Err(err) = out.write_all(&buf[..n]).await {
                    debug!(error = %err, "Failed to relay Mountpoint stderr");
                }
            }
            Err(err) => {
                warn!(error = %err, "Failed to read Mountpoint stderr");
                break;
            }
        }
    }

    let _ = out.flush().await;
    tail.into()
}

fn keep_tail(tail: &mut VecDeque<u8>, chunk: &[u8], limit: usize) {
    let chunk = &chunk[chunk.len().saturating_sub(limit)..];
    let overflow = (tail.len() + chunk.len()).saturating_sub(limit);
    tail.drain(..overflow);
    tail.extend(chunk);
}

fn signal_name(signal: i32) -> String {
    Signal::try_from(signal)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| signal.to_string())
}

pub(crate) fn exit_code_of(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}
