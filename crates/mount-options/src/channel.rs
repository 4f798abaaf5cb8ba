// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One-shot exchange of [`MountOptions`] over a Unix socket
//!
//! Framing is implicit: the sender writes a single JSON message with the
//! descriptor attached and closes, the receiver reads until EOF. A socket path
//! hosts exactly one exchange.

use std::io;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::Interest;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::options::MountOptions;
use crate::socket_path::ResolvedSocketPath;
use crate::transport::{DescriptorTransport, ScmRightsTransport};
use crate::wait::{poll_until, ExchangeContext, PollError};

pub const DEFAULT_DIAL_RETRY_INTERVAL: Duration = Duration::from_millis(5);
pub const DEFAULT_PAYLOAD_CHUNK_SIZE: usize = 1024;

/// Tunables for a [`MountOptionsChannel`]
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Pause between dial attempts while the receiver is not listening yet.
    pub dial_retry_interval: Duration,
    /// Payload bytes requested per read.
    pub payload_chunk_size: usize,
    pub transport: Arc<dyn DescriptorTransport>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            dial_retry_interval: DEFAULT_DIAL_RETRY_INTERVAL,
            payload_chunk_size: DEFAULT_PAYLOAD_CHUNK_SIZE,
            transport: Arc::new(ScmRightsTransport),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MountOptionsChannel {
    config: ChannelConfig,
}

impl MountOptionsChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Send `options` to the receiver listening on `path`.
    ///
    /// Dialing is retried while the socket does not exist or refuses
    /// connections, until `ctx` expires. `options.fd` must be set.
    pub async fn send(&self, ctx: &ExchangeContext, path: &Path, options: &MountOptions) -> Result<()> {
        let fd = options.fd.as_ref().ok_or_else(|| Error::MissingDescriptor {
            path: path.to_path_buf(),
        })?;
        let resolved = ResolvedSocketPath::resolve(path).map_err(|source| Error::SocketPath {
            path: path.to_path_buf(),
            source,
        })?;
        let payload = options.encode(path)?;

        let stream = self.dial(ctx, path, resolved.wire_path()).await?;
        debug!(operation = "send", socket_path = %path.display(), "Connected to unix socket");

        let transport = &self.config.transport;
        let written = ctx
            .run(stream.async_io(Interest::WRITABLE, || {
                transport.send(stream.as_fd(), &payload, fd.as_fd())
            }))
            .await
            .map_err(|reason| Error::Interrupted {
                operation: "write",
                path: path.to_path_buf(),
                reason,
            })?
            .map_err(|source| Error::Write {
                path: path.to_path_buf(),
                source,
            })?;

        if written != payload.len() {
            return Err(Error::PartialWrite {
                path: path.to_path_buf(),
                expected: payload.len(),
                written,
            });
        }

        info!(
            operation = "send",
            socket_path = %path.display(),
            bucket = %options.bucket_name,
            bytes = written,
            "Sent mount options"
        );
        Ok(())
    }

    async fn dial(&self, ctx: &ExchangeContext, path: &Path, wire: &Path) -> Result<UnixStream> {
        let outcome = poll_until(ctx, self.config.dial_retry_interval, || async move {
            match UnixStream::connect(wire).await {
                Ok(stream) => Ok(Some(stream)),
                Err(err) if is_retryable_dial_error(&err) => {
                    trace!(socket_path = %path.display(), error = %err, "Unix socket not ready, retrying");
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        })
        .await;

        outcome.map_err(|err| match err {
            PollError::Interrupted(reason) => Error::DialInterrupted {
                path: path.to_path_buf(),
                reason,
            },
            PollError::Condition(source) => Error::Dial {
                path: path.to_path_buf(),
                source,
            },
        })
    }

    /// Listen on `path` and receive exactly one set of mount options.
    ///
    /// `path` must not exist yet. The socket file is removed before returning.
    pub async fn recv(&self, ctx: &ExchangeContext, path: &Path) -> Result<MountOptions> {
        let resolved = ResolvedSocketPath::resolve(path).map_err(|source| Error::SocketPath {
            path: path.to_path_buf(),
            source,
        })?;

        let listener = UnixListener::bind(resolved.wire_path()).map_err(|source| Error::Listen {
            path: path.to_path_buf(),
            source,
        })?;
        let _socket_file = SocketFileGuard(path.to_path_buf());
        info!(operation = "recv", socket_path = %path.display(), "Waiting for mount options");

        let (stream, _) = ctx
            .run(listener.accept())
            .await
            .map_err(|reason| Error::Interrupted {
                operation: "accept",
                path: path.to_path_buf(),
                reason,
            })?
            .map_err(|source| Error::Accept {
                path: path.to_path_buf(),
                source,
            })?;
        drop(listener);

        let transport = &self.config.transport;
        let mut chunk = vec![0u8; self.config.payload_chunk_size.max(1)];
        let mut payload = Vec::new();
        let mut fds = Vec::new();
        let mut control_truncated = false;

        loop {
            let received = ctx
                .run(stream.async_io(Interest::READABLE, || {
                    transport.recv(stream.as_fd(), &mut chunk, &mut fds)
                }))
                .await
                .map_err(|reason| Error::Interrupted {
                    operation: "read",
                    path: path.to_path_buf(),
                    reason,
                })?
                .map_err(|source| Error::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

            control_truncated |= received.control_truncated;
            if received.bytes == 0 {
                break;
            }
            payload.extend_from_slice(&chunk[..received.bytes]);
        }

        let options = MountOptions::decode(path, &payload, fds, control_truncated)?;
        info!(
            operation = "recv",
            socket_path = %path.display(),
            bucket = %options.bucket_name,
            bytes = payload.len(),
            "Received mount options"
        );
        Ok(options)
    }
}

fn is_retryable_dial_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

/// Removes the listener's socket file, which tokio leaves behind.
struct SocketFileGuard(PathBuf);

impl Drop for SocketFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(socket_path = %self.0.display(), error = %err, "Failed to remove unix socket file")
            }
        }
    }
}

/// [`MountOptionsChannel::send`] with the default configuration.
pub async fn send(ctx: &ExchangeContext, path: &Path, options: &MountOptions) -> Result<()> {
    MountOptionsChannel::default().send(ctx, path, options).await
}

/// [`MountOptionsChannel::recv`] with the default configuration.
pub async fn recv(ctx: &ExchangeContext, path: &Path) -> Result<MountOptions> {
    MountOptionsChannel::default().recv(ctx, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use csi_test_utils::open_dev_null;

    #[tokio::test]
    async fn send_without_descriptor_fails_before_dialing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mount.sock");
        let ctx = ExchangeContext::with_timeout(Duration::from_secs(1));

        let options = MountOptions {
            bucket_name: "b".into(),
            ..Default::default()
        };
        let err = send(&ctx, &path, &options).await.unwrap_err();
        assert!(matches!(err, Error::MissingDescriptor { .. }));
    }

    #[tokio::test]
    async fn recv_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mount.sock");
        std::fs::write(&path, b"occupied").unwrap();
        let ctx = ExchangeContext::with_timeout(Duration::from_secs(1));

        let err = recv(&ctx, &path).await.unwrap_err();
        assert!(matches!(err, Error::Listen { .. }));
        // The pre-existing file belongs to someone else and must survive
        assert_eq!(std::fs::read(&path).unwrap(), b"occupied");
    }

    #[tokio::test]
    async fn recv_times_out_and_cleans_up_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mount.sock");
        let ctx = ExchangeContext::with_timeout(Duration::from_millis(50));

        let err = recv(&ctx, &path).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Interrupted {
                operation: "accept",
                ..
            }
        ));
        assert!(err.is_timeout());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn send_times_out_when_nobody_listens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mount.sock");
        let ctx = ExchangeContext::with_timeout(Duration::from_millis(50));

        let options = MountOptions::new("b", vec![], vec![], open_dev_null());
        let err = send(&ctx, &path, &options).await.unwrap_err();
        assert!(matches!(err, Error::DialInterrupted { .. }));
        assert!(err.is_timeout());
    }

    #[test]
    fn default_config_matches_protocol_constants() {
        let config = ChannelConfig::default();
        assert_eq!(config.dial_retry_interval, Duration::from_millis(5));
        assert_eq!(config.payload_chunk_size, 1024);
    }
}
