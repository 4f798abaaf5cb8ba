// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Deadline and cancellation primitives shared by both ends of an exchange

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Why an operation stopped before completing
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline plus cancellation handle threaded through `send` and `recv`
///
/// Every blocking step of an exchange runs under [`ExchangeContext::run`], so
/// one deadline bounds dialing, writing, accepting and reading alike.
#[derive(Debug, Clone, Default)]
pub struct ExchangeContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl ExchangeContext {
    /// No deadline; only explicit cancellation stops it.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// Derive a context that is cancelled with `self` and expires no later than `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Reason the context is no longer usable, if any.
    pub fn done(&self) -> Option<Interrupted> {
        if self.cancel.is_cancelled() {
            return Some(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupted::DeadlineExceeded),
            _ => None,
        }
    }

    /// Drive `fut` until it completes, the deadline passes, or the context is cancelled.
    pub async fn run<F: Future>(&self, fut: F) -> std::result::Result<F::Output, Interrupted> {
        if let Some(reason) = self.done() {
            return Err(reason);
        }

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            _ = expired => Err(Interrupted::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }
}

/// Outcome of a failed [`poll_until`]
#[derive(Error, Debug)]
pub enum PollError<E> {
    #[error("{0}")]
    Interrupted(Interrupted),
    #[error("{0}")]
    Condition(E),
}

/// Evaluate `condition` immediately and then every `interval` until it yields a value.
///
/// The condition returns `Ok(None)` to keep polling, `Ok(Some(v))` to finish
/// and `Err(e)` to abort without further attempts. Only `ctx` bounds the loop.
pub async fn poll_until<T, E, F, Fut>(
    ctx: &ExchangeContext,
    interval: Duration,
    mut condition: F,
) -> std::result::Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Option<T>, E>>,
{
    loop {
        match ctx.run(condition()).await {
            Err(reason) => return Err(PollError::Interrupted(reason)),
            Ok(Err(err)) => return Err(PollError::Condition(err)),
            Ok(Ok(Some(value))) => return Ok(value),
            Ok(Ok(None)) => {}
        }

        ctx.run(tokio::time::sleep(interval))
            .await
            .map_err(PollError::Interrupted)?;
    }
}

/// Wait up to `timeout` for `path` to exist, checking every `interval`.
///
/// Returns [`Error::SocketNotFound`] when the path does not show up in time;
/// any other stat failure is returned immediately.
pub async fn wait_for_unix_socket(timeout: Duration, interval: Duration, path: &Path) -> Result<()> {
    let ctx = ExchangeContext::with_timeout(timeout);
    let outcome = poll_until(&ctx, interval, || async move {
        match tokio::fs::metadata(path).await {
            Ok(_) => Ok(Some(())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    })
    .await;

    match outcome {
        Ok(()) => {
            debug!(operation = "wait_for_unix_socket", socket_path = %path.display(), "Unix socket appeared");
            Ok(())
        }
        Err(PollError::Interrupted(_)) => Err(Error::SocketNotFound {
            path: path.to_path_buf(),
        }),
        Err(PollError::Condition(source)) => Err(Error::Stat {
            path: path.to_path_buf(),
            source,
        }),
    }
}
