// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::wait::Interrupted;

/// Errors produced while exchanging mount options
///
/// Every variant carries the logical socket path the caller passed in, not the
/// shortened path that may have been used on the wire.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to dial unix socket {path}: {source}")]
    Dial {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to dial unix socket {path}: {reason}")]
    DialInterrupted { path: PathBuf, reason: Interrupted },

    #[error("failed to listen unix socket {path}: {source}")]
    Listen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection from unix socket {path}: {source}")]
    Accept {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read message from unix socket {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to unix socket {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("partial write to unix socket {path}: message: size {expected} - written {written}")]
    PartialWrite {
        path: PathBuf,
        expected: usize,
        written: usize,
    },

    #[error("{operation} on unix socket {path} interrupted: {reason}")]
    Interrupted {
        operation: &'static str,
        path: PathBuf,
        reason: Interrupted,
    },

    #[error("failed to prepare unix socket path {path}: {source}")]
    SocketPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to marshal message to send {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode mount options from unix socket {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected to get one file descriptor from unix socket {path}, but got {count}")]
    DescriptorCount { path: PathBuf, count: usize },

    #[error("control data from unix socket {path} was truncated, more than one file descriptor was sent")]
    ControlTruncated { path: PathBuf },

    #[error("mount options for unix socket {path} carry no file descriptor")]
    MissingDescriptor { path: PathBuf },

    #[error("unix socket {path} does not exist")]
    SocketNotFound { path: PathBuf },

    #[error("failed to stat unix socket {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// The peer sent something that violates the one-message, one-descriptor protocol.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::Encode { .. }
                | Error::Decode { .. }
                | Error::DescriptorCount { .. }
                | Error::ControlTruncated { .. }
                | Error::MissingDescriptor { .. }
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Dial { .. }
                | Error::DialInterrupted { .. }
                | Error::Listen { .. }
                | Error::Accept { .. }
                | Error::Read { .. }
                | Error::Write { .. }
                | Error::PartialWrite { .. }
                | Error::Interrupted { .. }
                | Error::SocketPath { .. }
        )
    }

    /// Whether the operation gave up because its deadline passed.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::DialInterrupted {
                reason: Interrupted::DeadlineExceeded,
                ..
            } | Error::Interrupted {
                reason: Interrupted::DeadlineExceeded,
                ..
            } | Error::SocketNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
