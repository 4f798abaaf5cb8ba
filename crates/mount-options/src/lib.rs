// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount option exchange between the CSI node agent and a Mountpoint Pod
//!
//! The node agent opens the FUSE device and calls [`send`]; the Mountpoint
//! Pod calls [`recv`] on a socket inside its communication directory. Both
//! sides may start in any order: the sender keeps dialing until the receiver
//! listens or the [`ExchangeContext`] expires.

pub mod channel;
pub mod error;
pub mod options;
pub mod pod_paths;
pub mod socket_path;
pub mod transport;
pub mod wait;

pub use channel::{recv, send, ChannelConfig, MountOptionsChannel};
pub use error::{Error, Result};
pub use options::MountOptions;
pub use pod_paths::CommDir;
pub use socket_path::{ResolvedSocketPath, MAX_SOCKET_PATH_LEN};
pub use transport::{DescriptorTransport, Received, ScmRightsTransport};
pub use wait::{poll_until, wait_for_unix_socket, ExchangeContext, Interrupted, PollError};
