// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `aws-s3-csi-mounter`: entrypoint of Mountpoint Pods
//!
//! Receives mount options and the FUSE descriptor from the CSI node over
//! `mount.sock`, runs Mountpoint in the foreground and turns the result into
//! an exit code Kubernetes can act on.

pub mod config;
pub mod decision;
pub mod error;
pub mod mounter;
pub mod signals;

pub use config::{MounterArgs, MounterConfig, MOUNTPOINT_BIN};
pub use decision::{ExitDecision, FATAL_EXIT_CODE, RESTART_EXIT_CODE, SUCCESS_EXIT_CODE};
pub use error::{MounterError, Result};
pub use mounter::Mounter;
pub use signals::SignalAbsorber;
