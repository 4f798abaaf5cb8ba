// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test helpers shared by the mounter crates
//!
//! Only ever pulled in through `[dev-dependencies]`, so helpers panic on
//! setup failures instead of returning errors.

pub mod fd;
pub mod logging;

pub use fd::{assert_same_file, file_identity, open_dev_null};
pub use logging::capture_logs;
