// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Descriptors for tests that pass real files around

use std::fs::File;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::fs::MetadataExt;

/// Open `/dev/null` read-only as a stand-in for the FUSE device.
pub fn open_dev_null() -> OwnedFd {
    File::open("/dev/null")
        .expect("failed to open /dev/null")
        .into()
}

/// (device, inode) of the open file behind `fd`
pub fn file_identity(fd: impl AsFd) -> (u64, u64) {
    let dup = fd
        .as_fd()
        .try_clone_to_owned()
        .expect("failed to duplicate descriptor");
    let metadata = File::from(dup)
        .metadata()
        .expect("failed to fstat descriptor");
    (metadata.dev(), metadata.ino())
}

/// Assert two descriptors refer to the same underlying file, whatever their numbers.
pub fn assert_same_file(a: impl AsFd, b: impl AsFd) {
    assert_eq!(
        file_identity(a),
        file_identity(b),
        "descriptors refer to different files"
    );
}
