// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Mount options to use while invoking Mountpoint
///
/// `fd` travels as `SCM_RIGHTS` ancillary data and is never part of the JSON
/// payload. After a successful exchange the receiver holds a different
/// descriptor number that refers to the same open file.
#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MountOptions {
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub args: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub env: Vec<String>,
    #[serde(skip)]
    pub fd: Option<OwnedFd>,
}

impl MountOptions {
    pub fn new(bucket_name: impl Into<String>, args: Vec<String>, env: Vec<String>, fd: OwnedFd) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            args,
            env,
            fd: Some(fd),
        }
    }

    /// Hand the descriptor over, leaving `None` behind.
    pub fn take_fd(&mut self) -> Option<OwnedFd> {
        self.fd.take()
    }

    pub(crate) fn encode(&self, path: &Path) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| Error::Encode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Assemble received options from the accumulated payload and descriptors.
    ///
    /// Descriptors beyond the single expected one are closed when `fds` drops.
    pub(crate) fn decode(
        path: &Path,
        payload: &[u8],
        mut fds: Vec<OwnedFd>,
        control_truncated: bool,
    ) -> Result<Self> {
        let mut options: MountOptions =
            serde_json::from_slice(payload).map_err(|source| Error::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        if control_truncated {
            return Err(Error::ControlTruncated {
                path: path.to_path_buf(),
            });
        }
        if fds.len() != 1 {
            return Err(Error::DescriptorCount {
                path: path.to_path_buf(),
                count: fds.len(),
            });
        }

        options.fd = fds.pop();
        Ok(options)
    }
}

impl fmt::Debug for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env: Vec<String> = self
            .env
            .iter()
            .map(|entry| csi_logging::redact_env_entry(entry))
            .collect();
        f.debug_struct("MountOptions")
            .field("bucket_name", &self.bucket_name)
            .field("args", &self.args)
            .field("env", &env)
            .field("fd", &self.fd.as_ref().map(AsRawFd::as_raw_fd))
            .finish()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
