// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory log capture

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use csi_logging::{Level, LogFormat};
use tracing_subscriber::fmt::MakeWriter;

/// Log lines written by the subscriber [`capture_logs`] installed
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct CapturedLogsGuard<'a>(MutexGuard<'a, Vec<u8>>);

impl Write for CapturedLogsGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogsGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedLogsGuard(self.lock())
    }
}

/// Install the global subscriber for `component`, writing plaintext into memory.
///
/// Only the first call in a test binary installs it; later calls get a buffer
/// that stays empty.
pub fn capture_logs(component: &str, level: Level) -> CapturedLogs {
    let logs = CapturedLogs::default();
    let _ = csi_logging::init_with_writer(component, level, LogFormat::Plaintext, logs.clone());
    logs
}
