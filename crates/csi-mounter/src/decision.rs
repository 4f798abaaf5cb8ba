// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Exit code state machine of the entrypoint
//!
//! Kubernetes restarts the Mountpoint Pod on any non-zero exit and moves it to
//! `Succeeded` on a zero exit. A clean exit is only safe once the node has
//! confirmed the unmount through the `mount.exit` sentinel; otherwise a quiet
//! Mountpoint exit is indistinguishable from a crash.

/// Clean exit, no restart.
pub const SUCCESS_EXIT_CODE: u8 = 0;
/// Ask Kubernetes to restart the Pod.
pub const RESTART_EXIT_CODE: u8 = 1;
/// Entrypoint could not run Mountpoint at all.
pub const FATAL_EXIT_CODE: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Success,
    Restart,
}

impl ExitDecision {
    pub fn exit_code(self) -> u8 {
        match self {
            ExitDecision::Success => SUCCESS_EXIT_CODE,
            ExitDecision::Restart => RESTART_EXIT_CODE,
        }
    }
}

/// Outcome when mount options never arrived; `None` means fatal.
pub fn after_recv_failure(unmounted: bool) -> Option<ExitDecision> {
    unmounted.then_some(ExitDecision::Success)
}

/// Outcome once Mountpoint has exited with `exit_code`.
pub fn after_mountpoint_exit(_exit_code: i32, unmounted: bool) -> ExitDecision {
    if unmounted {
        ExitDecision::Success
    } else {
        ExitDecision::Restart
    }
}

/// Captured stderr is only persisted for failed runs.
pub fn should_persist_stderr(exit_code: i32) -> bool {
    exit_code != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        // (exit code, sentinel) -> decision
        let cases = [
            (0, false, ExitDecision::Restart),
            (2, false, ExitDecision::Restart),
            (1, true, ExitDecision::Success),
            (0, true, ExitDecision::Success),
            (143, false, ExitDecision::Restart),
        ];
        for (exit_code, unmounted, want) in cases {
            assert_eq!(
                after_mountpoint_exit(exit_code, unmounted),
                want,
                "exit code {exit_code}, unmounted {unmounted}"
            );
        }

        assert_eq!(after_recv_failure(true), Some(ExitDecision::Success));
        assert_eq!(after_recv_failure(false), None);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitDecision::Success.exit_code(), 0);
        assert_eq!(ExitDecision::Restart.exit_code(), 1);
        assert_eq!(FATAL_EXIT_CODE, 255);
        assert!(should_persist_stderr(2));
        assert!(!should_persist_stderr(0));
    }
}
