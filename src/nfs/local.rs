//! Liveness of a local automount daemon
//!
//! Automounter entries in the mount table name the daemon process that
//! serves the mount point rather than a remote host. Touching such a mount
//! blocks if the daemon is gone or wedged, so the check is local only:
//! the pid must exist and must not be in uninterruptible sleep, stopped,
//! or a zombie.

use crate::error::{ProbeError, ProbeResult};
use std::fs;
use std::io;
use tracing::debug;

/// Check that automount daemon `pid` is alive and not stalled
pub fn check_daemon(pid: u32) -> ProbeResult<()> {
    let stalled = |state: &str| ProbeError::LocalDaemonStalled {
        pid,
        state: state.to_string(),
    };

    let raw = libc::pid_t::try_from(pid).map_err(|_| stalled("invalid pid"))?;
    if raw <= 0 {
        return Err(stalled("invalid pid"));
    }

    // signal 0 only checks for existence; EPERM still means it exists
    // SAFETY: kill(2) with signal 0 delivers nothing and takes no pointers
    if unsafe { libc::kill(raw, 0) } != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EPERM) {
            return Err(stalled("not running"));
        }
    }

    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => match parse_stat_state(&stat) {
            Some('D') => Err(stalled("uninterruptible wait")),
            Some('Z') | Some('X') => Err(stalled("zombie")),
            Some('T') | Some('t') => Err(stalled("stopped")),
            state => {
                debug!(pid, state = ?state, "Automount daemon alive");
                Ok(())
            }
        },
        // no procfs: existence is all we can tell
        Err(_) => Ok(()),
    }
}

/// Extract the state letter from a `/proc/<pid>/stat` line
///
/// The command name is parenthesized and may itself contain spaces or
/// parentheses, so the state is the first field after the last `)`.
pub fn parse_stat_state(stat: &str) -> Option<char> {
    let tail = &stat[stat.rfind(')')? + 1..];
    tail.split_whitespace().next()?.chars().next()
}
