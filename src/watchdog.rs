//! Supervised execution of calls that have no timeout of their own
//!
//! `lstat(2)` on a hard NFS mount or a blocking `getaddrinfo(3)` can hang
//! indefinitely. Such calls run on a short-lived helper thread and the
//! caller waits for the result on a channel with a bounded timeout. When
//! the limit passes the caller unwinds immediately; the helper thread is
//! detached and its late result is discarded when it finally returns.
//!
//! ```text
//! caller ──spawn──▶ helper: op() ──send──▶ ┐
//!   │                                      │ bounded(1)
//!   └──────── recv_timeout(limit) ◀────────┘
//! ```

use crossbeam_channel::{bounded, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a supervised call produced no result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchdogError {
    /// The call did not return within the limit
    #[error("timed out after {0:?}")]
    Expired(Duration),

    /// The helper thread could not be started
    #[error("cannot start helper thread: {0}")]
    Spawn(String),

    /// The call panicked on the helper thread
    #[error("call panicked")]
    Panicked,
}

/// Run `op` on a helper thread, waiting at most `limit` for its result
pub fn supervise<T, F>(name: &str, limit: Duration, op: F) -> Result<T, WatchdogError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = bounded::<T>(1);

    thread::Builder::new()
        .name(format!("watchdog-{name}"))
        .spawn(move || {
            // receiver may be gone if the watchdog already fired
            let _ = tx.send(op());
        })
        .map_err(|e| WatchdogError::Spawn(e.to_string()))?;

    match rx.recv_timeout(limit) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            warn!(op = name, limit = ?limit, "Watchdog fired, abandoning call");
            Err(WatchdogError::Expired(limit))
        }
        Err(RecvTimeoutError::Disconnected) => {
            debug!(op = name, "Supervised call panicked");
            Err(WatchdogError::Panicked)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_fast_call_returns_value() {
        let value = supervise("add", Duration::from_secs(5), || 2 + 2).unwrap();
        assert_eq!(value, 4);
    }

    #[test]
    fn test_hung_call_is_abandoned() {
        let started = Instant::now();
        let result = supervise("hang", Duration::from_millis(100), || {
            thread::sleep(Duration::from_secs(30));
        });

        assert_eq!(result, Err(WatchdogError::Expired(Duration::from_millis(100))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_panicking_call() {
        let result: Result<(), _> = supervise("panic", Duration::from_secs(5), || {
            panic!("boom");
        });
        assert_eq!(result, Err(WatchdogError::Panicked));
    }
}
