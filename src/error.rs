//! Error types for nfs-pathcheck
//!
//! This module defines the error hierarchy that covers:
//! - Liveness probe failures (resolution, connect, portmapper, RPC)
//! - Path walk failures (watchdog, symlink depth, filesystem access)
//! - Mount table loading errors
//! - Configuration and usage errors
//!
//! Probe and walk errors are path-local: they drop one path from the
//! surviving set. Mount table errors are fatal for the whole run, and
//! configuration errors never get past argument handling.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for nfs-pathcheck
///
/// A failed probe reaches this level as `WalkError::HostDead`.
#[derive(Error, Debug)]
pub enum CheckError {
    /// Path walk errors
    #[error("{0}")]
    Walk(#[from] WalkError),

    /// Mount table errors
    #[error("Mount table error: {0}")]
    MountTable(#[from] MountTableError),
}

impl CheckError {
    /// Fatal errors abort the whole run instead of dropping a single path
    pub fn is_fatal(&self) -> bool {
        matches!(self, CheckError::MountTable(_))
    }
}

/// RPC-level failure reasons
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcFailure {
    /// No reply before the deadline
    #[error("timed out")]
    TimedOut,

    /// Program not served on the contacted port
    #[error("program unavailable")]
    ProgramUnavailable,

    /// Program served, but not at the requested version
    #[error("program version mismatch (server supports {low}..={high})")]
    ProgramMismatch { low: u32, high: u32 },

    /// Procedure not implemented by the program
    #[error("procedure unavailable")]
    ProcedureUnavailable,

    /// Server could not decode the arguments
    #[error("server could not decode arguments")]
    GarbageArgs,

    /// Server-side error (memory allocation failure, etc.)
    #[error("system error on server")]
    SystemError,

    /// Call rejected because of the RPC protocol version
    #[error("RPC version mismatch (server supports {low}..={high})")]
    RpcMismatch { low: u32, high: u32 },

    /// Call rejected by authentication
    #[error("authentication error (status {0})")]
    AuthError(u32),

    /// Reply belongs to another call
    #[error("reply xid {got:#x} does not match call xid {expected:#x}")]
    XidMismatch { expected: u32, got: u32 },

    /// Reply could not be decoded
    #[error("malformed reply: {0}")]
    Malformed(String),

    /// Transport error while talking to the server
    #[error("{0}")]
    Io(String),
}

impl RpcFailure {
    /// Map a socket error from a timed read/write into a failure reason
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => RpcFailure::TimedOut,
            _ => RpcFailure::Io(err.to_string()),
        }
    }
}

/// Liveness probe errors
///
/// Every variant means the probed server is considered dead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Host name did not resolve to any address
    #[error("{host}: unknown host")]
    AddressResolution { host: String },

    /// Non-blocking connect did not complete in time
    #[error("{host}: connect to {addr} timed out")]
    ConnectTimeout { host: String, addr: SocketAddr },

    /// Connect completed with an error (refused, unreachable)
    #[error("{host}: connect to {addr} failed: {reason}")]
    ConnectFailed {
        host: String,
        addr: SocketAddr,
        reason: String,
    },

    /// Portmapper answered, but the NFS program is not registered
    #[error("{host}: NFS server (version {version}) not registered")]
    ServiceNotRegistered { host: String, version: u32 },

    /// RPC call failed or timed out
    #[error("{host}: RPC failed: {reason}")]
    Rpc { host: String, reason: RpcFailure },

    /// Local automount daemon is gone or stuck
    #[error("automount daemon {pid} is not responding ({state})")]
    LocalDaemonStalled { pid: u32, state: String },
}

impl ProbeError {
    /// Host-level failures make trying further transports pointless
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ProbeError::AddressResolution { .. }
                | ProbeError::ConnectTimeout { .. }
                | ProbeError::Rpc {
                    reason: RpcFailure::TimedOut,
                    ..
                }
        )
    }
}

/// Path walk errors
#[derive(Error, Debug, Clone)]
pub enum WalkError {
    /// A network mount on the path is served by a dead host
    #[error("'{path}': server {host} is not responding: {source}")]
    HostDead {
        path: String,
        host: String,
        source: ProbeError,
    },

    /// A filesystem call did not return before the watchdog fired
    #[error("'{path}': {op} did not complete within {limit:?}")]
    WatchdogTimeout {
        path: String,
        op: &'static str,
        limit: Duration,
    },

    /// Symbolic link chain longer than the configured budget
    #[error("'{path}': too many levels of symbolic links")]
    SymlinkDepthExceeded { path: String },

    /// Entry missing, permission denied, etc.
    #[error("'{path}': {message}")]
    FilesystemAccess {
        path: String,
        kind: io::ErrorKind,
        message: String,
    },

    /// Component exists but cannot be entered as a directory
    #[error("'{path}': not a directory")]
    NotADirectory { path: String },

    /// Path split into more components than the walker accepts
    #[error("'{path}': too many path components (limit {limit})")]
    TooManyComponents { path: String, limit: usize },

    /// Starting directory for a relative path is unusable
    #[error("cannot determine working directory: {0}")]
    BadWorkingDirectory(String),
}

impl WalkError {
    /// Build a filesystem access error from an I/O error
    pub fn access(path: &str, err: &io::Error) -> Self {
        WalkError::FilesystemAccess {
            path: path.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// True if the failure is a component that simply does not exist
    pub fn is_missing_entry(&self) -> bool {
        matches!(
            self,
            WalkError::FilesystemAccess {
                kind: io::ErrorKind::NotFound,
                ..
            }
        )
    }
}

/// Mount table loading errors
#[derive(Error, Debug)]
pub enum MountTableError {
    /// Table file could not be read
    #[error("cannot read mount table '{path}': {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// Table line does not have the expected fields
    #[error("'{path}' line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// No mount table candidate exists on this system
    #[error("no mount table found (tried {tried})")]
    NotFound { tried: String },
}

/// Configuration and usage errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No paths given and silent mode not requested
    #[error("no paths given")]
    NoPaths,

    /// Timeout must be positive
    #[error("invalid timeout {secs}: must be at least 1 second")]
    InvalidTimeout { secs: u64 },

    /// Symlink budget must be positive
    #[error("invalid symlink limit {limit}: must be between 1 and {max}")]
    InvalidSymlinkLimit { limit: u32, max: u32 },
}

/// Result type alias for CheckError
pub type Result<T> = std::result::Result<T, CheckError>;

/// Result type alias for ProbeError
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Result type alias for WalkError
pub type WalkResult<T> = std::result::Result<T, WalkError>;

/// Result type alias for MountTableError
pub type MountResult<T> = std::result::Result<T, MountTableError>;
