//! nfs-pathcheck - Filter search paths that lead to dead NFS servers
//!
//! Given a list of paths (typically the entries of `$PATH`), report the
//! ones that can be used without risking a hang on an unreachable network
//! filesystem server.
//!
//! # Features
//!
//! - **Probe before touching**: every network mount on a path is checked
//!   with a portmapper query and an NFS NULL call before any filesystem
//!   call is made below it.
//!
//! - **Bounded time**: probes share one deadline; filesystem calls run
//!   under a watchdog so a server dying mid-walk cannot hang the run.
//!
//! - **One probe per host**: outcomes are cached by server identity, so
//!   many mounts from one server cost a single round trip.
//!
//! - **Symlink aware**: links are resolved component by component with a
//!   per-walk budget and deadline, so mounts reached through links are
//!   checked too.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Driver                                 │
//! │  - input order, de-duplication, report                          │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ per path
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         PathWalker                               │
//! │  component ──▶ MountCatalog.lookup ──▶ networked?                │
//! │                                          │ yes                   │
//! │                                          ▼                       │
//! │                         HostLivenessCache ──▶ RpcProber          │
//! │                                          │ alive                 │
//! │                                          ▼                       │
//! │                     watchdog(lstat / readlink / access)          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod mount;
pub mod nfs;
pub mod walker;
pub mod watchdog;

pub use config::{CheckConfig, CliArgs};
pub use driver::{Driver, DriverOptions, PathStatus, Report, Verdict};
pub use error::{CheckError, Result};
pub use mount::{MountCatalog, MountEntry, MountSource, MountTableFile, StaticMounts};
pub use nfs::{HostLivenessCache, ProbeConfig, ProbeTarget, Prober, RpcProber};
pub use walker::{PathWalker, WalkOptions};
