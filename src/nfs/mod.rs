//! NFS server liveness probing
//!
//! This module answers one question: is the server behind a network mount
//! responsive enough that touching the mount will not hang?
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 HostLivenessCache                    │
//! │  - One outcome per server identity per run          │
//! └─────────────────────────┬───────────────────────────┘
//!                           │ first use only
//!                           ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                     RpcProber                        │
//! │  - resolve host (watchdog-bounded)                  │
//! │  - portmapper GETPORT over TCP                      │
//! │  - NFS NULL call over TCP or UDP                    │
//! │  - one deadline shared by every step                │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nfs_pathcheck::nfs::{HostLivenessCache, ProbeConfig, ProbeTarget, Prober, RpcProber};
//! use std::time::Duration;
//!
//! let prober = RpcProber::new(ProbeConfig::new(Duration::from_secs(5)));
//! let mut cache = HostLivenessCache::new();
//!
//! let target = ProbeTarget::host("fileserver");
//! let alive = cache.resolve(&target.identity, || prober.probe(&target)).is_ok();
//! println!("fileserver alive: {alive}");
//! ```

pub mod cache;
pub mod client;
pub mod local;
pub mod net;
pub mod prober;
pub mod resolver;
pub mod rpc;
pub mod types;

pub use cache::{normalize_identity, HostLivenessCache};
pub use prober::{ProbeConfig, Prober, RpcProber};
pub use types::{Liveness, ProbeTarget, Protocol};
