//! Path walking
//!
//! # Architecture
//!
//! ```text
//!                 ┌─────────────────────────┐
//!                 │       PathWalker        │
//!                 │  - one component a time │
//!                 │  - symlink budget       │
//!                 └───────────┬─────────────┘
//!                             │
//!        ┌────────────────────┼────────────────────┐
//!        │                    │                    │
//! ┌──────▼──────┐      ┌──────▼──────┐      ┌──────▼──────┐
//! │ MountCatalog│      │ Liveness    │      │  Watchdog   │
//! │ exact dir   │      │ cache+probe │      │ lstat etc.  │
//! └─────────────┘      └─────────────┘      └─────────────┘
//! ```

pub mod path_walker;

pub use path_walker::{
    HostCheck, PathWalker, WalkOptions, DEFAULT_MAX_SYMLINKS, MAX_COMPONENTS, WALK_TIMEOUT_STEPS,
    WATCHDOG_SLACK,
};
