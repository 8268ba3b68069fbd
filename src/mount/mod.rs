//! Mount table access
//!
//! ```text
//! MountSource (file / in-memory)
//!        │ Vec<MountEntry>
//!        ▼
//! MountRecord::from_entry  ── ServerSpec::parse, MountHints::parse
//!        │
//!        ▼
//! MountCatalog { dir → MountRecord }   (built lazily, read-only)
//! ```

pub mod catalog;
pub mod server;
pub mod table;

pub use catalog::{normalize_dir, LazyCatalog, MountCatalog, MountRecord};
pub use server::ServerSpec;
pub use table::{MountEntry, MountHints, MountSource, MountTableFile, StaticMounts};
