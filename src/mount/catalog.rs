//! Index of known mount points
//!
//! The catalog maps a canonical mount directory to its record. It is
//! built once from the mount source and read-only afterwards.
//!
//! Duplicate directories (stacked or misconfigured mounts) resolve to the
//! entry that appears LAST in the table: later mounts shadow earlier ones
//! on the same directory, so the last record is the one the kernel uses.

use crate::error::MountResult;
use crate::mount::server::ServerSpec;
use crate::mount::table::{MountEntry, MountSource};
use crate::nfs::types::{ProbeTarget, Protocol};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

/// Filesystem types served by a remote host
const NETWORK_FSTYPES: &[&str] = &["nfs", "nfs3", "nfs4"];

/// Automounter filesystem type (served by a local daemon)
const AUTOFS_FSTYPE: &str = "autofs";

/// Normalize a directory the same way the walker builds its prefix:
/// absolute, single separators, no trailing slash, root as `/`
pub fn normalize_dir(dir: &str) -> String {
    let mut out = String::with_capacity(dir.len() + 1);
    for component in dir.split('/').filter(|c| !c.is_empty()) {
        out.push('/');
        out.push_str(component);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// A mount point and what it takes to probe its server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    /// Canonical mount directory
    pub dir: String,

    /// Server half of the entry, if it names one
    pub server: Option<ServerSpec>,

    /// Filesystem type
    pub fstype: String,

    /// Whether touching the directory depends on something other than
    /// local storage
    pub networked: bool,

    /// Transport hint
    pub protocol: Protocol,

    /// Version hint (0 = unspecified)
    pub version: u32,

    /// Server address hint
    pub addr: Option<IpAddr>,

    /// Server port hint
    pub port: Option<u16>,

    /// Local automount daemon guarding the mount
    pub daemon_pid: Option<u32>,
}

impl MountRecord {
    /// Build a record from a raw mount table entry
    pub fn from_entry(entry: &MountEntry) -> Self {
        let hints = entry.hints();
        let server = ServerSpec::parse(&entry.fsname);
        let daemon_pid = hints
            .daemon_pid
            .or_else(|| server.as_ref().and_then(ServerSpec::daemon_pid));

        let networked = match entry.fstype.as_str() {
            t if NETWORK_FSTYPES.contains(&t) => server.is_some(),
            AUTOFS_FSTYPE => daemon_pid.is_some(),
            _ => false,
        };

        Self {
            dir: normalize_dir(&entry.dir),
            addr: hints.addr.or_else(|| server.as_ref().and_then(ServerSpec::literal_addr)),
            server,
            fstype: entry.fstype.clone(),
            networked,
            protocol: hints.protocol,
            version: hints.version,
            port: hints.port,
            daemon_pid,
        }
    }

    /// What the prober must check before this mount may be touched
    ///
    /// None for local mounts.
    pub fn probe_target(&self) -> Option<ProbeTarget> {
        if !self.networked {
            return None;
        }
        if let Some(pid) = self.daemon_pid {
            return Some(ProbeTarget::daemon(pid));
        }
        let server = self.server.as_ref()?;
        Some(ProbeTarget {
            addr: self.addr,
            protocol: self.protocol,
            version: self.version,
            port: self.port,
            identity: server.identity(),
            ..ProbeTarget::host(&server.host)
        })
    }
}

impl fmt::Display for MountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.server {
            Some(s) => write!(f, "{} on {} ({})", s.host, self.dir, self.fstype),
            None => write!(f, "{} ({})", self.dir, self.fstype),
        }
    }
}

/// Exact-path index of mount records
#[derive(Debug, Clone, Default)]
pub struct MountCatalog {
    records: HashMap<String, MountRecord>,
}

impl MountCatalog {
    /// Build from entries; a later entry for the same directory replaces
    /// an earlier one
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a MountEntry>) -> Self {
        let mut records = HashMap::new();
        for entry in entries {
            let record = MountRecord::from_entry(entry);
            if let Some(previous) = records.insert(record.dir.clone(), record) {
                debug!(dir = %previous.dir, "Duplicate mount point, later entry wins");
            }
        }
        Self { records }
    }

    /// Load from a mount source
    pub fn load(source: &dyn MountSource) -> MountResult<Self> {
        let entries = source.load()?;
        let catalog = Self::from_entries(&entries);
        debug!(
            mounts = catalog.len(),
            networked = catalog.networked().count(),
            "Mount catalog built"
        );
        Ok(catalog)
    }

    /// Record for exactly `dir`, if it is a mount point
    pub fn lookup(&self, dir: &str) -> Option<&MountRecord> {
        self.records.get(&normalize_dir(dir))
    }

    /// Records that need a liveness check
    pub fn networked(&self) -> impl Iterator<Item = &MountRecord> {
        self.records.values().filter(|r| r.networked)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Catalog built on first use from a mount source
pub struct LazyCatalog {
    source: Box<dyn MountSource>,
    catalog: OnceCell<MountCatalog>,
}

impl LazyCatalog {
    pub fn new(source: Box<dyn MountSource>) -> Self {
        Self {
            source,
            catalog: OnceCell::new(),
        }
    }

    /// The catalog, loading the mount source on first call
    pub fn get(&self) -> MountResult<&MountCatalog> {
        if let Some(catalog) = self.catalog.get() {
            return Ok(catalog);
        }
        let catalog = MountCatalog::load(self.source.as_ref())?;
        Ok(self.catalog.get_or_init(|| catalog))
    }

    /// Whether the source has been read yet
    pub fn is_loaded(&self) -> bool {
        self.catalog.get().is_some()
    }
}
