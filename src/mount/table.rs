//! Mount table reading
//!
//! Mount tables come in fstab format (`/proc/self/mounts`, `/etc/mtab`):
//!
//! ```text
//! newton:/export/bin /nfs/newton/bin nfs rw,vers=3,proto=tcp,addr=10.0.0.7 0 0
//! ```
//!
//! Fields are whitespace separated; spaces, tabs, newlines and backslashes
//! inside a field are written as octal escapes (`\040`, `\011`, `\012`,
//! `\134`).

use crate::error::{MountResult, MountTableError};
use crate::nfs::types::Protocol;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Mount tables tried, in order, when none is configured
#[cfg(target_os = "linux")]
pub const SYSTEM_MOUNT_TABLES: &[&str] = &["/proc/self/mounts", "/proc/mounts", "/etc/mtab"];

#[cfg(not(target_os = "linux"))]
pub const SYSTEM_MOUNT_TABLES: &[&str] = &["/etc/mtab", "/etc/mnttab"];

/// One raw mount table line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Device or `server:export`
    pub fsname: String,

    /// Mount point
    pub dir: String,

    /// Filesystem type
    pub fstype: String,

    /// Comma-separated mount options
    pub options: String,
}

impl MountEntry {
    pub fn new(fsname: &str, dir: &str, fstype: &str, options: &str) -> Self {
        Self {
            fsname: fsname.to_string(),
            dir: dir.to_string(),
            fstype: fstype.to_string(),
            options: options.to_string(),
        }
    }

    /// Transport, version and address hints from type and options
    pub fn hints(&self) -> MountHints {
        MountHints::parse(&self.fstype, &self.options)
    }
}

/// Source of the current mount records
pub trait MountSource {
    fn load(&self) -> MountResult<Vec<MountEntry>>;
}

/// Mount records already in memory
#[derive(Debug, Clone, Default)]
pub struct StaticMounts(pub Vec<MountEntry>);

impl MountSource for StaticMounts {
    fn load(&self) -> MountResult<Vec<MountEntry>> {
        Ok(self.0.clone())
    }
}

/// fstab-format mount table on disk
#[derive(Debug, Clone)]
pub struct MountTableFile {
    candidates: Vec<PathBuf>,
}

impl MountTableFile {
    /// Read exactly this file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            candidates: vec![path.into()],
        }
    }

    /// First existing table among the platform defaults
    pub fn system() -> Self {
        Self {
            candidates: SYSTEM_MOUNT_TABLES.iter().map(PathBuf::from).collect(),
        }
    }

    /// Parse table `contents`; `path` is used for error messages only
    pub fn parse(path: &Path, contents: &str) -> MountResult<Vec<MountEntry>> {
        let mut entries = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(MountTableError::Malformed {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    reason: format!("expected at least 4 fields, found {}", fields.len()),
                });
            }

            entries.push(MountEntry {
                fsname: unescape(fields[0]),
                dir: unescape(fields[1]),
                fstype: unescape(fields[2]),
                options: unescape(fields[3]),
            });
        }
        Ok(entries)
    }
}

impl MountSource for MountTableFile {
    fn load(&self) -> MountResult<Vec<MountEntry>> {
        let single = self.candidates.len() == 1;
        for path in &self.candidates {
            match fs::read_to_string(path) {
                Ok(contents) => {
                    let entries = Self::parse(path, &contents)?;
                    debug!(table = %path.display(), count = entries.len(), "Mount table loaded");
                    return Ok(entries);
                }
                Err(e) if single => {
                    return Err(MountTableError::Unreadable {
                        path: path.clone(),
                        reason: e.to_string(),
                    })
                }
                Err(e) => {
                    debug!(table = %path.display(), error = %e, "Mount table candidate skipped");
                }
            }
        }

        Err(MountTableError::NotFound {
            tried: self
                .candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Decode fstab octal escapes (`\040` and friends)
pub fn unescape(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_string();
    }

    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Probe hints derived from a mount entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountHints {
    /// Transport from `proto=`, `tcp`, `udp`
    pub protocol: Protocol,

    /// Version from `vers=`/`nfsvers=`, or 4 for `nfs4` (0 = unspecified)
    pub version: u32,

    /// Server address from `addr=`
    pub addr: Option<IpAddr>,

    /// Server port from `port=` (0 = ask the portmapper)
    pub port: Option<u16>,

    /// Automount daemon from `pgrp=`/`pid=`
    pub daemon_pid: Option<u32>,
}

impl MountHints {
    /// Parse hints from a filesystem type and option string
    pub fn parse(fstype: &str, options: &str) -> Self {
        let mut hints = MountHints {
            version: if fstype == "nfs4" { 4 } else { 0 },
            ..Self::default()
        };

        for opt in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = match opt.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (opt, None),
            };

            match (key, value) {
                ("proto", Some(v)) => {
                    if let Some(p) = Protocol::parse(v) {
                        hints.protocol = p;
                    }
                }
                ("tcp", None) => hints.protocol = Protocol::Tcp,
                ("udp", None) => hints.protocol = Protocol::Udp,
                ("vers" | "nfsvers", Some(v)) => {
                    // "4.1" and friends: the major version decides the port
                    let major = v.split('.').next().unwrap_or(v);
                    if let Ok(version) = major.parse() {
                        hints.version = version;
                    }
                }
                ("addr", Some(v)) => hints.addr = v.trim_matches(['[', ']']).parse().ok(),
                ("port", Some(v)) => hints.port = v.parse().ok(),
                ("pgrp" | "pid", Some(v)) => hints.daemon_pid = v.parse().ok(),
                _ => {}
            }
        }

        hints
    }
}
