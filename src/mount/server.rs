//! Server spec parsing
//!
//! The first field of a network mount entry names the server and export:
//! - `host:/export`
//! - `[2001:db8::1]:/export` (bracketed address literal)
//! - `host:(pid1234)` (classic automounter entry naming its daemon)

use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;

/// `[literal]:export`
static BRACKETED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\]\s]+)\]:(.*)$").expect("Invalid bracketed server regex")
});

/// `host:export`, host cannot start with '/' (device paths)
static PLAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^:/\[\]\s][^:/\[\]\s]*):(.*)$").expect("Invalid server regex")
});

/// `(pidNNN)` export of an automounter entry
static PID_HINT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(pid(\d+)\)$").expect("Invalid pid hint regex"));

/// Parsed server half of a mount entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Host name or address literal, brackets removed
    pub host: String,

    /// Export path (or automounter marker)
    pub export: String,

    /// Whether the host was written as a bracketed literal
    pub bracketed: bool,
}

impl ServerSpec {
    /// Parse a mount table `fsname` field
    ///
    /// Returns None for entries with no host part (`/dev/sda1`, `tmpfs`).
    pub fn parse(fsname: &str) -> Option<Self> {
        let fsname = fsname.trim();

        if let Some(caps) = BRACKETED_REGEX.captures(fsname) {
            return Some(Self {
                host: caps[1].to_string(),
                export: caps[2].to_string(),
                bracketed: true,
            });
        }

        let caps = PLAIN_REGEX.captures(fsname)?;
        Some(Self {
            host: caps[1].to_string(),
            export: caps[2].to_string(),
            bracketed: false,
        })
    }

    /// Host identity used for liveness caching
    pub fn identity(&self) -> String {
        crate::nfs::normalize_identity(&self.host)
    }

    /// The host as an address, if it is a literal
    pub fn literal_addr(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// Automount daemon pid from a `host:(pidNNN)` entry
    pub fn daemon_pid(&self) -> Option<u32> {
        PID_HINT_REGEX
            .captures(&self.export)
            .and_then(|caps| caps[1].parse().ok())
    }
}
