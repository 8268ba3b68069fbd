//! Probe data types
//!
//! These types describe what to probe (a server identity plus the transport
//! and version hints taken from the mount table) and what the probe decided.

use std::fmt;
use std::net::IpAddr;

/// Transport hint from the mount options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Stream transport
    Tcp,
    /// Datagram transport
    Udp,
    /// No hint, try both
    #[default]
    Unspecified,
}

impl Protocol {
    /// Parse a `proto=` mount option value
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "tcp" | "tcp6" | "rdma" | "rdma6" => Some(Protocol::Tcp),
            "udp" | "udp6" => Some(Protocol::Udp),
            _ => None,
        }
    }

    /// IP protocol number as used by the portmapper
    pub fn ipproto(&self) -> u32 {
        match self {
            Protocol::Udp => 17,
            Protocol::Tcp | Protocol::Unspecified => 6,
        }
    }

    /// Transports to try, in order
    pub fn candidates(&self) -> &'static [Protocol] {
        match self {
            Protocol::Tcp => &[Protocol::Tcp],
            Protocol::Udp => &[Protocol::Udp],
            Protocol::Unspecified => &[Protocol::Tcp, Protocol::Udp],
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
            Protocol::Unspecified => f.write_str("any"),
        }
    }
}

/// Liveness of a server identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Liveness {
    /// Not probed yet in this run
    #[default]
    Unchecked,
    /// Answered the probe
    Alive,
    /// Failed the probe
    Dead,
}

/// Everything the prober needs to check one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Normalized server identity (cache key)
    pub identity: String,

    /// Host name or address literal to resolve
    pub host: String,

    /// Address taken from the mount options, skips name resolution
    pub addr: Option<IpAddr>,

    /// Transport hint
    pub protocol: Protocol,

    /// NFS version hint (0 = unspecified)
    pub version: u32,

    /// Fixed server port from the mount options (skips the portmapper)
    pub port: Option<u16>,

    /// Local automount daemon to check instead of the network
    pub daemon_pid: Option<u32>,
}

impl ProbeTarget {
    /// Target for a remote host with no hints
    pub fn host(host: &str) -> Self {
        Self {
            identity: crate::nfs::cache::normalize_identity(host),
            host: host.to_string(),
            addr: None,
            protocol: Protocol::Unspecified,
            version: 0,
            port: None,
            daemon_pid: None,
        }
    }

    /// Target for a local automount daemon
    pub fn daemon(pid: u32) -> Self {
        Self {
            identity: format!("automount(pid {pid})"),
            host: String::new(),
            addr: None,
            protocol: Protocol::Unspecified,
            version: 0,
            port: None,
            daemon_pid: Some(pid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!(Protocol::parse("tcp"), Some(Protocol::Tcp));
        assert_eq!(Protocol::parse("UDP6"), Some(Protocol::Udp));
        assert_eq!(Protocol::parse("sctp"), None);
    }

    #[test]
    fn test_unspecified_tries_both() {
        assert_eq!(
            Protocol::Unspecified.candidates(),
            &[Protocol::Tcp, Protocol::Udp]
        );
        assert_eq!(Protocol::Udp.candidates(), &[Protocol::Udp]);
        assert_eq!(Protocol::Udp.ipproto(), 17);
    }

    #[test]
    fn test_target_identity_normalized() {
        let target = ProbeTarget::host("FileServer.Example.COM");
        assert_eq!(target.identity, "fileserver.example.com");
        assert_eq!(target.host, "FileServer.Example.COM");
    }
}
