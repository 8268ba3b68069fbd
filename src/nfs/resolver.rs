//! Host name to address resolution for probes
//!
//! Address literals resolve to themselves without touching the resolver.
//! Names go through the system resolver, which has no timeout of its own,
//! so the lookup runs under the watchdog with the probe's remaining budget.

use crate::error::{ProbeError, ProbeResult};
use crate::watchdog::supervise;
use std::net::{IpAddr, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// Resolve `host` to its addresses, in resolver order, without duplicates
pub fn resolve_host(host: &str, limit: Duration) -> ProbeResult<Vec<IpAddr>> {
    let literal = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let name = host.to_string();
    let lookup = supervise("resolve", limit, move || {
        (name.as_str(), 0)
            .to_socket_addrs()
            .map(|addrs| addrs.map(|a| a.ip()).collect::<Vec<_>>())
    });

    let addrs = match lookup {
        Ok(Ok(addrs)) => dedup_in_order(addrs),
        Ok(Err(e)) => {
            debug!(host = %host, error = %e, "Name resolution failed");
            Vec::new()
        }
        Err(e) => {
            debug!(host = %host, error = %e, "Name resolution abandoned");
            Vec::new()
        }
    };

    if addrs.is_empty() {
        return Err(ProbeError::AddressResolution {
            host: host.to_string(),
        });
    }
    if addrs.len() > 1 {
        info!(host = %host, ips = ?addrs, "Host has {} addresses", addrs.len());
    }
    Ok(addrs)
}

fn dedup_in_order(addrs: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut unique = Vec::with_capacity(addrs.len());
    for addr in addrs {
        if !unique.contains(&addr) {
            unique.push(addr);
        }
    }
    unique
}
