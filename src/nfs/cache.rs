//! Per-host liveness memo
//!
//! Probe outcomes are keyed by the normalized server identity, not by mount
//! point, so every mount served by one host shares a single probe. Entries
//! are never invalidated during a run.

use crate::error::ProbeResult;
use crate::nfs::types::Liveness;
use std::collections::HashMap;
use tracing::debug;

/// Normalize a server identity for cache lookups
///
/// Strips address-literal brackets and a trailing root dot, lowercases.
pub fn normalize_identity(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Memoized probe outcomes for the lifetime of the run
#[derive(Debug, Default)]
pub struct HostLivenessCache {
    entries: HashMap<String, ProbeResult<()>>,
    probes: usize,
}

impl HostLivenessCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored outcome for `identity`, probing on first use
    ///
    /// `probe` runs at most once per identity; later callers observe the
    /// same outcome without any I/O.
    pub fn resolve<F>(&mut self, identity: &str, probe: F) -> ProbeResult<()>
    where
        F: FnOnce() -> ProbeResult<()>,
    {
        let key = normalize_identity(identity);
        if let Some(outcome) = self.entries.get(&key) {
            debug!(host = %key, alive = outcome.is_ok(), "Liveness cached");
            return outcome.clone();
        }

        let outcome = probe();
        self.probes += 1;
        self.entries.insert(key, outcome.clone());
        outcome
    }

    /// Current state of a host
    pub fn state(&self, identity: &str) -> Liveness {
        match self.entries.get(&normalize_identity(identity)) {
            None => Liveness::Unchecked,
            Some(Ok(())) => Liveness::Alive,
            Some(Err(_)) => Liveness::Dead,
        }
    }

    /// Number of probes actually performed
    pub fn probe_count(&self) -> usize {
        self.probes
    }
}
