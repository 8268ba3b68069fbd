//! Run-level orchestration
//!
//! The driver owns everything shared across paths (the lazily loaded mount
//! catalog, the liveness cache and the prober) and evaluates paths
//! strictly in input order. A failed path is dropped from the output; only
//! a mount table that cannot be loaded stops the run.

use crate::error::{CheckError, Result, WalkError};
use crate::mount::{LazyCatalog, MountSource};
use crate::nfs::{HostLivenessCache, Prober};
use crate::walker::{HostCheck, PathWalker, WalkOptions};
use std::collections::HashSet;
use std::env;
use tracing::{debug, info, warn};

/// Outcome for one input path
#[derive(Debug, Clone)]
pub enum PathStatus {
    /// Safe to use
    Usable,
    /// Dropped, with the reason
    Skipped(WalkError),
    /// Same canonical path as an earlier survivor (unique mode)
    Duplicate,
}

/// Per-path result
#[derive(Debug, Clone)]
pub struct Verdict {
    /// Path as given
    pub path: String,

    /// Canonical path, when the walk got that far
    pub resolved: Option<String>,

    pub status: PathStatus,

    /// Hosts consulted on the way
    pub hosts: Vec<HostCheck>,
}

impl Verdict {
    pub fn is_usable(&self) -> bool {
        matches!(self.status, PathStatus::Usable)
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// One verdict per input path, in input order
    pub verdicts: Vec<Verdict>,

    /// Surviving paths as they should be printed, in input order
    pub survivors: Vec<String>,
}

impl Report {
    /// Join survivors with `separator`; None when nothing survived
    pub fn render(&self, separator: char) -> Option<String> {
        if self.survivors.is_empty() {
            return None;
        }
        let mut sep = [0u8; 4];
        Some(self.survivors.join(separator.encode_utf8(&mut sep)))
    }

    pub fn any_survived(&self) -> bool {
        !self.survivors.is_empty()
    }
}

/// Run settings
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Emit canonical paths instead of the originals
    pub canonical: bool,

    /// Drop paths whose canonical form was already emitted
    pub unique: bool,

    /// Log missing components at debug instead of warn
    pub quiet_missing: bool,

    pub walk: WalkOptions,
}

/// Evaluates input paths against the mount catalog and liveness cache
pub struct Driver<P: Prober> {
    catalog: LazyCatalog,
    cache: HostLivenessCache,
    prober: P,
    options: DriverOptions,
    working_dir: Option<String>,
}

impl<P: Prober> Driver<P> {
    pub fn new(source: Box<dyn MountSource>, prober: P, options: DriverOptions) -> Self {
        Self {
            catalog: LazyCatalog::new(source),
            cache: HostLivenessCache::new(),
            prober,
            options,
            working_dir: None,
        }
    }

    /// Resolve relative paths from `dir` instead of the process directory
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Liveness cache shared by every path of this driver
    pub fn cache(&self) -> &HostLivenessCache {
        &self.cache
    }

    /// Evaluate `paths` in order
    ///
    /// Path-local failures land in the report; a fatal error (mount table
    /// unreadable) aborts the run.
    pub fn run<S: AsRef<str>>(&mut self, paths: &[S]) -> Result<Report> {
        let cwd = self.current_dir();
        let mut seen = HashSet::new();
        let mut report = Report::default();

        for path in paths {
            let path = path.as_ref();
            let mut verdict = self.check(path, &cwd)?;

            if verdict.is_usable() {
                let resolved = verdict.resolved.clone().unwrap_or_else(|| path.to_string());
                if self.options.unique && !seen.insert(resolved.clone()) {
                    debug!(path = %path, resolved = %resolved, "Duplicate path dropped");
                    verdict.status = PathStatus::Duplicate;
                } else {
                    report.survivors.push(if self.options.canonical {
                        resolved
                    } else {
                        path.to_string()
                    });
                }
            }
            report.verdicts.push(verdict);
        }

        info!(
            paths = paths.len(),
            survived = report.survivors.len(),
            probes = self.cache.probe_count(),
            "Run complete"
        );
        Ok(report)
    }

    /// Evaluate one path
    pub fn check(&mut self, path: &str, cwd: &std::result::Result<String, WalkError>) -> Result<Verdict> {
        // "./x", ".hidden" and friends are trusted as written
        if path.starts_with('.') {
            debug!(path = %path, "Relative dot path trusted");
            return Ok(Verdict {
                path: path.to_string(),
                resolved: Some(path.to_string()),
                status: PathStatus::Usable,
                hosts: Vec::new(),
            });
        }

        let mut walker = PathWalker::new(
            &self.catalog,
            &mut self.cache,
            &self.prober,
            &self.options.walk,
        );
        let outcome = match cwd {
            Ok(cwd) => walker.walk(path, cwd),
            Err(e) if !path.starts_with('/') => Err(CheckError::Walk(e.clone())),
            Err(_) => walker.walk(path, "/"),
        };
        let hosts = walker.into_hosts();

        let (resolved, status) = match outcome {
            Ok(resolved) => (Some(resolved), PathStatus::Usable),
            Err(CheckError::Walk(e)) => {
                if self.options.quiet_missing && e.is_missing_entry() {
                    debug!(path = %path, error = %e, "Path skipped");
                } else {
                    warn!(path = %path, error = %e, "Path skipped");
                }
                (None, PathStatus::Skipped(e))
            }
            Err(fatal) => return Err(fatal),
        };

        Ok(Verdict {
            path: path.to_string(),
            resolved,
            status,
            hosts,
        })
    }

    fn current_dir(&self) -> std::result::Result<String, WalkError> {
        if let Some(dir) = &self.working_dir {
            return Ok(dir.clone());
        }
        let dir = env::current_dir().map_err(|e| WalkError::BadWorkingDirectory(e.to_string()))?;
        dir.into_os_string()
            .into_string()
            .map_err(|d| WalkError::BadWorkingDirectory(d.to_string_lossy().into_owned()))
    }
}
