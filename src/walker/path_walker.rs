//! Component-by-component path resolution
//!
//! The walker builds the resolved prefix one component at a time. Before
//! any filesystem call touches a new prefix it asks the mount catalog
//! whether that exact directory is a network mount, and if so it refuses
//! to go further until the host has been confirmed alive. An untimed
//! `lstat` on a dead hard mount is exactly the hang this crate avoids.
//!
//! Filesystem calls that are still made (`lstat`, `readlink`, `access`)
//! run under the watchdog, so a mount that dies between the probe and
//! the call costs one step timeout instead of the whole run.
//!
//! Each walk also carries its own symlink budget and deadline. The
//! budget counts every dereference, not just nesting depth, and the
//! deadline is checked before each component.
//!
//! The working directory is a logical prefix owned by the walk. The
//! process working directory is never changed.

use crate::error::{CheckError, Result, WalkError, WalkResult};
use crate::mount::LazyCatalog;
use crate::nfs::net::Deadline;
use crate::nfs::{HostLivenessCache, Prober};
use crate::watchdog::{supervise, WatchdogError};
use std::ffi::CString;
use std::fs::{self, Metadata};
use std::io;
use std::time::Duration;
use tracing::{debug, trace};

/// Default symbolic link budget
pub const DEFAULT_MAX_SYMLINKS: u32 = 64;

/// Whole-walk deadline, in step timeouts
pub const WALK_TIMEOUT_STEPS: u32 = 8;

/// Largest number of components accepted in one path string
pub const MAX_COMPONENTS: usize = 256;

/// Added to the probe timeout to get the per-step watchdog limit
pub const WATCHDOG_SLACK: Duration = Duration::from_secs(1);

/// Walk settings
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Symbolic link dereferences allowed in one walk
    pub max_symlinks: u32,

    /// Accept a non-directory as the last resolved component
    pub accept_any_type: bool,

    /// Watchdog limit for a single filesystem call
    pub step_timeout: Duration,

    /// Limit for resolving one whole path
    pub walk_timeout: Duration,
}

impl WalkOptions {
    /// Options whose step and walk limits follow from the server timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let step_timeout = timeout + WATCHDOG_SLACK;
        Self {
            max_symlinks: DEFAULT_MAX_SYMLINKS,
            accept_any_type: false,
            step_timeout,
            walk_timeout: step_timeout * WALK_TIMEOUT_STEPS,
        }
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(crate::nfs::prober::DEFAULT_TIMEOUT_SECS))
    }
}

/// A host consulted while walking one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCheck {
    /// Server (or local daemon) identity
    pub host: String,

    /// Probe outcome (possibly cached)
    pub alive: bool,
}

/// Resolved prefix and limits of one walk
#[derive(Debug)]
struct WalkState {
    /// "/a/b" form; empty means the root
    prefix: String,

    /// A non-directory terminal was accepted; stop resolving
    terminal: bool,

    /// Dereferences still allowed
    links_left: u32,

    deadline: Deadline,
}

impl WalkState {
    fn new(links_left: u32, deadline: Deadline) -> Self {
        Self {
            prefix: String::new(),
            terminal: false,
            links_left,
            deadline,
        }
    }

    fn reset_root(&mut self) {
        self.prefix.clear();
    }

    fn push(&mut self, component: &str) {
        self.prefix.push('/');
        self.prefix.push_str(component);
    }

    fn pop(&mut self) {
        match self.prefix.rfind('/') {
            Some(idx) => self.prefix.truncate(idx),
            None => self.prefix.clear(),
        }
    }

    fn resolved(&self) -> String {
        if self.prefix.is_empty() {
            "/".to_string()
        } else {
            self.prefix.clone()
        }
    }
}

/// Walks one path at a time against a catalog and a liveness cache
pub struct PathWalker<'a, P: Prober> {
    catalog: &'a LazyCatalog,
    cache: &'a mut HostLivenessCache,
    prober: &'a P,
    options: &'a WalkOptions,
    hosts: Vec<HostCheck>,
}

impl<'a, P: Prober> PathWalker<'a, P> {
    pub fn new(
        catalog: &'a LazyCatalog,
        cache: &'a mut HostLivenessCache,
        prober: &'a P,
        options: &'a WalkOptions,
    ) -> Self {
        Self {
            catalog,
            cache,
            prober,
            options,
            hosts: Vec::new(),
        }
    }

    /// Resolve `path`, returning its canonical form
    ///
    /// Relative paths start from `cwd`, which must be absolute. Walk
    /// failures come back as `CheckError::Walk`; a mount table that
    /// cannot be loaded is the only other error.
    pub fn walk(&mut self, path: &str, cwd: &str) -> Result<String> {
        let mut state = WalkState::new(
            self.options.max_symlinks,
            Deadline::after(self.options.walk_timeout),
        );
        if !path.starts_with('/') {
            if !cwd.starts_with('/') {
                return Err(WalkError::BadWorkingDirectory(cwd.to_string()).into());
            }
            for component in cwd.split('/').filter(|c| !c.is_empty()) {
                state.push(component);
            }
        }

        debug!(path = %path, start = %state.resolved(), "Walking");
        self.walk_from(&mut state, path)?;
        Ok(state.resolved())
    }

    pub fn into_hosts(self) -> Vec<HostCheck> {
        self.hosts
    }

    fn walk_from(&mut self, state: &mut WalkState, path: &str) -> Result<()> {
        if path.starts_with('/') {
            state.reset_root();
        }

        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.len() > MAX_COMPONENTS {
            return Err(WalkError::TooManyComponents {
                path: path.to_string(),
                limit: MAX_COMPONENTS,
            }
            .into());
        }

        for component in components {
            if state.deadline.is_expired() {
                return Err(WalkError::WatchdogTimeout {
                    path: state.resolved(),
                    op: "walk",
                    limit: self.options.walk_timeout,
                }
                .into());
            }

            match component {
                "." => continue,
                ".." => {
                    state.pop();
                    let parent = state.resolved();
                    self.check_mount(&parent)?;
                    self.enter(&parent)?;
                }
                name => {
                    state.push(name);
                    let current = state.resolved();
                    self.check_mount(&current)?;

                    let meta = self.lstat(&current)?;
                    let file_type = meta.file_type();
                    if file_type.is_symlink() {
                        state.pop();
                        if state.links_left == 0 {
                            return Err(WalkError::SymlinkDepthExceeded { path: current }.into());
                        }
                        state.links_left -= 1;
                        let target = self.readlink(&current)?;
                        trace!(
                            link = %current,
                            target = %target,
                            left = state.links_left,
                            "Following symlink"
                        );
                        self.walk_from(state, &target)?;
                    } else if file_type.is_dir() {
                        self.enter(&current)?;
                    } else if self.options.accept_any_type {
                        debug!(path = %current, "Non-directory accepted as terminal");
                        state.terminal = true;
                    } else {
                        return Err(WalkError::NotADirectory { path: current }.into());
                    }
                }
            }

            if state.terminal {
                break;
            }
        }
        Ok(())
    }

    /// Refuse to go past `dir` if it is a network mount on a dead host
    fn check_mount(&mut self, dir: &str) -> Result<()> {
        let catalog = self.catalog.get()?;
        let Some(target) = catalog.lookup(dir).and_then(|r| r.probe_target()) else {
            return Ok(());
        };

        let prober = self.prober;
        let outcome = self.cache.resolve(&target.identity, || prober.probe(&target));
        let host = if target.host.is_empty() {
            target.identity.clone()
        } else {
            target.host.clone()
        };
        self.hosts.push(HostCheck {
            host: host.clone(),
            alive: outcome.is_ok(),
        });

        outcome.map_err(|source| {
            CheckError::Walk(WalkError::HostDead {
                path: dir.to_string(),
                host,
                source,
            })
        })
    }

    fn lstat(&self, path: &str) -> WalkResult<Metadata> {
        let owned = path.to_string();
        supervise("lstat", self.options.step_timeout, move || {
            fs::symlink_metadata(owned)
        })
        .map_err(|e| watchdog_error(path, "lstat", e))?
        .map_err(|e| WalkError::access(path, &e))
    }

    fn readlink(&self, path: &str) -> WalkResult<String> {
        let owned = path.to_string();
        let target = supervise("readlink", self.options.step_timeout, move || {
            fs::read_link(owned)
        })
        .map_err(|e| watchdog_error(path, "readlink", e))?
        .map_err(|e| WalkError::access(path, &e))?;

        target.into_os_string().into_string().map_err(|_| {
            WalkError::access(
                path,
                &io::Error::new(io::ErrorKind::InvalidData, "link target is not valid UTF-8"),
            )
        })
    }

    /// Check that `path` could become the working directory
    fn enter(&self, path: &str) -> WalkResult<()> {
        let owned = path.to_string();
        supervise("access", self.options.step_timeout, move || search_access(&owned))
            .map_err(|e| watchdog_error(path, "access", e))?
            .map_err(|e| WalkError::access(path, &e))
    }
}

/// `access(path, X_OK)`: may the directory be searched
fn search_access(path: &str) -> io::Result<()> {
    let c_path =
        CString::new(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    let rc = unsafe { libc::access(c_path.as_ptr(), libc::X_OK) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn watchdog_error(path: &str, op: &'static str, err: WatchdogError) -> WalkError {
    match err {
        WatchdogError::Expired(limit) => WalkError::WatchdogTimeout {
            path: path.to_string(),
            op,
            limit,
        },
        other => WalkError::access(path, &io::Error::new(io::ErrorKind::Other, other)),
    }
}
