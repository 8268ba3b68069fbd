//! Configuration types for nfs-pathcheck
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Conversion into probe, walk and driver settings

use crate::driver::DriverOptions;
use crate::error::ConfigError;
use crate::nfs::prober::{ProbeConfig, DEFAULT_TIMEOUT_SECS};
use crate::walker::{WalkOptions, DEFAULT_MAX_SYMLINKS};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Largest accepted symlink budget
const MAX_SYMLINK_LIMIT: u32 = 1024;

/// Shortest accepted UDP retransmit interval
const MIN_RETRY_MS: u64 = 10;

/// Print the paths whose NFS servers are alive
#[derive(Parser, Debug, Clone)]
#[command(
    name = "nfs-pathcheck",
    version,
    about = "Filter a path list, dropping paths served by dead NFS servers",
    long_about = "Walks each path one component at a time. Before entering a network mount \
                  the server is probed (portmapper, then an NFS NULL call) with a bounded \
                  timeout; paths behind a dead server are dropped.",
    after_help = "EXAMPLES:\n    \
        nfs-pathcheck -s /usr/bin /nfs/tools/bin /bin\n    \
        PATH=$(nfs-pathcheck -s -u $(echo $PATH | tr : ' '))\n    \
        nfs-pathcheck -e -v -H /nfs/home/alice  # only report, print nothing"
)]
pub struct CliArgs {
    /// Paths to check
    #[arg(value_name = "PATHS")]
    pub paths: Vec<String>,

    /// Silent: print no paths, always exit 0
    #[arg(short = 'e')]
    pub silent: bool,

    /// Separate output with ':' instead of a space
    #[arg(short = 's')]
    pub shell_separator: bool,

    /// Probe timeout in seconds
    #[arg(short = 't', default_value_t = DEFAULT_TIMEOUT_SECS, value_name = "SECS")]
    pub timeout: u64,

    /// Verbose: report skipped paths and probed hosts
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Debug output (implies -v)
    #[arg(short = 'D')]
    pub debug: bool,

    /// Print symlink-expanded paths
    #[arg(short = 'L')]
    pub canonical: bool,

    /// Accept a non-directory as the last component
    #[arg(short = 'f')]
    pub accept_any_type: bool,

    /// Drop paths whose expanded form was already printed
    #[arg(short = 'u')]
    pub unique: bool,

    /// Do not report missing path components
    #[arg(short = 'q')]
    pub quiet_missing: bool,

    /// Report the host consulted for each path
    #[arg(short = 'H')]
    pub show_hosts: bool,

    /// Read mounts from this fstab-format file
    #[arg(long, value_name = "FILE")]
    pub mount_table: Option<PathBuf>,

    /// Longest symbolic link chain followed
    #[arg(long, default_value_t = DEFAULT_MAX_SYMLINKS, value_name = "NUM")]
    pub max_symlinks: u32,

    /// UDP retransmit interval in milliseconds
    #[arg(long, default_value = "2000", value_name = "MS")]
    pub rpc_retry_ms: u64,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Paths to check, in order
    pub paths: Vec<String>,

    /// Print nothing on stdout
    pub silent: bool,

    /// ':' separated output
    pub shell_separator: bool,

    /// Probe timeout
    pub timeout: Duration,

    /// UDP retransmit interval
    pub retry_interval: Duration,

    /// Verbose logging
    pub verbose: bool,

    /// Debug logging
    pub debug: bool,

    /// Print canonical paths
    pub canonical: bool,

    /// Accept a non-directory terminal
    pub accept_any_type: bool,

    /// De-duplicate by canonical path
    pub unique: bool,

    /// Missing components logged at debug
    pub quiet_missing: bool,

    /// Print hosts consulted
    pub show_hosts: bool,

    /// Mount table override
    pub mount_table: Option<PathBuf>,

    /// Symlink budget
    pub max_symlinks: u32,
}

impl CheckConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.paths.is_empty() && !args.silent {
            return Err(ConfigError::NoPaths);
        }

        if args.timeout == 0 {
            return Err(ConfigError::InvalidTimeout { secs: args.timeout });
        }

        if args.max_symlinks == 0 || args.max_symlinks > MAX_SYMLINK_LIMIT {
            return Err(ConfigError::InvalidSymlinkLimit {
                limit: args.max_symlinks,
                max: MAX_SYMLINK_LIMIT,
            });
        }

        Ok(Self {
            paths: args.paths,
            silent: args.silent,
            shell_separator: args.shell_separator,
            timeout: Duration::from_secs(args.timeout),
            retry_interval: Duration::from_millis(args.rpc_retry_ms.max(MIN_RETRY_MS)),
            verbose: args.verbose || args.debug,
            debug: args.debug,
            canonical: args.canonical,
            accept_any_type: args.accept_any_type,
            unique: args.unique,
            quiet_missing: args.quiet_missing,
            show_hosts: args.show_hosts,
            mount_table: args.mount_table,
            max_symlinks: args.max_symlinks,
        })
    }

    /// Output separator
    pub fn separator(&self) -> char {
        if self.shell_separator {
            ':'
        } else {
            ' '
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig::new(self.timeout).retry_interval(self.retry_interval)
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            canonical: self.canonical,
            unique: self.unique,
            quiet_missing: self.quiet_missing,
            walk: WalkOptions {
                max_symlinks: self.max_symlinks,
                accept_any_type: self.accept_any_type,
                ..WalkOptions::with_timeout(self.timeout)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::{WALK_TIMEOUT_STEPS, WATCHDOG_SLACK};

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("nfs-pathcheck").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = CheckConfig::from_args(parse(&["/bin"])).unwrap();
        assert_eq!(config.paths, vec!["/bin"]);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.retry_interval, Duration::from_secs(2));
        assert_eq!(config.max_symlinks, DEFAULT_MAX_SYMLINKS);
        assert_eq!(config.separator(), ' ');
        assert!(!config.verbose);
    }

    #[test]
    fn test_flags() {
        let config =
            CheckConfig::from_args(parse(&["-s", "-L", "-u", "-q", "-f", "-D", "-t", "3", "a", "b"]))
                .unwrap();
        assert_eq!(config.separator(), ':');
        assert!(config.verbose && config.debug);
        assert_eq!(config.paths, vec!["a", "b"]);

        let options = config.driver_options();
        assert!(options.canonical && options.unique && options.quiet_missing);
        assert!(options.walk.accept_any_type);
        assert_eq!(options.walk.step_timeout, Duration::from_secs(3) + WATCHDOG_SLACK);
        assert_eq!(
            options.walk.walk_timeout,
            (Duration::from_secs(3) + WATCHDOG_SLACK) * WALK_TIMEOUT_STEPS
        );
        assert_eq!(config.probe_config().timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_no_paths() {
        assert!(matches!(
            CheckConfig::from_args(parse(&[])),
            Err(ConfigError::NoPaths)
        ));
        assert!(CheckConfig::from_args(parse(&["-e"])).is_ok());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            CheckConfig::from_args(parse(&["-t", "0", "/bin"])),
            Err(ConfigError::InvalidTimeout { secs: 0 })
        ));
        assert!(matches!(
            CheckConfig::from_args(parse(&["--max-symlinks", "0", "/bin"])),
            Err(ConfigError::InvalidSymlinkLimit { limit: 0, .. })
        ));
    }
}
