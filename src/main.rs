//! nfs-pathcheck - Filter search paths that lead to dead NFS servers
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use nfs_pathcheck::config::{CheckConfig, CliArgs};
use nfs_pathcheck::driver::{Driver, Report};
use nfs_pathcheck::mount::{MountSource, MountTableFile};
use nfs_pathcheck::nfs::RpcProber;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status for argument errors
const USAGE_EXIT: u8 = 2;

fn main() -> ExitCode {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version land here too
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(USAGE_EXIT)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    setup_logging(args.verbose || args.debug, args.debug);

    let config = match CheckConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Try 'nfs-pathcheck --help' for more information.");
            return ExitCode::from(USAGE_EXIT);
        }
    };

    match run(&config) {
        Ok(survived) if survived || config.silent => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Check every path; true if any survived
fn run(config: &CheckConfig) -> Result<bool> {
    let source: Box<dyn MountSource> = match &config.mount_table {
        Some(path) => Box::new(MountTableFile::new(path)),
        None => Box::new(MountTableFile::system()),
    };

    let mut driver = Driver::new(
        source,
        RpcProber::new(config.probe_config()),
        config.driver_options(),
    );
    let report = driver
        .run(config.paths.as_slice())
        .context("Cannot evaluate paths")?;
    debug!(probes = driver.cache().probe_count(), "Probes performed");

    if config.show_hosts {
        print_hosts(&report);
    }

    if !config.silent {
        write_survivors(&report, config.separator()).context("Cannot write output")?;
    }

    Ok(report.any_survived())
}

fn print_hosts(report: &Report) {
    for verdict in &report.verdicts {
        for check in &verdict.hosts {
            let state = if check.alive { "alive" } else { "dead" };
            eprintln!("{}: {} is {}", verdict.path, check.host, state);
        }
    }
}

fn write_survivors(report: &Report, separator: char) -> io::Result<()> {
    let Some(line) = report.render(separator) else {
        return Ok(());
    };
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    writeln!(out, "{line}")?;
    out.flush()
}

fn setup_logging(verbose: bool, debug: bool) {
    let default = if debug {
        "nfs_pathcheck=debug,warn"
    } else if verbose {
        "nfs_pathcheck=info,warn"
    } else {
        "nfs_pathcheck=error"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
