//! Liveguard Daemon
//!
//! Feeds the hardware watchdog and runs the configured health-check
//! programs once per interval until SIGTERM or SIGINT.
//!
//! Usage:
//!   liveguard [--config <path>] [--verbose]
//!   liveguard [--config <path>] --gaps <secs>
//!
//! The daemon will:
//! 1. Open the watchdog device and heartbeat journal from the configuration
//! 2. Pulse the device and journal the tick every interval
//! 3. Run each test binary and log any failure it reports
//! 4. Disarm the device with the magic close on orderly shutdown

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::signal::unix::{signal, SignalKind};

use liveguard::config::{ConfigError, DEFAULT_CONFIG_PATH};
use liveguard::logging::LogLevel;
use liveguard::{describe_code, find_gaps, read_journal, DaemonConfig, LoggingSystem, WatchdogDaemon};

/// Command line arguments
struct Args {
    /// Configuration file
    config: PathBuf,
    /// Whether `--config` was given explicitly
    config_explicit: bool,
    /// Print heartbeat gaps longer than this many seconds and exit
    gaps: Option<u64>,
    /// Enable verbose logging
    verbose: bool,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut gaps = None;
        let mut verbose = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = Some(args.next().map(PathBuf::from).ok_or("--config needs a path")?);
                }
                "--gaps" | "-g" => {
                    let val = args.next().ok_or("--gaps needs a number of seconds")?;
                    gaps = Some(val.parse().map_err(|_| "Invalid gaps value")?);
                }
                "--verbose" | "-v" => {
                    verbose = true;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => {
                    return Err(format!("Unknown argument: {}", arg));
                }
            }
        }

        Ok(Self {
            config_explicit: config.is_some(),
            config: config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            gaps,
            verbose,
        })
    }
}

fn print_help() {
    println!(
        r#"Liveguard - Watchdog Daemon

USAGE:
    liveguard [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Configuration file (default: {})
    -g, --gaps <SECS>      Print heartbeat gaps longer than SECS and exit
    -v, --verbose          Enable verbose logging
    -h, --help             Print this help message

DESCRIPTION:
    Every interval the daemon writes to the hardware watchdog device,
    records the time in the heartbeat journal, then runs each configured
    test binary. A test binary passes by exiting 0; any other exit code
    or a fatal signal is logged as a failed health check.

    --gaps reads the heartbeat journal and lists every stretch where the
    daemon was silent for longer than SECS, typically across a reboot.
"#,
        DEFAULT_CONFIG_PATH
    );
}

/// Read the configuration; a missing default file means built-in defaults
fn load_config(args: &Args) -> anyhow::Result<(DaemonConfig, bool)> {
    match DaemonConfig::load(&args.config) {
        Ok(config) => Ok((config, true)),
        Err(ConfigError::NotFound(_)) if !args.config_explicit => Ok((DaemonConfig::default(), false)),
        Err(e) => Err(e).with_context(|| format!("loading {}", args.config.display())),
    }
}

fn print_gaps(config: &DaemonConfig, max_gap_secs: u64) -> anyhow::Result<()> {
    let Some(path) = config.heartbeat_file.as_deref() else {
        bail!("no heartbeat_file configured");
    };
    let stamps = read_journal(path).with_context(|| format!("reading {}", path.display()))?;

    println!("{} heartbeats in {}", stamps.len(), path.display());
    for gap in find_gaps(&stamps, max_gap_secs) {
        println!("{}", gap);
    }
    Ok(())
}

fn write_pidfile(path: &Path) -> anyhow::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
        .with_context(|| format!("writing pidfile {}", path.display()))
}

async fn run_daemon(mut daemon: WatchdogDaemon, interval: Duration) -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    loop {
        // Checks sleep and reap synchronously; signals are noticed between cycles
        match daemon.cycle() {
            Ok(report) if !report.is_healthy() => {
                tracing::warn!(
                    failed = report.failures().count(),
                    checks = report.verdicts.len(),
                    "Health checks reported failures"
                );
            }
            Ok(_) => tracing::debug!("Cycle complete"),
            Err(e) if e.is_reboot_worthy() => {
                let code = e.code();
                tracing::error!(code, "{} ({} = '{}')", e, code, describe_code(code));
            }
            Err(e) => tracing::error!("Cycle failed: {}", e),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("Terminated, shutting down");
                break;
            }
        }
    }

    daemon.shutdown();
    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    let (mut config, loaded) = load_config(&args)?;
    if args.verbose {
        config.logging = config.logging.with_level(LogLevel::Debug);
    }

    if let Some(max_gap_secs) = args.gaps {
        return print_gaps(&config, max_gap_secs);
    }

    let logging = LoggingSystem::init(config.logging.clone()).context("initializing logging")?;
    if !loaded {
        tracing::warn!(path = %args.config.display(), "No configuration file, using defaults");
    }

    tracing::info!(level = %logging.log_level(), "Starting Liveguard");
    tracing::info!("Interval: {}s", config.interval_secs);
    tracing::info!("Test binaries: {}", config.test_binaries.len());

    let daemon = WatchdogDaemon::from_config(&config).context("starting daemon")?;

    if let Some(pidfile) = &config.pidfile {
        write_pidfile(pidfile)?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;
    let result = runtime.block_on(run_daemon(daemon, config.tick_interval()));

    if let Some(pidfile) = &config.pidfile {
        if let Err(e) = std::fs::remove_file(pidfile) {
            tracing::warn!(path = %pidfile.display(), "Cannot remove pidfile: {}", e);
        }
    }

    result
}

fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
