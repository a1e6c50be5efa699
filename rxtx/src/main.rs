use std::sync::Arc;

use clap::Parser;
use rxtx::Exit;
use rxtx::catalog::{Catalog, Selector};
use rxtx::scheduler::{Scheduler, State};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rxtx",
    version,
    about = "Periodically transmit and receive files over scp/sftp",
    long_about = "`rxtx` runs unattended against one connection of a catalog file. Every cycle it
pushes the files found below each transmit rule's source directory (moving them to the archive
directory once sent) and pulls the files found in each receive rule's remote directory (deleting
them remotely once received), then sleeps.

Transfers use the OpenSSH clients in batch mode, so authentication must not be interactive.

EXAMPLE:
    # Cycle every 30 seconds using connection 'prod' from /etc/rxtx.toml
    rxtx /etc/rxtx.toml --connection prod --wait 30 --seconds"
)]
struct Args {
    // Connection
    /// Connection to run: a numeric id or a name pattern (`%` any run, `_` any character)
    #[arg(short = 'C', long = "connection", visible_alias = "cx", value_name = "SELECTOR", help_heading = "Connection")]
    connection: Option<String>,

    /// Connection timeout passed to the transports, in seconds
    #[arg(long, value_name = "SECONDS", help_heading = "Connection")]
    connect_timeout: Option<u64>,

    // Scheduling
    /// Pause between cycles, in minutes (or seconds with --seconds)
    #[arg(short = 'w', long, default_value = "5", value_name = "N", help_heading = "Scheduling")]
    wait: u64,

    /// Interpret --wait as seconds
    #[arg(long, help_heading = "Scheduling")]
    seconds: bool,

    /// Run a single cycle and exit
    #[arg(long, help_heading = "Scheduling")]
    once: bool,

    // Logging
    /// Log file; defaults to ./rxtx.log, then ./rxtx.<connection name>.log once resolved
    #[arg(short = 'o', long, value_name = "PATH", conflicts_with = "no_log", help_heading = "Logging")]
    output: Option<std::path::PathBuf>,

    /// Do not write a log file
    #[arg(long = "no-log", visible_alias = "dont-log", help_heading = "Logging")]
    no_log: bool,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Logging")]
    verbose: u8,

    /// Quiet mode, don't report errors on stderr
    #[arg(short = 'q', long = "quiet", help_heading = "Logging")]
    quiet: bool,

    // Advanced settings
    /// Directory for temporary sftp batch files
    #[arg(long, env = "TMPDIR", default_value = "/tmp", value_name = "DIR", help_heading = "Advanced settings")]
    tmp: std::path::PathBuf,

    #[arg(long, default_value = "/usr/bin/scp", hide = true)]
    scp_bin: std::path::PathBuf,

    #[arg(long, default_value = "/usr/bin/sftp", hide = true)]
    sftp_bin: std::path::PathBuf,

    #[arg(long, default_value = "/usr/bin/ssh", hide = true)]
    ssh_bin: std::path::PathBuf,

    /// Number of worker threads, 0 means number of cores
    #[arg(long, default_value = "0", value_name = "N", help_heading = "Advanced settings")]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(long, default_value = "0", value_name = "N", help_heading = "Advanced settings")]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Connection catalog (TOML)
    #[arg()]
    config: Option<std::path::PathBuf>,
}

impl Args {
    fn wait(&self) -> std::time::Duration {
        if self.seconds {
            std::time::Duration::from_secs(self.wait)
        } else {
            std::time::Duration::from_secs(self.wait.saturating_mul(60))
        }
    }
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::error!("Failed to listen for SIGTERM: {}", error);
                    return;
                }
            };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    tracing::error!("Failed to listen for Ctrl+C: {}", error);
                    return;
                }
            }
            _ = terminate.recv() => {}
        }
        tracing::info!("Shutdown requested, finishing the current transfer");
        cancel.cancel();
    });
}

#[instrument(skip(log_file))]
async fn async_main(args: Args, log_file: Option<common::logging::LogFile>) -> Exit {
    let wait = args.wait();
    tracing::info!(
        "rxtx {} starting, waiting {} between cycles",
        env!("CARGO_PKG_VERSION"),
        humantime::format_duration(wait)
    );
    let Some(config_path) = args.config.as_ref() else {
        tracing::error!("rxtx: No configuration file given");
        return Exit::NoConfigSource;
    };
    tracing::info!("Configuration file: {:?}", config_path);
    let Some(selector) = args.connection.as_deref().map(Selector::parse) else {
        tracing::error!("rxtx: No connection given, use --connection");
        return Exit::NoSelector;
    };
    let is_file = tokio::fs::metadata(config_path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false);
    if !is_file {
        tracing::error!("rxtx: Configuration file {:?} not found", config_path);
        return Exit::ConfigNotFound;
    }
    let config = match Catalog::load(config_path)
        .await
        .and_then(|catalog| catalog.resolve(&selector))
    {
        Ok(config) => Arc::new(config),
        Err(error) => {
            tracing::error!("rxtx: {}", error);
            return Exit::ConfigUnresolvable;
        }
    };
    if let (Some(log_file), None) = (&log_file, &args.output) {
        let path = rxtx::connection_log_path(std::path::Path::new("."), &config.target.name);
        if let Err(error) = log_file.open(&path) {
            tracing::error!("{:#}", error);
        }
    }
    tracing::info!(
        "Connection {}: {} transmit rule(s), {} receive rule(s)",
        config.target,
        config.transmit_rules.len(),
        config.receive_rules.len()
    );
    if config.is_empty() {
        tracing::info!("Connection {} has no rules, cycles will be idle", config.target);
    }
    let transports = remote::Transports::new(remote::TransportConfig {
        scp_bin: args.scp_bin.clone(),
        sftp_bin: args.sftp_bin.clone(),
        ssh_bin: args.ssh_bin.clone(),
        scratch_dir: args.tmp.clone(),
        connect_timeout: args.connect_timeout,
    });
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    let mut scheduler = Scheduler::new(config, transports, wait, cancel);
    let state = if args.once {
        scheduler.run_once().await
    } else {
        scheduler.run().await
    };
    match state {
        State::Terminated => {
            tracing::error!("rxtx: Process cancelled!");
            Exit::Interrupted
        }
        State::Running => Exit::Completed,
    }
}

fn main() {
    let args = Args::parse();
    let log_file = if args.no_log {
        None
    } else {
        let log_file = common::logging::LogFile::new();
        let path = args
            .output
            .clone()
            .unwrap_or_else(|| std::path::PathBuf::from("rxtx.log"));
        if let Err(error) = log_file.open(&path) {
            eprintln!("rxtx: {:#}", error);
            std::process::exit(Exit::StartupFailed.code());
        }
        Some(log_file)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let func = {
        let log_file = log_file.clone();
        || async_main(args, log_file)
    };
    let exit = match common::run(output, runtime, log_file.as_ref(), func) {
        Ok(exit) => exit,
        Err(error) => {
            eprintln!("rxtx: {:#}", error);
            Exit::StartupFailed
        }
    };
    std::process::exit(exit.code());
}
