use std::sync::Arc;

use clap::Parser;
use remote::reach::{Pinger, Reply};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rxping",
    version,
    about = "Check which hosts answer over ssh, and how fast",
    long_about = "`rxping` runs one command on each host, one host at a time, and prints a line for
every host that answered: the host, the command's output and how long the exchange took. A host
that cannot be reached or does not let us in is left out.

Authentication must not be interactive (ssh runs in batch mode).

EXAMPLE:
    # Which of the transfer hosts are up?
    rxping -U rxtx -H prod-east prod-west"
)]
struct Args {
    // Connection
    /// SSH connection timeout, in seconds
    #[arg(short = 't', long, default_value = "10", value_name = "SECONDS", help_heading = "Connection")]
    timeout: u64,

    /// Time allowed on top of the connection timeout for authentication and the command, in seconds
    #[arg(short = 'T', long, default_value = "5", value_name = "SECONDS", help_heading = "Connection")]
    auth_timeout: u64,

    /// Remote user to log in as
    #[arg(short = 'U', long = "user", visible_alias = "username", default_value = "root", help_heading = "Connection")]
    user: String,

    /// Command to run on every host
    #[arg(short = 'C', long, default_value = "exit 0", help_heading = "Connection")]
    command: String,

    // Output
    /// Only print the host and the duration
    #[arg(short = 'H', long, help_heading = "Output")]
    hide: bool,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Output")]
    verbose: u8,

    /// Quiet mode, don't report errors on stderr
    #[arg(short = 'q', long = "quiet", help_heading = "Output")]
    quiet: bool,

    #[arg(long, default_value = "/usr/bin/ssh", hide = true)]
    ssh_bin: std::path::PathBuf,

    // ARGUMENTS
    /// Hosts to check, in order
    #[arg()]
    hosts: Vec<String>,
}

/// Report line for a host, `None` when it did not answer
fn render(host: &str, reply: &Reply, hide: bool) -> Option<String> {
    let Reply::Answered {
        stdout, elapsed, ..
    } = reply
    else {
        return None;
    };
    let seconds = elapsed.as_secs_f64();
    if hide {
        Some(format!("{host}\t{seconds:.3}s"))
    } else {
        Some(format!("{host}:\t{}\t{seconds:.3}s", stdout.trim()))
    }
}

async fn async_main(args: Args) -> i32 {
    if args.hosts.is_empty() {
        return 0;
    }
    eprintln!("rxping starting at {}", chrono::Local::now().format(TIME_FORMAT));
    let config = remote::TransportConfig {
        ssh_bin: args.ssh_bin.clone(),
        connect_timeout: Some(args.timeout),
        ..Default::default()
    };
    let deadline =
        std::time::Duration::from_secs(args.timeout.saturating_add(args.auth_timeout));
    let pinger = Pinger::new(Arc::new(config), &args.user, &args.command, deadline);
    let work = async {
        for host in &args.hosts {
            let reply = pinger.ping(host).await;
            tracing::info!("{host}: {reply:?}");
            if let Some(line) = render(host, &reply, args.hide) {
                println!("{line}");
            }
        }
    };
    tokio::select! {
        () = work => {}
        // a failure to install the handler disables this branch
        Ok(()) = tokio::signal::ctrl_c() => {
            eprintln!();
            tracing::error!("rxping: Process cancelled!");
            return 1;
        }
    }
    eprintln!("rxping ending at {}", chrono::Local::now().format(TIME_FORMAT));
    0
}

fn main() {
    let args = Args::parse();
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
    };
    let code = match common::run(output, common::RuntimeConfig::default(), None, || {
        async_main(args)
    }) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("rxping: {:#}", error);
            1
        }
    };
    std::process::exit(code);
}
