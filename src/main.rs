use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tollgate::correlation::{DEFAULT_BLOCKED_CAPACITY, DEFAULT_DEDUP_CAPACITY};
use tollgate::service::{self, FilterConfig, ServerConfig};

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "DNS filter for netfilter queues", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Filter DNS packets delivered to a netfilter queue
    Filter(FilterArgs),
    /// Answer DNS queries from a static record table
    Serve(ServeArgs),
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Rules file path
    #[arg(short, long, default_value = "dns_rules.txt")]
    rules: PathBuf,

    /// Netfilter queue number
    #[arg(short, long, default_value = "5")]
    queue_num: u16,

    /// Recent requests remembered for deduplication
    #[arg(long, default_value_t = DEFAULT_DEDUP_CAPACITY)]
    dedup_capacity: usize,

    /// Blocked names remembered for response filtering
    #[arg(long, default_value_t = DEFAULT_BLOCKED_CAPACITY)]
    blocked_capacity: usize,

    /// Seconds between statistics log lines
    #[arg(long, default_value = "60")]
    stats_interval: u64,
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Local port to listen on
    #[arg(short, long, default_value = "53")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Records file (`<name> <ipv4>` per line)
    #[arg(short, long)]
    records: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    if let Err(e) = dispatch(cli.command) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn dispatch(command: Command) -> tollgate::Result<()> {
    match command {
        Command::Filter(args) => service::run_filter(FilterConfig {
            queue_num: args.queue_num,
            rules_path: args.rules,
            dedup_capacity: args.dedup_capacity,
            blocked_capacity: args.blocked_capacity,
            stats_interval: Duration::from_secs(args.stats_interval),
        }),
        Command::Serve(args) => {
            let config = ServerConfig {
                bind_addr: SocketAddr::new(args.bind, args.port),
                records_path: args.records,
            };

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            let local = tokio::task::LocalSet::new();
            local.block_on(&rt, service::run_server(config))
        }
    }
}

fn setup_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = std::env::var("TOLLGATE_LOG").unwrap_or_else(|_| level.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}
