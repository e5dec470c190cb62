//! rcmd Server Binary
//!
//! Listens on TCP and executes Touch/Write commands beneath a root directory.

use clap::Parser;
use rcmd::executor::TouchMode;
use rcmd::transport::TcpTransport;
use rcmd::{CommandExecutor, Config, ServerDriver};
use tracing_subscriber::{fmt, EnvFilter};

/// rcmd Server
#[derive(Parser, Debug)]
#[command(name = "rcmd-server")]
#[command(about = "Remote file-command server")]
#[command(version)]
struct Args {
    /// Directory every command path is confined to
    #[arg(short, long, default_value = "./rcmd_root")]
    root: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    listen: String,

    /// Maximum concurrent sessions
    #[arg(short, long, default_value = "64")]
    max_sessions: usize,

    /// Touch truncates existing files instead of leaving them alone
    #[arg(long)]
    truncate: bool,

    /// Sync file data to disk after every write
    #[arg(long)]
    sync: bool,

    /// Exit after the first session closes
    #[arg(long)]
    once: bool,

    /// Reject every connect request
    #[arg(long)]
    reject: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rcmd=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("rcmd server v{}", rcmd::VERSION);
    tracing::info!("Root directory: {}", args.root);
    tracing::info!("Listen address: {}", args.listen);

    let touch_mode = if args.truncate {
        TouchMode::Truncate
    } else {
        TouchMode::Create
    };

    let config = Config::builder()
        .root_dir(&args.root)
        .listen_addr(&args.listen)
        .max_sessions(args.max_sessions)
        .touch_mode(touch_mode)
        .sync_writes(args.sync)
        .exit_after_session(args.once)
        .accept_connections(!args.reject)
        .build();

    let executor = match CommandExecutor::open(&config) {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!("Failed to open root: {}", e);
            std::process::exit(1);
        }
    };

    let transport =
        TcpTransport::new(config.listen_addr.clone()).with_write_timeout(config.write_timeout());
    let mut server = ServerDriver::new(transport, executor, config);

    if let Err(e) = server.listen() {
        tracing::error!("Failed to listen: {}", e);
        std::process::exit(1);
    }

    match server.run() {
        Ok(stats) => tracing::info!(
            "Server stopped ({} sessions closed, {} malformed, {} integrity faults)",
            stats.closed,
            stats.malformed,
            stats.integrity_faults
        ),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            std::process::exit(1);
        }
    }
}
