//! rcmd Client Binary
//!
//! Connects to an rcmd server, sends a burst of raw payloads (or commands
//! read from stdin) and terminates the session cleanly.

use std::io::BufRead;
use std::thread;

use bytes::Bytes;
use clap::Parser;
use rcmd::driver::{outbox, Outbound, OutboxSender};
use rcmd::protocol::Command;
use rcmd::session::ConnAttribute;
use rcmd::transport::TcpTransport;
use rcmd::{ClientDriver, Config, RcmdError};
use tracing_subscriber::{fmt, EnvFilter};

/// rcmd Client
#[derive(Parser, Debug)]
#[command(name = "rcmd-client")]
#[command(about = "Remote file-command client")]
#[command(version)]
struct Args {
    /// Server URI (tcp://host:port)
    #[arg(short, long)]
    server: String,

    /// Connection type: RO, RU or UU
    #[arg(short = 'c', long = "conn-type", default_value = "ro", value_parser = parse_attribute)]
    attribute: ConnAttribute,

    /// Use blocking sends
    #[arg(short, long)]
    blocking: bool,

    /// Number of raw payloads in the burst
    #[arg(short = 'n', long, default_value = "10")]
    iterations: usize,

    /// Connect timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Read commands from stdin instead of sending a burst
    #[arg(short, long)]
    interactive: bool,
}

fn parse_attribute(s: &str) -> Result<ConnAttribute, String> {
    s.parse().map_err(|e: RcmdError| e.to_string())
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

    tracing::info!("rcmd client v{}", rcmd::VERSION);

    let iterations = if args.interactive { 0 } else { args.iterations };
    let config = Config::builder()
        .server_uri(&args.server)
        .attribute(args.attribute)
        .blocking(args.blocking)
        .iterations(iterations)
        .connect_timeout_ms(args.timeout_ms)
        .build();

    let transport = TcpTransport::client().with_write_timeout(config.write_timeout());
    let mut client = ClientDriver::new(transport, config);

    if args.interactive {
        let (sender, rx) = outbox();
        client = client.with_outbox(rx);
        thread::spawn(move || read_commands(sender));
    }

    match client.run() {
        Ok(report) => {
            for reply in &report.replies {
                println!("{:?} -> {}", reply.kind, reply.status);
            }
            for echo in &report.echoes {
                println!("{}", String::from_utf8_lossy(echo));
            }
            println!(
                "sent {}, completed {}, received {}",
                report.counters.sends_issued,
                report.counters.sends_completed,
                report.counters.receives
            );
            if !report.completed() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("Client error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Feed stdin lines to the driver until EOF or `quit`
///
/// Dropping the sender on return lets the driver start draining.
fn read_commands(sender: OutboxSender) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("stdin: {}", e);
                break;
            }
        };

        match parse_line(line.trim()) {
            Ok(Some(item)) => {
                if sender.submit(item).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(msg) => eprintln!("{}", msg),
        }
    }
}

/// `Ok(None)` means quit
fn parse_line(line: &str) -> Result<Option<Outbound>, String> {
    let mut parts = line.splitn(4, char::is_whitespace);
    match parts.next() {
        Some("touch") => match parts.next() {
            Some(path) if !path.is_empty() => Ok(Some(Outbound::Command(Command::touch(path)))),
            _ => Err("usage: touch <path>".to_string()),
        },
        Some("write") => {
            let (Some(path), Some(offset)) = (parts.next(), parts.next()) else {
                return Err("usage: write <path> <offset> <text>".to_string());
            };
            let offset: u64 = offset
                .parse()
                .map_err(|_| format!("bad offset '{}'", offset))?;
            let text = parts.next().unwrap_or("").to_string();
            Ok(Some(Outbound::Command(Command::write(
                path,
                offset,
                Bytes::from(text),
            ))))
        }
        Some("raw") => {
            let text = line.strip_prefix("raw").unwrap_or("").trim_start();
            Ok(Some(Outbound::Raw(Bytes::copy_from_slice(text.as_bytes()))))
        }
        Some("quit") => Ok(None),
        Some("") | None => Err("empty line".to_string()),
        Some(other) => Err(format!("unknown command '{}'", other)),
    }
}
