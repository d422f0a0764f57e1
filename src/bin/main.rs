//! Raven CLI - send test events and inspect DSNs and payloads
//!
//! Useful for checking that a DSN is valid and that the server accepts
//! events before wiring the client into an application.

use clap::{Parser, Subcommand};
use colored::Colorize;
use raven::{Client, ClientOptions, Dsn, ErrorReport, Event, Level};
use std::io::Read;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "raven")]
#[command(about = "Report errors and messages to a Sentry-compatible server")]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Target {
    /// DSN to report to
    #[arg(short, long, env = "SENTRY_DSN")]
    dsn: String,

    /// Client name sent as server_name
    #[arg(short, long, env = "SENTRY_NAME")]
    name: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a text message
    Message {
        #[command(flatten)]
        target: Target,

        /// Event level: fatal, error, warning, info, debug
        #[arg(short, long, default_value = "info")]
        level: Level,

        /// Message text
        text: String,
    },

    /// Send a sample error event
    Test {
        #[command(flatten)]
        target: Target,
    },

    /// Show the connection parameters of a DSN
    Dsn {
        /// DSN to parse
        #[arg(env = "SENTRY_DSN")]
        dsn: String,
    },

    /// Decode an encoded payload or UDP datagram
    Decode {
        /// Input file (or - for stdin)
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Output format: pretty or json
        #[arg(short, long, default_value = "pretty")]
        format: OutputFormat,
    },
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Message {
            target,
            level,
            text,
        } => {
            let client = build_client(target)?;
            send(&client, client.capture_message_at(text, level)).await?;
        }
        Commands::Test { target } => {
            let client = build_client(target)?;
            let report = ErrorReport::new(
                "TestError",
                "This is a test event sent by the raven CLI",
            );
            send(&client, client.capture_report(report, Level::Error)).await?;
        }
        Commands::Dsn { dsn } => {
            show_dsn(&dsn)?;
        }
        Commands::Decode { input, format } => {
            decode(&input, format)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "raven=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_client(target: Target) -> Result<Client, Box<dyn std::error::Error>> {
    let mut options = ClientOptions::new().dsn(target.dsn).warn_when_disabled(true);
    if let Some(name) = target.name {
        options = options.name(name);
    }
    if let Some(secs) = target.timeout {
        options = options.timeout(Duration::from_secs(secs));
    }
    Ok(Client::from_options(options)?)
}

async fn send(
    client: &Client,
    capture: Option<raven::Capture>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(capture) = capture else {
        return Err("client is disabled, nothing was sent".into());
    };
    let dsn = client.dsn().map(|d| d.host.as_str()).unwrap_or("unknown");

    match capture.join().await {
        Ok(captured) => {
            println!(
                "{} event {} sent to {}",
                "✓".green().bold(),
                Client::get_ident(&captured).cyan(),
                dsn
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "error".red(), e);
            Err(e.to_string().into())
        }
    }
}

fn show_dsn(dsn: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dsn = Dsn::parse(dsn)?;
    let port = match dsn.effective_port() {
        Some(port) if dsn.port == 0 => format!("{} (default)", port),
        Some(port) => port.to_string(),
        None => "none".to_string(),
    };
    let secret = if dsn.private_key.is_empty() {
        "(none)".to_string()
    } else {
        "*".repeat(dsn.private_key.len().min(8))
    };

    println!("{}", "━".repeat(60).dimmed());
    println!("{}", "DSN".green().bold());
    println!("{}", "━".repeat(60).dimmed());
    println!("  {} {}", "Protocol:".cyan(), dsn.protocol);
    println!("  {} {}", "Host:".cyan(), dsn.host);
    println!("  {} {}", "Port:".cyan(), port);
    println!("  {} {}", "Path:".cyan(), dsn.store_path());
    println!("  {} {}", "Project:".cyan(), dsn.project_id);
    println!("  {} {}", "Public key:".cyan(), dsn.public_key);
    println!("  {} {}", "Private key:".cyan(), secret);
    println!();

    Ok(())
}

fn decode(input: &str, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let raw = if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(input)?
    };

    // UDP datagrams carry the auth header before a blank line.
    let (auth, body) = match raw.windows(2).position(|w| w == b"\n\n") {
        Some(idx) => (
            Some(String::from_utf8_lossy(&raw[..idx]).into_owned()),
            &raw[idx + 2..],
        ),
        None => (None, &raw[..]),
    };

    match format {
        OutputFormat::Json => {
            let value: serde_json::Value = raven::decode_payload(body)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Pretty => {
            let event: Event = raven::decode_payload(body)?;
            print_pretty(&event, auth.as_deref());
        }
    }

    Ok(())
}

fn print_pretty(event: &Event, auth: Option<&str>) {
    println!("{}", "━".repeat(60).dimmed());
    println!(
        "{} {} {}",
        event.level.to_string().to_uppercase().red().bold(),
        event.event_id,
        event.timestamp.dimmed()
    );
    println!("{}", "━".repeat(60).dimmed());
    if let Some(auth) = auth {
        println!("{}: {}", "Auth".cyan(), auth);
    }
    println!("{}: {}", "Project".cyan(), event.project);
    println!("{}: {}", "Server".cyan(), event.server_name);
    println!("{}: {}", "Message".yellow().bold(), event.message);

    for (key, value) in &event.interfaces {
        println!();
        println!("{}:", key.yellow().bold());
        match serde_json::to_string_pretty(value) {
            Ok(json) => {
                for line in json.lines() {
                    println!("  {}", line.dimmed());
                }
            }
            Err(_) => println!("  {}", value),
        }
    }

    println!();
    println!("{}:", "Modules".cyan());
    for (name, version) in &event.modules {
        println!("  {} {}", name, version.dimmed());
    }
    println!();
}
