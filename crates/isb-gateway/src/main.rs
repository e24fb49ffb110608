//! irc-slack-bridge: main binary
//!
//! Listens for IRC clients and runs one bridge actor per connection.
//!
//! Usage:
//!   irc-slack-bridge                  - Listen on the configured port
//!   irc-slack-bridge --port 6667      - Listen on the given port
//!   irc-slack-bridge --config FILE    - Load settings from FILE
//!   irc-slack-bridge --help           - Show help

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use isb_core::Config;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Accept IRC clients
    Serve {
        port: Option<u16>,
        config: Option<PathBuf>,
    },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (port, config_path) = match parse_args(std::env::args().skip(1))? {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("irc-slack-bridge {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Serve { port, config } => (port, config),
    };

    // Load .env file
    dotenvy::dotenv().ok();

    let mut config = match &config_path {
        Some(path) => Config::from_toml_file(path),
        None => Config::load(),
    }
    .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    if let Some(port) = port {
        config.server.port = port;
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.server.log_level.parse()?))
        .init();

    run_server(config).await
}

/// Parse command line arguments
fn parse_args<I>(args: I) -> anyhow::Result<RunMode>
where
    I: IntoIterator<Item = String>,
{
    let mut port = None;
    let mut config = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--port" | "-p" => {
                let value = args.next().context("--port needs a value")?;
                port = Some(value.parse().with_context(|| format!("Bad port: {}", value))?);
            }
            "--config" | "-c" => {
                config = Some(PathBuf::from(args.next().context("--config needs a value")?));
            }
            other => anyhow::bail!("Unknown argument: {} (try --help)", other),
        }
    }

    Ok(RunMode::Serve { port, config })
}

/// Print help message
fn print_help() {
    println!("irc-slack-bridge - use Slack from an IRC client");
    println!();
    println!("Usage:");
    println!("  irc-slack-bridge                 Listen on the configured port");
    println!("  irc-slack-bridge --port <PORT>   Listen on PORT");
    println!("  irc-slack-bridge --config <FILE> Load settings from FILE");
    println!("  irc-slack-bridge --help          Show this help message");
    println!("  irc-slack-bridge --version       Show version");
    println!();
    println!("Once connected, log in with:  /msg root login <token>");
    println!();
    println!("Environment Variables:");
    println!("  ISB_LISTEN_ADDR              Listen address (default: 127.0.0.1)");
    println!("  ISB_PORT                     Listen port (default: 12345)");
    println!("  ISB_SERVER_NAME              Server name in replies (default: irc-slack-bridge)");
    println!("  ISB_LOG_LEVEL                Default log level (default: info)");
    println!("  SLACK_API_BASE_URL           Slack Web API base (default: https://slack.com/api)");
    println!("  SLACK_RETRIES                Retries per Slack call (default: 5)");
    println!("  SLACK_REQUEST_TIMEOUT_SECS   HTTP timeout (default: 30)");
    println!("  SLACK_MARK_COOLDOWN_SECS     Pause between read-marks (default: 5)");
    println!("  SLACK_RELAY_BOT_IDS          Comma separated bot ids whose attachments are shown");
}

/// Accept connections until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.listen_addr, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let settings = Arc::new(config);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Ready...");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "Accepted connection");
                    tokio::spawn(isb_bridge::serve(stream, Arc::clone(&settings)));
                }
                Err(e) => tracing::warn!("Accept failed: {}", e),
            },
            _ = &mut shutdown => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    Ok(())
}
