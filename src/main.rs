//! statusd entry point.
//!
//! Loads configuration from TOML plus environment overrides, initializes
//! tracing, and runs the HTTP server in whichever transport mode the
//! configuration and application directory select.

use std::io::BufRead;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statusd::auth::credentials::hash_password;
use statusd::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use statusd::http::{run_http_server, setup_shutdown_handler, ServerHandle, Transport};

/// statusd: status page server
#[derive(Parser, Debug)]
#[command(name = "statusd", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "statusd=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default)
    Serve,
    /// Print the transport mode the server would start in
    Transport,
    /// Read a password from stdin and print its hash for [[auth.users]]
    HashPassword,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(Command::HashPassword) = args.command {
        let mut password = String::new();
        std::io::stdin().lock().read_line(&mut password)?;
        println!("{}", hash_password(password.trim_end_matches(['\r', '\n']))?);
        return Ok(());
    }

    let config = AppConfig::load(&args.config)?;

    // Priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        config = %args.config,
        host = %config.http.host,
        port = config.http.port,
        https_port = config.http.https_port,
        users = config.auth.users.len(),
        "Loaded configuration"
    );

    if let Some(Command::Transport) = args.command {
        println!("{:?}", Transport::resolve(&config).mode());
        return Ok(());
    }

    let handle = ServerHandle::new();
    setup_shutdown_handler(handle.clone());

    run_http_server(Arc::new(config), handle).await?;

    tracing::info!("Server stopped");
    Ok(())
}
