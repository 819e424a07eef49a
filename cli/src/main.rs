//! Courtbook CLI server
//!
//! Headless booking service suitable for a systemd unit, a container or a
//! standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/courtbook/config.toml)
//! courtbook-service
//!
//! # Custom config path and port
//! courtbook-service --config /etc/courtbook/config.toml --api-port 8081
//!
//! # Validate config without starting
//! courtbook-service --check
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use courtbook::config::{resolve_config_path, AppConfig};
use courtbook::infrastructure::database::redact_url;
use courtbook::server::{init_tracing, ServerHandle, ServerOptions};

#[derive(Parser, Debug)]
#[command(
    name = "courtbook-service",
    version,
    about = "Slot booking service with provider-confirmed payments",
    long_about = "Courtbook: REST API for slot availability, reservations and \
                  payment-provider webhooks.\n\n\
                  Default config: ~/.config/courtbook/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "COURTBOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Override the REST API listen port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(resolve_config_path);

    let (mut config, load_error) = match AppConfig::load(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    if let Some(port) = cli.api_port {
        config.server.api_port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_tracing(&config);

    if let Some(e) = load_error {
        error!("Failed to load config from {}: {}", config_path.display(), e);
        return ExitCode::FAILURE;
    }
    info!("Configuration loaded from {}", config_path.display());

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    if cli.check {
        println!("✅ Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   API address : {}", config.api_addr());
        println!("   Database    : {}", redact_url(&config.database.url));
        println!("   Provider    : {:?}", config.payment.provider);
        println!("   Log level   : {}", config.logging.level);
        return ExitCode::SUCCESS;
    }

    let handle = match ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
    })
    .await
    {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    handle.install_signal_handler();
    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    handle.wait().await;
    ExitCode::SUCCESS
}
