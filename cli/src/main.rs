//! OCPP Gateway — CLI Server
//!
//! Headless OCPP 1.6-J gateway suitable for deployment as a systemd
//! service, Docker container, or standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-gateway/config.toml)
//! ocpp-gateway
//!
//! # Custom config path
//! ocpp-gateway --config /etc/ocpp-gateway/config.toml
//!
//! # Override the port
//! ocpp-gateway --ws-port 9000
//!
//! # Validate config without starting
//! ocpp-gateway --check
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use ocpp_gateway::config::AppConfig;
use ocpp_gateway::server::{init_tracing, ServerHandle, ServerOptions};

/// OCPP 1.6-J gateway for EV charging stations.
#[derive(Parser, Debug)]
#[command(
    name = "ocpp-gateway",
    version,
    about = "OCPP 1.6-J WebSocket gateway for EV charging stations",
    long_about = "Accepts charge point WebSocket connections at ws://<host>:<port>/ws?id=<chargePointId> \
                  and answers BootNotification, Heartbeat and StatusNotification.\n\n\
                  Default config: ~/.config/ocpp-gateway/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the WebSocket listen port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = AppConfig::resolve_path(cli.config.clone());

    // ── Load configuration ─────────────────────────────────────
    let loaded = config_path.as_ref().map(|path| (path, AppConfig::load(path)));

    if cli.check {
        return check(config_path.as_deref(), loaded.map(|(_, result)| result), &cli);
    }

    let mut config = match loaded {
        Some((path, Ok(cfg))) => {
            init_tracing(&with_log_level(cfg.clone(), &cli));
            info!("Configuration loaded from {}", path.display());
            cfg
        }
        Some((path, Err(e))) if e.is_not_found() => {
            let cfg = AppConfig::default();
            init_tracing(&with_log_level(cfg.clone(), &cli));
            info!("No config file at {}, using default configuration.", path.display());
            cfg
        }
        Some((path, Err(e))) => {
            let cfg = AppConfig::default();
            init_tracing(&with_log_level(cfg.clone(), &cli));
            error!("Failed to load config from {}: {}", path.display(), e);
            error!("Using default configuration.");
            cfg
        }
        None => {
            let cfg = AppConfig::default();
            init_tracing(&with_log_level(cfg.clone(), &cli));
            info!("No config directory found, using default configuration.");
            cfg
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.ws_port {
        info!("CLI override: ws_port = {}", port);
        config.server.ws_port = port;
    }
    if let Some(ref level) = cli.log_level {
        info!("CLI override: log_level = {}", level);
        config.logging.level = level.clone();
    }

    // ── Start server ───────────────────────────────────────────
    let handle = match ServerHandle::start(ServerOptions::from(config)).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start gateway: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Install OS signal handlers (SIGTERM, SIGINT)
    handle.install_signal_handler();

    info!("Listening on ws://{}, press Ctrl+C to shutdown gracefully.", handle.ws_addr);

    // Wait for shutdown signal, then clean up
    handle.shutdown_signal().wait().await;
    handle.wait().await;

    ExitCode::SUCCESS
}

fn with_log_level(mut config: AppConfig, cli: &Cli) -> AppConfig {
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    config
}

/// `--check`: report the effective configuration or the load error.
fn check(
    path: Option<&std::path::Path>,
    loaded: Option<Result<AppConfig, ocpp_gateway::ConfigError>>,
    cli: &Cli,
) -> ExitCode {
    let mut config = match loaded {
        Some(Ok(cfg)) => cfg,
        Some(Err(e)) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
        None => AppConfig::default(),
    };
    if let Some(port) = cli.ws_port {
        config.server.ws_port = port;
    }
    config = with_log_level(config, cli);

    if let Err(e) = config.validate() {
        eprintln!("❌ {}", e);
        return ExitCode::FAILURE;
    }

    println!("✅ Configuration is valid");
    match path {
        Some(p) => println!("   Config file : {}", p.display()),
        None => println!("   Config file : (defaults)"),
    }
    println!(
        "   WS endpoint : ws://{}{}?{}=<id>",
        config.ws_addr(),
        config.server.ws_path,
        config.server.identity_param
    );
    println!("   Heartbeat   : {}s", config.ocpp.heartbeat_interval);
    println!("   Log level   : {}", config.logging.level);
    if config.metrics.enabled {
        println!("   Metrics     : http://{}/metrics", config.metrics.listen);
    }
    ExitCode::SUCCESS
}
