//! Main entry point for the Scrim Room lobby service
//!
//! Loads configuration, starts the health endpoints and the chosen command
//! gateway, and shuts down gracefully on SIGINT or SIGTERM.

use anyhow::Result;
use clap::Parser;
use scrim_room::amqp::{ConsoleReplyPublisher, InboundCommand, MessageHandler};
use scrim_room::config::{validate_config, AppConfig};
use scrim_room::service::{AppState, Gateway, HealthCheck, HealthStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// Scrim Room - lobbies, balanced teams and seasonal ratings for in-house matches
#[derive(Parser)]
#[command(
    name = "scrim-room",
    version,
    about = "A lobby and team-balancing service for community in-house matches",
    long_about = "Scrim Room takes chat commands over AMQP, keeps one lobby per player, \
                 splits full lobbies into the fairest teams it can find and rates the \
                 reported results with TrueSkill, one ladder per season and format."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// AMQP URL override
    #[arg(long, value_name = "URL", help = "Override AMQP connection URL")]
    amqp_url: Option<String>,

    /// Health port override
    #[arg(long, value_name = "PORT", help = "Override health and metrics port")]
    health_port: Option<u16>,

    /// Read commands from stdin instead of the broker
    #[arg(
        long,
        help = "Read '<user_id> <message>' lines from stdin instead of consuming from AMQP"
    )]
    console: bool,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Build the service without a gateway and report its health
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = Arc::new(AppState::new(config).await?);
    app_state.start(Gateway::Console).await?;

    let health = HealthCheck::check(app_state.clone()).await;
    if let Err(e) = app_state.shutdown().await {
        warn!("Shutdown after health check failed: {}", e);
    }

    match health {
        Ok(health) => {
            println!("Health Check: {}", health.status);
            println!("  Formats: {}", health.stats.formats);
            println!("  Open lobbies: {}", health.stats.open_lobbies);
            println!("  Open matches: {}", health.stats.open_matches);
            for check in &health.checks {
                println!("  {}: {}", check.name, check.status);
            }

            if health.status == HealthStatus::Healthy {
                std::process::exit(0);
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Feed stdin lines of the form `<user_id> <message>` through the dispatcher
async fn run_console(app_state: Arc<AppState>) {
    let handler: Arc<dyn MessageHandler> =
        app_state.command_handler(Arc::new(ConsoleReplyPublisher));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console input closed");
                return;
            }
            Err(e) => {
                error!("Failed to read console input: {}", e);
                return;
            }
        };

        let Some((user_id, content)) = line.trim().split_once(' ') else {
            if !line.trim().is_empty() {
                println!("usage: <user_id> <message>");
            }
            continue;
        };

        let command = InboundCommand {
            user_id: user_id.to_string(),
            user_name: user_id.to_string(),
            channel_id: "console".to_string(),
            content: content.trim().to_string(),
        };

        if let Err(e) = handler.handle_command(command).await {
            warn!("Console command failed: {}", e);
        }
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig, gateway: Gateway) {
    info!("Scrim Room lobby service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    match gateway {
        Gateway::Amqp => info!(
            "   AMQP: {}:{}{} (queue {}, replies {})",
            config.amqp.host,
            config.amqp.port,
            config.amqp.vhost,
            config.amqp.command_queue,
            config.amqp.reply_exchange
        ),
        Gateway::Console => info!("   Gateway: console"),
    }
    info!("   Command prefix: {}", config.lobby.command_prefix);
    info!("   Season: {}", config.lobby.season);
    info!(
        "   Formats: {}",
        config
            .formats
            .iter()
            .map(|format| format.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
}

/// Load configuration from file or environment, then apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(amqp_url) = &args.amqp_url {
        config.amqp.apply_url(amqp_url)?;
    }

    if let Some(health_port) = args.health_port {
        config.service.health_port = health_port;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    let gateway = if args.console {
        Gateway::Console
    } else {
        Gateway::Amqp
    };

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config, gateway);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config, gateway);

    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone()).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start(gateway).await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Scrim Room is running, press Ctrl+C to shut down");

    match gateway {
        Gateway::Console => {
            tokio::select! {
                _ = run_console(app_state.clone()) => {},
                _ = wait_for_shutdown_signal() => {},
            }
        }
        Gateway::Amqp => wait_for_shutdown_signal().await,
    }

    info!("Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    info!("Scrim Room stopped");
    Ok(())
}
