//! Counter bridge - main entry point
//!
//! Loads configuration, wires the MQTT transport and REST store into the
//! bridge and runs until SIGINT or SIGTERM.

use counter_bridge::bridge::BridgeLifecycle;
use counter_bridge::config::BridgeConfig;
use counter_bridge::observability::{health::HealthServer, init_default_logging, metrics::metrics};
use counter_bridge::store::{RestStore, RestStoreConfig, Store};
use counter_bridge::transport::mqtt::MqttClient;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// MQTT ingestion bridge for industrial counter telemetry
#[derive(Parser)]
#[command(name = "counter-bridge")]
#[command(about = "Bridge counter telemetry from MQTT into a production store")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Print the resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting counter-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

/// Explicit path, then `bridge.toml` / `config/bridge.toml`, then the environment
fn load_configuration(config_path: Option<&Path>) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(BridgeConfig::load_from_file(path)?);
    }

    for candidate in ["bridge.toml", "config/bridge.toml"] {
        let path = Path::new(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(BridgeConfig::load_from_file(path)?);
        }
    }

    info!("No configuration file found, reading environment");
    Ok(BridgeConfig::from_env()?)
}

fn build_store(config: &BridgeConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    let store = RestStore::new(RestStoreConfig {
        base_url: config.store.url.clone(),
        table: config.store.table.clone(),
        api_key: config.get_store_api_key()?,
        timeout: config.store.insert_timeout(),
    })?;
    Ok(Arc::new(store))
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Bridge starting for device: {}", config.bridge.device_id);
    metrics().set_bridge_state("initializing");

    if let Some(health) = &config.health {
        let server = HealthServer::new(config.bridge.device_id.clone(), health.port);
        tokio::spawn(server.start());
    }

    let store = build_store(&config)?;
    let transport = MqttClient::new(&config.bridge.device_id, &config.mqtt)?;
    let mut bridge = BridgeLifecycle::new(config, transport, store);

    bridge.run_until(shutdown_signal()).await?;
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
