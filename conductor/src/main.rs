//! Bricks Conductor - Entry Point
//!
//! Orchestrates brick deployments: provisions compute resources, relays
//! execution tasks to mortar agents and reconciles state on periodic
//! sweeps.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use tracing::{error, info, warn};

use brick_core::dispatch::{LocalTransport, MqttAddress, MqttTransport, Transport};
use brick_core::logs::{init_logging, LogOptions};
use brick_core::store::MemoryStore;

use conductor::app::options::AppOptions;
use conductor::app::run::run;
use conductor::infra::HttpInfrastructure;
use conductor::notify::LogNotifier;
use conductor::settings::{Settings, TransportKind};

const DEFAULT_SETTINGS_PATH: &str = "/etc/bricks/conductor.json";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    let version = env!("CARGO_PKG_VERSION").to_string();
    if cli_args.contains_key("version") {
        println!("bricks-conductor {}", version);
        return;
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = match tokio::fs::read_to_string(&settings_path).await {
        Ok(raw) => match serde_json::from_str::<Settings>(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to parse settings file {}: {}", settings_path, e);
                return;
            }
        },
        Err(_) => Settings::default(),
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        ..Default::default()
    };
    if let Err(e) = init_logging(&log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Collaborators. The store is in-memory in the single-process
    // deployment; a relational backend slots in behind the same trait.
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(LogNotifier);
    let infra = match HttpInfrastructure::new(&settings.compute.base_url) {
        Ok(infra) => Arc::new(infra),
        Err(e) => {
            error!("Failed to build compute client: {e}");
            return;
        }
    };

    let transport: Arc<dyn Transport> = match settings.transport.kind {
        TransportKind::Local => {
            warn!("Using in-process transport; mortar must run in this process");
            Arc::new(LocalTransport::new())
        }
        TransportKind::Mqtt => {
            let address = MqttAddress {
                host: settings.transport.mqtt.host.clone(),
                port: settings.transport.mqtt.port,
            };
            let client_id = format!("bricks-conductor-{}", settings.host);
            match MqttTransport::connect(&address, &client_id).await {
                Ok(transport) => Arc::new(transport),
                Err(e) => {
                    error!("Failed to connect MQTT transport: {e}");
                    return;
                }
            }
        }
    };

    let options = AppOptions::from_settings(&settings);
    info!("Running Bricks Conductor with options: {:?}", options);

    let result = run(
        version,
        options,
        store,
        infra,
        notifier,
        transport,
        await_shutdown_signal(),
    )
    .await;
    if let Err(e) = result {
        error!("Failed to run the conductor: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
