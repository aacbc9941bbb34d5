//! Application configuration options

use std::time::Duration;

use brick_core::dispatch::Topics;

use crate::manager::actions::DeployParams;
use crate::settings::Settings;
use crate::workers::{deploying_sweep, heartbeat, init_sweep, orphan_sweep, version_sweep};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// This conductor's hostname
    pub host: String,

    /// Active conductor set for work partitioning
    pub conductors: Vec<String>,

    /// Topic execution tasks are dispatched to
    pub mortar_topic: String,

    /// Deploy-time constants
    pub deploy_params: DeployParams,

    /// Worker pool capacity
    pub pool_size: usize,

    /// Timeout for synchronous dispatch calls
    pub call_timeout: Duration,

    /// Enable the operational status server
    pub enable_status_server: bool,

    /// Status server configuration
    pub server: ServerOptions,

    /// Init sweep options
    pub init_sweep: init_sweep::Options,

    /// Deploying sweep options
    pub deploying_sweep: deploying_sweep::Options,

    /// Heartbeat sweep options
    pub heartbeat: heartbeat::Options,

    /// Orphan cleanup sweep options
    pub orphan_sweep: orphan_sweep::Options,

    /// Version sync sweep options
    pub version_sweep: version_sweep::Options,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            host: "conductor-1".to_string(),
            conductors: Vec::new(),
            mortar_topic: Topics::mortar_shared(),
            deploy_params: DeployParams {
                default_image: "ubuntu-22.04".to_string(),
                api_url: "http://localhost:8061".to_string(),
            },
            pool_size: 64,
            call_timeout: Duration::from_secs(30),
            enable_status_server: true,
            server: ServerOptions::default(),
            init_sweep: init_sweep::Options::default(),
            deploying_sweep: deploying_sweep::Options::default(),
            heartbeat: heartbeat::Options::default(),
            orphan_sweep: orphan_sweep::Options::default(),
            version_sweep: version_sweep::Options::default(),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

impl AppOptions {
    /// Map the settings file onto runtime options.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.host.clone(),
            conductors: settings.conductors.clone(),
            mortar_topic: Topics::mortar_shared(),
            deploy_params: DeployParams {
                default_image: settings.default_image.clone(),
                api_url: settings.api_url.clone(),
            },
            pool_size: settings.worker_pool_size,
            call_timeout: Duration::from_secs(settings.call_timeout_secs),
            enable_status_server: settings.enable_status_server,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            init_sweep: init_sweep::Options {
                interval: Duration::from_secs(settings.init_sweep_interval_secs),
            },
            deploying_sweep: deploying_sweep::Options {
                interval: Duration::from_secs(settings.deploying_sweep_interval_secs),
            },
            heartbeat: heartbeat::Options {
                interval: Duration::from_secs(settings.heartbeat_interval_secs),
            },
            orphan_sweep: orphan_sweep::Options {
                interval: Duration::from_secs(settings.orphan_sweep_interval_secs),
            },
            version_sweep: version_sweep::Options {
                interval: Duration::from_secs(settings.version_sweep_interval_secs),
            },
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Status server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8061,
        }
    }
}
