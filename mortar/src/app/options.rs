//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use brick_core::dispatch::Topics;

use crate::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// This host's name
    pub host: String,

    /// Directory holding per-instance channel directories
    pub instances_path: PathBuf,

    /// Topic task reports are cast back to
    pub conductor_topic: String,

    /// Worker pool capacity
    pub pool_size: usize,

    /// Timeout for channel socket operations
    pub socket_timeout: Duration,

    /// Timeout for synchronous dispatch calls
    pub call_timeout: Duration,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            host: "compute-1".to_string(),
            instances_path: PathBuf::from("/var/lib/bricks/instances"),
            conductor_topic: Topics::conductor_shared(),
            pool_size: 64,
            socket_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

impl AppOptions {
    /// Map the settings file onto runtime options.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.host.clone(),
            instances_path: PathBuf::from(&settings.instances_path),
            conductor_topic: Topics::conductor_shared(),
            pool_size: settings.worker_pool_size,
            socket_timeout: Duration::from_secs(settings.socket_timeout_secs),
            call_timeout: Duration::from_secs(settings.call_timeout_secs),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
