//! Settings file management

use serde::{Deserialize, Serialize};

use brick_core::logs::LogLevel;

/// Conductor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// This conductor's hostname; also its dispatch topic suffix
    #[serde(default = "default_host")]
    pub host: String,

    /// All active conductor hostnames, this one included. Work is
    /// partitioned across the set.
    #[serde(default)]
    pub conductors: Vec<String>,

    /// Message transport configuration
    #[serde(default)]
    pub transport: TransportSettings,

    /// Compute API configuration
    #[serde(default)]
    pub compute: ComputeSettings,

    /// Advertised API endpoint injected into instance metadata
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Image every brick instance boots from
    #[serde(default = "default_image")]
    pub default_image: String,

    /// Worker pool capacity
    #[serde(default = "default_pool_size")]
    pub worker_pool_size: usize,

    /// Timeout for synchronous dispatch calls, in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Enable the operational status server
    #[serde(default = "default_true")]
    pub enable_status_server: bool,

    /// Status server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Seconds between initialization sweeps
    #[serde(default = "default_init_interval")]
    pub init_sweep_interval_secs: u64,

    /// Seconds between deploying sweeps
    #[serde(default = "default_deploying_interval")]
    pub deploying_sweep_interval_secs: u64,

    /// Seconds between heartbeat sweeps
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds between orphan cleanup sweeps
    #[serde(default = "default_orphan_interval")]
    pub orphan_sweep_interval_secs: u64,

    /// Seconds between version sync sweeps
    #[serde(default = "default_version_interval")]
    pub version_sweep_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "conductor-1".to_string()
}

fn default_api_url() -> String {
    "http://localhost:8061".to_string()
}

fn default_image() -> String {
    "ubuntu-22.04".to_string()
}

fn default_pool_size() -> usize {
    64
}

fn default_call_timeout() -> u64 {
    30
}

fn default_init_interval() -> u64 {
    10
}

fn default_deploying_interval() -> u64 {
    15
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_orphan_interval() -> u64 {
    60
}

fn default_version_interval() -> u64 {
    300
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            host: default_host(),
            conductors: Vec::new(),
            transport: TransportSettings::default(),
            compute: ComputeSettings::default(),
            api_url: default_api_url(),
            default_image: default_image(),
            worker_pool_size: default_pool_size(),
            call_timeout_secs: default_call_timeout(),
            enable_status_server: true,
            server: ServerSettings::default(),
            init_sweep_interval_secs: default_init_interval(),
            deploying_sweep_interval_secs: default_deploying_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            orphan_sweep_interval_secs: default_orphan_interval(),
            version_sweep_interval_secs: default_version_interval(),
        }
    }
}

/// Which transport carries dispatch traffic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process channels; single-host deployments
    #[default]
    Local,

    /// MQTT broker; multi-host deployments
    Mqtt,
}

/// Transport settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default)]
    pub kind: TransportKind,

    /// MQTT broker configuration, used when kind is mqtt
    #[serde(default)]
    pub mqtt: MqttBrokerSettings,
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttBrokerSettings {
    /// Broker host
    #[serde(default)]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

fn default_mqtt_port() -> u16 {
    1883
}

impl Default for MqttBrokerSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mqtt_port(),
        }
    }
}

/// Compute API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeSettings {
    /// Base URL for the compute API
    #[serde(default = "default_compute_url")]
    pub base_url: String,
}

fn default_compute_url() -> String {
    "http://localhost:8774/v2".to_string()
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            base_url: default_compute_url(),
        }
    }
}

/// Status server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8061
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
