//! Settings file management

use serde::{Deserialize, Serialize};

use brick_core::logs::LogLevel;

/// Mortar agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// This host's name; also its dispatch topic suffix
    #[serde(default = "default_host")]
    pub host: String,

    /// Directory holding per-instance channel directories
    #[serde(default = "default_instances_path")]
    pub instances_path: String,

    /// Message transport configuration
    #[serde(default)]
    pub transport: TransportSettings,

    /// Worker pool capacity
    #[serde(default = "default_pool_size")]
    pub worker_pool_size: usize,

    /// Timeout for channel socket operations, in seconds
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u64,

    /// Timeout for synchronous dispatch calls, in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_host() -> String {
    "compute-1".to_string()
}

fn default_instances_path() -> String {
    "/var/lib/bricks/instances".to_string()
}

fn default_pool_size() -> usize {
    64
}

fn default_socket_timeout() -> u64 {
    10
}

fn default_call_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            host: default_host(),
            instances_path: default_instances_path(),
            transport: TransportSettings::default(),
            worker_pool_size: default_pool_size(),
            socket_timeout_secs: default_socket_timeout(),
            call_timeout_secs: default_call_timeout(),
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
