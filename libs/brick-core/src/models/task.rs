//! Ephemeral dispatch units exchanged between conductor and mortar

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::states::TaskStatus;

/// A unit of work sent from the conductor to an agent: push the rendered
/// configuration payload into a running instance. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTask {
    /// Target compute instance
    pub instance_id: String,

    /// Filename to rendered contents
    pub files: BTreeMap<String, String>,
}

/// Result of an execution task, reported by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub instance_id: String,
    pub status: TaskStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-instance liveness result from a health-check sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceHealth {
    pub instance_id: String,
    pub alive: bool,
}

/// Agent reply to a liveness sweep: instance health plus a host metrics
/// snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReport {
    pub host: String,
    pub instances: Vec<InstanceHealth>,

    /// Host CPU usage percentage (0-100)
    pub cpu_usage: f32,

    /// Host memory usage in bytes
    pub memory_used: u64,

    /// Total host memory in bytes
    pub memory_total: u64,

    /// Host uptime in seconds
    pub uptime_secs: u64,
}
