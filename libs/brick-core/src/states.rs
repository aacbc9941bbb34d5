//! Brick lifecycle states and the task-report transition table

use serde::{Deserialize, Serialize};

/// Lifecycle state of a brick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrickStatus {
    /// Created, no compute resource provisioned yet
    NoState,

    /// Instance created, awaiting first configuration push
    Init,

    /// Configuration push accepted, agent is running it
    Deploying,

    /// Terminal success
    DeployDone,

    /// Terminal failure, operator-inspectable
    DeployFail,

    /// Awaiting a callback; excluded from reconciliation sweeps
    DeployWait,

    /// Unrecoverable error
    Error,
}

impl BrickStatus {
    /// All defined lifecycle states
    pub const ALL: [BrickStatus; 7] = [
        BrickStatus::NoState,
        BrickStatus::Init,
        BrickStatus::Deploying,
        BrickStatus::DeployDone,
        BrickStatus::DeployFail,
        BrickStatus::DeployWait,
        BrickStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrickStatus::NoState => "nostate",
            BrickStatus::Init => "initializing",
            BrickStatus::Deploying => "deploying",
            BrickStatus::DeployDone => "deploy complete",
            BrickStatus::DeployFail => "deploy failed",
            BrickStatus::DeployWait => "wait call-back",
            BrickStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for BrickStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an execution task as reported by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Complete,
    Error,
    /// No recognized status marker found yet; re-check later
    InsufficientData,
}

impl TaskStatus {
    /// Marker vocabulary written to the instance log
    pub const MARKERS: [TaskStatus; 4] = [
        TaskStatus::Complete,
        TaskStatus::Error,
        TaskStatus::Running,
        TaskStatus::InsufficientData,
    ];

    pub fn as_marker(&self) -> &'static str {
        match self {
            TaskStatus::Running => "TASK-RUNNING",
            TaskStatus::Complete => "TASK-COMPLETE",
            TaskStatus::Error => "TASK-ERROR",
            TaskStatus::InsufficientData => "INSUFFICIENT-DATA",
        }
    }

    pub fn from_marker(line: &str) -> Option<TaskStatus> {
        Self::MARKERS
            .iter()
            .copied()
            .find(|s| s.as_marker() == line.trim())
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_marker())
    }
}

/// Map (current brick status, reported task status) to the next brick
/// status. Returns None for combinations that must be logged and dropped.
pub fn next_status(current: BrickStatus, report: TaskStatus) -> Option<BrickStatus> {
    match (current, report) {
        (BrickStatus::Init, TaskStatus::Running) => Some(BrickStatus::Deploying),
        (BrickStatus::Init, TaskStatus::Error) => Some(BrickStatus::DeployFail),
        (BrickStatus::Deploying, TaskStatus::Complete) => Some(BrickStatus::DeployDone),
        (BrickStatus::Deploying, TaskStatus::Error) => Some(BrickStatus::DeployFail),
        _ => None,
    }
}
