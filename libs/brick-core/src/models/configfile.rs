//! ConfigFile entity model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A templated file attached to a brickconfig, rendered per-brick at
/// deploy time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub id: Uuid,
    pub brickconfig_uuid: Uuid,

    /// Target filename inside the instance (eg. "Dockerfile")
    pub name: String,
    pub description: String,

    /// Template text
    pub contents: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a configfile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConfigFile {
    pub brickconfig_uuid: Uuid,
    pub name: String,

    #[serde(default)]
    pub description: String,
    pub contents: String,
}
