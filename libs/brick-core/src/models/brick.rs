//! Brick entity model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::states::BrickStatus;

/// A deployed, configured application instance bound to one compute
/// resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brick {
    /// Stable external identity, immutable after creation
    pub id: Uuid,

    /// Template this brick was deployed from
    pub brickconfig_uuid: Uuid,

    /// Owning tenant
    pub tenant_id: String,

    /// Compute instance backing this brick; set after provisioning
    pub instance_id: Option<String>,

    /// Lifecycle state
    pub status: BrickStatus,

    /// Free-form deploy configuration: flavour, network, keypair,
    /// floating_ip, env vars, current_version
    pub configuration: BTreeMap<String, serde_json::Value>,

    /// Accumulated deploy log text
    pub deploy_log: String,

    /// When the deploy reached a terminal success
    pub deployed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Brick {
    /// String-valued configuration entry, if present
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).and_then(|v| v.as_str())
    }
}

/// Fields required to create a brick
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBrick {
    pub brickconfig_uuid: Uuid,
    pub tenant_id: String,

    #[serde(default)]
    pub instance_id: Option<String>,

    #[serde(default)]
    pub configuration: BTreeMap<String, serde_json::Value>,
}
