//! BrickConfig entity model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ordered, weighted environment-variable declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironEntry {
    pub name: String,
    pub value: String,

    /// Entries are applied in ascending weight order
    #[serde(default)]
    pub weight: i32,
}

/// A reusable application template referenced by many bricks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrickConfig {
    pub id: Uuid,
    pub name: String,
    pub version: String,

    /// Visible to all tenants when true, otherwise tenant-scoped
    pub is_public: bool,
    pub tenant_id: String,

    pub tag: String,
    pub description: String,
    pub logo: String,
    pub app_version: String,

    /// Ports the instance security group must allow
    pub ports: Vec<u16>,

    /// Environment declarations, ordered by weight
    pub environ: Vec<EnvironEntry>,

    /// Template for the deploy-complete notification
    pub email_template: String,

    /// Minimum instance memory requirement
    pub minimum_ram_mb: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BrickConfig {
    /// Environment entries in application order
    pub fn sorted_environ(&self) -> Vec<&EnvironEntry> {
        let mut entries: Vec<&EnvironEntry> = self.environ.iter().collect();
        entries.sort_by_key(|e| e.weight);
        entries
    }
}

/// Fields required to create a brickconfig
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBrickConfig {
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub is_public: bool,
    pub tenant_id: String,

    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub app_version: String,

    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub environ: Vec<EnvironEntry>,
    #[serde(default)]
    pub email_template: String,
    #[serde(default)]
    pub minimum_ram_mb: u32,
}
