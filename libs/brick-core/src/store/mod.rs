//! Persistent store contract
//!
//! The store is the single source of truth for bricks and brickconfigs.
//! Every mutation re-reads, updates and writes back; status transitions go
//! through [`Store::update_brick_guarded`], which refuses to write unless
//! the persisted status still matches the expected pre-state.

mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Brick, BrickConfig, ConfigFile, NewBrick, NewBrickConfig, NewConfigFile};
use crate::states::BrickStatus;

pub use memory::MemoryStore;

/// Store error taxonomy
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("brick {0} could not be found")]
    BrickNotFound(Uuid),

    #[error("brick with instance {0} could not be found")]
    InstanceNotFound(String),

    #[error("brickconfig {0} could not be found")]
    BrickConfigNotFound(Uuid),

    #[error("configfile {0} could not be found")]
    ConfigFileNotFound(Uuid),

    #[error("brickconfig {0} is still referenced by {1} brick(s)")]
    BrickConfigInUse(Uuid, usize),

    #[error("brick {id} status is {actual}, expected {expected}")]
    StaleState {
        id: Uuid,
        expected: BrickStatus,
        actual: BrickStatus,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Filters for brick listings; all fields are conjunctive
#[derive(Debug, Clone, Default)]
pub struct BrickFilter {
    pub tenant_id: Option<String>,
    pub status: Option<BrickStatus>,
    pub brickconfig_uuid: Option<Uuid>,
    pub instance_id: Option<String>,
}

impl BrickFilter {
    pub fn with_status(status: BrickStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Keyset pagination over a stable (created_at, id) sort
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    /// Maximum records to return; unlimited when None
    pub limit: Option<usize>,

    /// Resume after the record with this id
    pub marker: Option<Uuid>,
}

/// One page of results plus the continuation marker
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Pass back as `Pagination::marker` to fetch the next page; None when
    /// the listing is exhausted.
    pub next_marker: Option<Uuid>,
}

/// Partial update applied to a brick record
#[derive(Debug, Clone, Default)]
pub struct BrickUpdate {
    pub instance_id: Option<Option<String>>,
    pub status: Option<BrickStatus>,
    pub configuration: Option<BTreeMap<String, serde_json::Value>>,
    pub deploy_log: Option<String>,
    pub deployed_at: Option<Option<chrono::DateTime<chrono::Utc>>>,
}

impl BrickUpdate {
    pub fn status(status: BrickStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// CRUD contract the orchestration core consumes
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_brick(&self, new: NewBrick) -> Result<Brick, StoreError>;
    async fn get_brick(&self, id: Uuid) -> Result<Brick, StoreError>;
    async fn get_brick_by_instance(&self, instance_id: &str) -> Result<Brick, StoreError>;
    async fn list_bricks(
        &self,
        filter: &BrickFilter,
        page: &Pagination,
    ) -> Result<Page<Brick>, StoreError>;
    async fn update_brick(&self, id: Uuid, update: BrickUpdate) -> Result<Brick, StoreError>;

    /// Conditional read-modify-write: applies `update` only while the
    /// persisted status equals `expected`, otherwise fails with
    /// [`StoreError::StaleState`] and leaves the record unchanged.
    async fn update_brick_guarded(
        &self,
        id: Uuid,
        expected: BrickStatus,
        update: BrickUpdate,
    ) -> Result<Brick, StoreError>;

    async fn destroy_brick(&self, id: Uuid) -> Result<(), StoreError>;

    async fn create_brickconfig(&self, new: NewBrickConfig) -> Result<BrickConfig, StoreError>;
    async fn get_brickconfig(&self, id: Uuid) -> Result<BrickConfig, StoreError>;
    async fn list_brickconfigs(&self, page: &Pagination) -> Result<Page<BrickConfig>, StoreError>;

    /// Refuses with [`StoreError::BrickConfigInUse`] while any brick
    /// references the config.
    async fn destroy_brickconfig(&self, id: Uuid) -> Result<(), StoreError>;

    async fn create_configfile(&self, new: NewConfigFile) -> Result<ConfigFile, StoreError>;
    async fn list_configfiles(&self, brickconfig_uuid: Uuid) -> Result<Vec<ConfigFile>, StoreError>;
    async fn destroy_configfile(&self, id: Uuid) -> Result<(), StoreError>;
}
