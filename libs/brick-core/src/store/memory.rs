//! In-memory store implementation
//!
//! Single-process default and the test double for the conductor manager
//! tests. Ordering is stable on (created_at, id) so pagination markers
//! stay valid across interleaved writes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{Brick, BrickConfig, ConfigFile, NewBrick, NewBrickConfig, NewConfigFile};
use crate::states::BrickStatus;

use super::{BrickFilter, BrickUpdate, Page, Pagination, Store, StoreError};

#[derive(Default)]
struct Inner {
    bricks: HashMap<Uuid, Brick>,
    brickconfigs: HashMap<Uuid, BrickConfig>,
    configfiles: HashMap<Uuid, ConfigFile>,
}

/// Mutexed-map store; every call locks, mutates, unlocks
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_update(brick: &mut Brick, update: BrickUpdate) {
    if let Some(instance_id) = update.instance_id {
        brick.instance_id = instance_id;
    }
    if let Some(status) = update.status {
        brick.status = status;
    }
    if let Some(configuration) = update.configuration {
        brick.configuration = configuration;
    }
    if let Some(deploy_log) = update.deploy_log {
        brick.deploy_log = deploy_log;
    }
    if let Some(deployed_at) = update.deployed_at {
        brick.deployed_at = deployed_at;
    }
    brick.updated_at = Utc::now();
}

fn paginate<T: Clone>(mut items: Vec<(chrono::DateTime<Utc>, Uuid, T)>, page: &Pagination) -> Page<T> {
    items.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let start = match page.marker {
        Some(marker) => items
            .iter()
            .position(|(_, id, _)| *id == marker)
            .map(|i| i + 1)
            .unwrap_or(items.len()),
        None => 0,
    };

    let rest = &items[start..];
    let limit = page.limit.unwrap_or(rest.len());
    let taken = &rest[..limit.min(rest.len())];

    let next_marker = if taken.len() < rest.len() {
        taken.last().map(|(_, id, _)| *id)
    } else {
        None
    };

    Page {
        items: taken.iter().map(|(_, _, item)| item.clone()).collect(),
        next_marker,
    }
}

fn matches(brick: &Brick, filter: &BrickFilter) -> bool {
    if let Some(ref tenant_id) = filter.tenant_id {
        if brick.tenant_id != *tenant_id {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if brick.status != status {
            return false;
        }
    }
    if let Some(brickconfig_uuid) = filter.brickconfig_uuid {
        if brick.brickconfig_uuid != brickconfig_uuid {
            return false;
        }
    }
    if let Some(ref instance_id) = filter.instance_id {
        if brick.instance_id.as_deref() != Some(instance_id.as_str()) {
            return false;
        }
    }
    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_brick(&self, new: NewBrick) -> Result<Brick, StoreError> {
        let now = Utc::now();
        let brick = Brick {
            id: Uuid::new_v4(),
            brickconfig_uuid: new.brickconfig_uuid,
            tenant_id: new.tenant_id,
            instance_id: new.instance_id,
            status: BrickStatus::NoState,
            configuration: new.configuration,
            deploy_log: String::new(),
            deployed_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.bricks.insert(brick.id, brick.clone());
        Ok(brick)
    }

    async fn get_brick(&self, id: Uuid) -> Result<Brick, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .bricks
            .get(&id)
            .cloned()
            .ok_or(StoreError::BrickNotFound(id))
    }

    async fn get_brick_by_instance(&self, instance_id: &str) -> Result<Brick, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .bricks
            .values()
            .find(|b| b.instance_id.as_deref() == Some(instance_id))
            .cloned()
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))
    }

    async fn list_bricks(
        &self,
        filter: &BrickFilter,
        page: &Pagination,
    ) -> Result<Page<Brick>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let items = inner
            .bricks
            .values()
            .filter(|b| matches(b, filter))
            .map(|b| (b.created_at, b.id, b.clone()))
            .collect();
        Ok(paginate(items, page))
    }

    async fn update_brick(&self, id: Uuid, update: BrickUpdate) -> Result<Brick, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let brick = inner
            .bricks
            .get_mut(&id)
            .ok_or(StoreError::BrickNotFound(id))?;
        apply_update(brick, update);
        Ok(brick.clone())
    }

    async fn update_brick_guarded(
        &self,
        id: Uuid,
        expected: BrickStatus,
        update: BrickUpdate,
    ) -> Result<Brick, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let brick = inner
            .bricks
            .get_mut(&id)
            .ok_or(StoreError::BrickNotFound(id))?;

        if brick.status != expected {
            return Err(StoreError::StaleState {
                id,
                expected,
                actual: brick.status,
            });
        }

        apply_update(brick, update);
        Ok(brick.clone())
    }

    async fn destroy_brick(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .bricks
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::BrickNotFound(id))
    }

    async fn create_brickconfig(&self, new: NewBrickConfig) -> Result<BrickConfig, StoreError> {
        let now = Utc::now();
        let config = BrickConfig {
            id: Uuid::new_v4(),
            name: new.name,
            version: new.version,
            is_public: new.is_public,
            tenant_id: new.tenant_id,
            tag: new.tag,
            description: new.description,
            logo: new.logo,
            app_version: new.app_version,
            ports: new.ports,
            environ: new.environ,
            email_template: new.email_template,
            minimum_ram_mb: new.minimum_ram_mb,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.brickconfigs.insert(config.id, config.clone());
        Ok(config)
    }

    async fn get_brickconfig(&self, id: Uuid) -> Result<BrickConfig, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .brickconfigs
            .get(&id)
            .cloned()
            .ok_or(StoreError::BrickConfigNotFound(id))
    }

    async fn list_brickconfigs(&self, page: &Pagination) -> Result<Page<BrickConfig>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let items = inner
            .brickconfigs
            .values()
            .map(|c| (c.created_at, c.id, c.clone()))
            .collect();
        Ok(paginate(items, page))
    }

    async fn destroy_brickconfig(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.brickconfigs.contains_key(&id) {
            return Err(StoreError::BrickConfigNotFound(id));
        }

        let references = inner
            .bricks
            .values()
            .filter(|b| b.brickconfig_uuid == id)
            .count();
        if references > 0 {
            return Err(StoreError::BrickConfigInUse(id, references));
        }

        inner.configfiles.retain(|_, f| f.brickconfig_uuid != id);
        inner.brickconfigs.remove(&id);
        Ok(())
    }

    async fn create_configfile(&self, new: NewConfigFile) -> Result<ConfigFile, StoreError> {
        let now = Utc::now();
        let file = ConfigFile {
            id: Uuid::new_v4(),
            brickconfig_uuid: new.brickconfig_uuid,
            name: new.name,
            description: new.description,
            contents: new.contents,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.configfiles.insert(file.id, file.clone());
        Ok(file)
    }

    async fn list_configfiles(&self, brickconfig_uuid: Uuid) -> Result<Vec<ConfigFile>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut files: Vec<ConfigFile> = inner
            .configfiles
            .values()
            .filter(|f| f.brickconfig_uuid == brickconfig_uuid)
            .cloned()
            .collect();
        files.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(files)
    }

    async fn destroy_configfile(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .configfiles
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::ConfigFileNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_new_brick(brickconfig_uuid: Uuid) -> NewBrick {
        NewBrick {
            brickconfig_uuid,
            tenant_id: "iamatenant".to_string(),
            instance_id: None,
            configuration: Default::default(),
        }
    }

    fn test_new_brickconfig() -> NewBrickConfig {
        NewBrickConfig {
            name: "abrickconfig".to_string(),
            version: "v0.0".to_string(),
            is_public: false,
            tenant_id: "iamatenant".to_string(),
            tag: "testapp".to_string(),
            description: "i am a test app".to_string(),
            logo: String::new(),
            app_version: "10.2.9".to_string(),
            ports: vec![80, 443],
            environ: vec![],
            email_template: String::new(),
            minimum_ram_mb: 512,
        }
    }

    #[tokio::test]
    async fn test_guarded_update_applies_on_matching_status() {
        let store = MemoryStore::new();
        let brick = store.create_brick(test_new_brick(Uuid::new_v4())).await.unwrap();

        let updated = store
            .update_brick_guarded(
                brick.id,
                BrickStatus::NoState,
                BrickUpdate::status(BrickStatus::Init),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BrickStatus::Init);
    }

    #[tokio::test]
    async fn test_guarded_update_rejects_stale_status() {
        let store = MemoryStore::new();
        let brick = store.create_brick(test_new_brick(Uuid::new_v4())).await.unwrap();

        let err = store
            .update_brick_guarded(
                brick.id,
                BrickStatus::Deploying,
                BrickUpdate::status(BrickStatus::DeployDone),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState { .. }));

        // Record is untouched
        let brick = store.get_brick(brick.id).await.unwrap();
        assert_eq!(brick.status, BrickStatus::NoState);
    }

    #[tokio::test]
    async fn test_brickconfig_destroy_refused_while_referenced() {
        let store = MemoryStore::new();
        let config = store.create_brickconfig(test_new_brickconfig()).await.unwrap();
        let brick = store.create_brick(test_new_brick(config.id)).await.unwrap();

        let err = store.destroy_brickconfig(config.id).await.unwrap_err();
        assert!(matches!(err, StoreError::BrickConfigInUse(_, 1)));

        store.destroy_brick(brick.id).await.unwrap();
        store.destroy_brickconfig(config.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_brickconfig_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get_brickconfig(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::BrickConfigNotFound(_)));
    }

    #[tokio::test]
    async fn test_pagination_resumes_after_marker() {
        let store = MemoryStore::new();
        let config_id = Uuid::new_v4();
        for _ in 0..5 {
            store.create_brick(test_new_brick(config_id)).await.unwrap();
        }

        let filter = BrickFilter::default();
        let first = store
            .list_bricks(&filter, &Pagination { limit: Some(2), marker: None })
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        let marker = first.next_marker.expect("continuation marker");

        let second = store
            .list_bricks(&filter, &Pagination { limit: Some(10), marker: Some(marker) })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 3);
        assert!(second.next_marker.is_none());

        // No overlap between pages
        for brick in &second.items {
            assert!(!first.items.iter().any(|b| b.id == brick.id));
        }
    }

    #[tokio::test]
    async fn test_filter_by_status_and_instance() {
        let store = MemoryStore::new();
        let config_id = Uuid::new_v4();
        let a = store.create_brick(test_new_brick(config_id)).await.unwrap();
        store
            .update_brick(
                a.id,
                BrickUpdate {
                    instance_id: Some(Some("inst-1".to_string())),
                    status: Some(BrickStatus::Deploying),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.create_brick(test_new_brick(config_id)).await.unwrap();

        let page = store
            .list_bricks(
                &BrickFilter::with_status(BrickStatus::Deploying),
                &Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, a.id);

        let brick = store.get_brick_by_instance("inst-1").await.unwrap();
        assert_eq!(brick.id, a.id);
    }
}
