//! Action bodies executed inside worker-pool units
//!
//! Each action re-reads the brick from the store, checks the expected
//! pre-state, performs its infrastructure side effects, and writes back
//! through the guarded conditional update. Nothing here holds entity
//! state across calls.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use brick_core::models::{Brick, BrickConfig};
use brick_core::render::brick_context;
use brick_core::states::BrickStatus;
use brick_core::store::{BrickFilter, BrickUpdate, Pagination, Store, StoreError};

use crate::errors::ConductorError;
use crate::infra::{Infrastructure, InfraError, InstanceSpec};
use crate::notify::Notifier;
use crate::partition::Partitioner;

/// Deploy-time constants owned by the conductor process
#[derive(Debug, Clone)]
pub struct DeployParams {
    /// Image every brick instance boots from
    pub default_image: String,

    /// Advertised API endpoint injected into instance metadata
    pub api_url: String,
}

/// Metadata injected into the instance so the in-guest bootstrap can
/// phone home.
pub fn prepare_instance_meta(brick: &Brick, api_url: &str) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    meta.insert("BRICK_API".to_string(), api_url.to_string());
    meta.insert("BRICK_UUID".to_string(), brick.id.to_string());
    meta.insert("BRICK_TENANT".to_string(), brick.tenant_id.clone());
    meta
}

fn required_config(brick: &Brick, key: &str) -> Result<String, ConductorError> {
    brick
        .config_str(key)
        .map(str::to_string)
        .ok_or_else(|| {
            ConductorError::ConfigError(format!("brick {} has no '{}' configured", brick.id, key))
        })
}

/// Provision the compute resource for a brick and move it NOSTATE -> INIT.
///
/// A provisioning failure leaves the record untouched so a retry is safe.
pub async fn brick_deploy_action(
    store: Arc<dyn Store>,
    infra: Arc<dyn Infrastructure>,
    brick_id: Uuid,
    params: DeployParams,
) -> Result<(), ConductorError> {
    let brick = store.get_brick(brick_id).await?;
    if brick.status != BrickStatus::NoState {
        return Err(ConductorError::InvalidTransition {
            brick_id,
            operation: "deploy",
            status: brick.status,
        });
    }

    let brickconfig = store.get_brickconfig(brick.brickconfig_uuid).await?;

    let security_groups = infra
        .ensure_security_group(&brickconfig.name, &brickconfig.ports)
        .await?;

    let spec = InstanceSpec {
        name: brickconfig.name.clone(),
        image: params.default_image,
        flavor: required_config(&brick, "flavour")?,
        network: required_config(&brick, "network")?,
        keypair: required_config(&brick, "keypair")?,
        metadata: prepare_instance_meta(&brick, &params.api_url),
        security_groups,
    };

    let instance_id = infra.create_instance(&spec).await?;

    let update = BrickUpdate {
        instance_id: Some(Some(instance_id.clone())),
        status: Some(BrickStatus::Init),
        ..Default::default()
    };
    match store
        .update_brick_guarded(brick_id, BrickStatus::NoState, update)
        .await
    {
        Ok(_) => {
            info!(brick = %brick_id, instance = %instance_id, "brick provisioned");
            Ok(())
        }
        Err(e @ StoreError::StaleState { .. }) => {
            // Lost the race after provisioning; tear the fresh instance
            // back down rather than orphan it.
            if let Err(cleanup) = infra.delete_instance(&instance_id).await {
                warn!(brick = %brick_id, instance = %instance_id,
                      "could not remove instance after lost deploy race: {}", cleanup);
            }
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Guarded status mark from one of `allowed` to `next`.
pub async fn brick_status_action(
    store: Arc<dyn Store>,
    brick_id: Uuid,
    allowed: &[BrickStatus],
    operation: &'static str,
    next: BrickStatus,
) -> Result<Brick, ConductorError> {
    let brick = store.get_brick(brick_id).await?;
    if !allowed.contains(&brick.status) {
        return Err(ConductorError::InvalidTransition {
            brick_id,
            operation,
            status: brick.status,
        });
    }

    Ok(store
        .update_brick_guarded(brick_id, brick.status, BrickUpdate::status(next))
        .await?)
}

/// Move a brick to DEPLOYDONE, assigning its floating IP first when the
/// configuration requests one.
pub async fn brick_deploydone_action(
    store: Arc<dyn Store>,
    infra: Arc<dyn Infrastructure>,
    brick_id: Uuid,
) -> Result<Brick, ConductorError> {
    let brick = store.get_brick(brick_id).await?;
    if !matches!(brick.status, BrickStatus::Deploying | BrickStatus::DeployWait) {
        return Err(ConductorError::InvalidTransition {
            brick_id,
            operation: "deploydone",
            status: brick.status,
        });
    }

    if let Some(floating_ip) = brick.config_str("floating_ip") {
        let instance_id = brick
            .instance_id
            .as_deref()
            .ok_or(ConductorError::BrickWithoutInstance(brick_id))?;
        infra.assign_floating_ip(instance_id, floating_ip).await?;
    }

    let update = BrickUpdate {
        status: Some(BrickStatus::DeployDone),
        deployed_at: Some(Some(Utc::now())),
        ..Default::default()
    };
    Ok(store
        .update_brick_guarded(brick_id, brick.status, update)
        .await?)
}

/// Tear down the compute resource, then delete the record. The record
/// never goes away before the resource does; an already-gone resource
/// counts as torn down.
pub async fn brick_destroy_action(
    store: Arc<dyn Store>,
    infra: Arc<dyn Infrastructure>,
    brick_id: Uuid,
) -> Result<(), ConductorError> {
    let brick = store.get_brick(brick_id).await?;

    if let Some(instance_id) = brick.instance_id.as_deref() {
        match infra.delete_instance(instance_id).await {
            Ok(()) => {}
            Err(InfraError::InstanceNotFound(_)) => {
                info!(brick = %brick_id, instance = instance_id, "instance already gone");
            }
            Err(e) => return Err(e.into()),
        }
    }

    store.destroy_brick(brick_id).await?;
    info!(brick = %brick_id, "brick destroyed");
    Ok(())
}

/// Delete records whose instance no longer exists at the provider.
/// Best-effort repair; per-brick failures are logged and skipped.
pub async fn deleted_instances_cleanup_action(
    store: Arc<dyn Store>,
    infra: Arc<dyn Infrastructure>,
    partitioner: Partitioner,
) -> Result<usize, ConductorError> {
    let live: HashSet<String> = infra.list_instances().await?.into_iter().collect();

    let mut removed = 0;
    let mut page = Pagination {
        limit: Some(100),
        marker: None,
    };
    loop {
        let result = store.list_bricks(&BrickFilter::default(), &page).await?;
        for brick in &result.items {
            if !partitioner.owns(&brick.id) {
                continue;
            }
            let Some(instance_id) = brick.instance_id.as_deref() else {
                continue;
            };
            if live.contains(instance_id) {
                continue;
            }

            match store.destroy_brick(brick.id).await {
                Ok(()) => {
                    warn!(brick = %brick.id, instance = instance_id,
                          "instance disappeared, removed orphaned brick");
                    removed += 1;
                }
                Err(StoreError::BrickNotFound(_)) => {}
                Err(e) => warn!(brick = %brick.id, "orphan cleanup failed: {}", e),
            }
        }

        match result.next_marker {
            Some(marker) => page.marker = Some(marker),
            None => break,
        }
    }

    Ok(removed)
}

/// Render and send the deploy-completion notification. Delivery problems
/// are logged; they never affect the state transition that triggered it.
pub async fn notify_completion(
    notifier: Arc<dyn Notifier>,
    brick: &Brick,
    brickconfig: &BrickConfig,
) {
    let recipient = brick
        .config_str("email")
        .unwrap_or(brick.tenant_id.as_str())
        .to_string();
    let context = brick_context(brick, brickconfig);

    if let Err(e) = notifier
        .notify(&recipient, &brickconfig.email_template, &context)
        .await
    {
        warn!(brick = %brick.id, "completion notification failed: {}", e);
    }
}
