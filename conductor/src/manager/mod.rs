//! Conductor manager
//!
//! Single authoritative decision-maker for this host's share of brick
//! operations. Commands arrive over dispatch, do their store transition
//! and hand long-running work to the bounded pool; periodic sweeps
//! reconcile persisted state against agents and infrastructure.
//!
//! Conductors on other hosts run the same manager; the partitioner
//! assigns every brick to exactly one of them, so sweeps never contend
//! across hosts. Within a host, the stale-state guard on every write is
//! the sole ordering mechanism between sweeps and in-flight commands.

pub mod actions;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use brick_core::dispatch::RequestContext;
use brick_core::models::{Brick, ExecutionTask, HeartbeatReport};
use brick_core::pool::{WorkerHandle, WorkerPool};
use brick_core::render::render_config_file;
use brick_core::rpc::{BrickLog, MortarClient};
use brick_core::states::{next_status, BrickStatus, TaskStatus};
use brick_core::store::{BrickFilter, BrickUpdate, Pagination, Store, StoreError};

use crate::errors::ConductorError;
use crate::infra::Infrastructure;
use crate::manager::actions::DeployParams;
use crate::notify::Notifier;
use crate::partition::Partitioner;

/// Marks a brick busy for the lifetime of a deploy/destroy worker so the
/// two cannot overlap on the same brick.
struct BusyGuard {
    busy: Arc<Mutex<HashSet<Uuid>>>,
    brick_id: Uuid,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.lock().unwrap().remove(&self.brick_id);
    }
}

pub struct ConductorManager {
    store: Arc<dyn Store>,
    infra: Arc<dyn Infrastructure>,
    notifier: Arc<dyn Notifier>,
    mortar: MortarClient,
    mortar_topic: String,
    pool: Arc<WorkerPool>,
    partitioner: Partitioner,
    deploy_params: DeployParams,
    busy: Arc<Mutex<HashSet<Uuid>>>,
}

impl ConductorManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        infra: Arc<dyn Infrastructure>,
        notifier: Arc<dyn Notifier>,
        mortar: MortarClient,
        mortar_topic: String,
        pool: Arc<WorkerPool>,
        partitioner: Partitioner,
        deploy_params: DeployParams,
    ) -> Self {
        Self {
            store,
            infra,
            notifier,
            mortar,
            mortar_topic,
            pool,
            partitioner,
            deploy_params,
            busy: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    fn claim(&self, brick_id: Uuid, operation: &'static str) -> Result<BusyGuard, ConductorError> {
        let mut busy = self.busy.lock().unwrap();
        if !busy.insert(brick_id) {
            return Err(ConductorError::BrickBusy { brick_id, operation });
        }
        Ok(BusyGuard {
            busy: self.busy.clone(),
            brick_id,
        })
    }

    /// Provision compute resources for a brick (async command).
    pub async fn do_brick_deploy(
        &self,
        _context: RequestContext,
        brick_id: Uuid,
    ) -> Result<WorkerHandle<()>, ConductorError> {
        debug!(brick = %brick_id, "do_brick_deploy");
        let guard = self.claim(brick_id, "deploy")?;

        let store = self.store.clone();
        let infra = self.infra.clone();
        let params = self.deploy_params.clone();
        Ok(self.pool.spawn(async move {
            let _guard = guard;
            actions::brick_deploy_action(store, infra, brick_id, params).await?;
            Ok(())
        })?)
    }

    /// Mark a brick as deploying (async command).
    pub async fn do_brick_deploying(
        &self,
        _context: RequestContext,
        brick_id: Uuid,
    ) -> Result<WorkerHandle<()>, ConductorError> {
        debug!(brick = %brick_id, "do_brick_deploying");
        let store = self.store.clone();
        Ok(self.pool.spawn(async move {
            actions::brick_status_action(
                store,
                brick_id,
                &[BrickStatus::Init, BrickStatus::DeployWait],
                "deploying",
                BrickStatus::Deploying,
            )
            .await?;
            Ok(())
        })?)
    }

    /// Mark a brick as failed (async command).
    pub async fn do_brick_deployfail(
        &self,
        _context: RequestContext,
        brick_id: Uuid,
    ) -> Result<WorkerHandle<()>, ConductorError> {
        debug!(brick = %brick_id, "do_brick_deployfail");
        let store = self.store.clone();
        Ok(self.pool.spawn(async move {
            actions::brick_status_action(
                store,
                brick_id,
                &[
                    BrickStatus::Init,
                    BrickStatus::Deploying,
                    BrickStatus::DeployWait,
                ],
                "deployfail",
                BrickStatus::DeployFail,
            )
            .await?;
            Ok(())
        })?)
    }

    /// Mark a brick as done, assigning its floating IP when requested
    /// (async command).
    pub async fn do_brick_deploydone(
        &self,
        _context: RequestContext,
        brick_id: Uuid,
    ) -> Result<WorkerHandle<()>, ConductorError> {
        debug!(brick = %brick_id, "do_brick_deploydone");
        let store = self.store.clone();
        let infra = self.infra.clone();
        Ok(self.pool.spawn(async move {
            actions::brick_deploydone_action(store, infra, brick_id).await?;
            Ok(())
        })?)
    }

    /// Tear down a brick's compute resource and delete the record
    /// (async command).
    pub async fn do_brick_destroy(
        &self,
        _context: RequestContext,
        brick_id: Uuid,
    ) -> Result<WorkerHandle<()>, ConductorError> {
        debug!(brick = %brick_id, "do_brick_destroy");
        let guard = self.claim(brick_id, "destroy")?;

        let store = self.store.clone();
        let infra = self.infra.clone();
        Ok(self.pool.spawn(async move {
            let _guard = guard;
            actions::brick_destroy_action(store, infra, brick_id).await?;
            Ok(())
        })?)
    }

    /// Single ingestion point for agent task feedback. Unrecognized
    /// (status, report) combinations are logged and dropped.
    pub async fn do_report_last_task(
        &self,
        _context: RequestContext,
        instance_id: &str,
        report: TaskStatus,
    ) -> Result<(), ConductorError> {
        let brick = match self.store.get_brick_by_instance(instance_id).await {
            Ok(brick) => brick,
            Err(StoreError::InstanceNotFound(_)) => {
                warn!(instance = instance_id, "task report for unknown instance, dropping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(next) = next_status(brick.status, report) else {
            info!(brick = %brick.id, status = %brick.status, report = %report,
                  "no transition for task report, dropping");
            return Ok(());
        };

        match next {
            BrickStatus::DeployDone => {
                let updated = match actions::brick_deploydone_action(
                    self.store.clone(),
                    self.infra.clone(),
                    brick.id,
                )
                .await
                {
                    Ok(updated) => updated,
                    Err(ConductorError::Store(StoreError::StaleState { .. }))
                    | Err(ConductorError::InvalidTransition { .. }) => {
                        info!(brick = %brick.id, "deploydone lost a status race, dropping");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };

                self.spawn_completion_notification(updated).await;
            }
            next => {
                match self
                    .store
                    .update_brick_guarded(brick.id, brick.status, BrickUpdate::status(next))
                    .await
                {
                    Ok(_) => {
                        info!(brick = %brick.id, from = %brick.status, to = %next,
                              "task report applied");
                    }
                    Err(StoreError::StaleState { .. }) => {
                        info!(brick = %brick.id, "task report lost a status race, dropping");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(())
    }

    async fn spawn_completion_notification(&self, brick: Brick) {
        let brickconfig = match self.store.get_brickconfig(brick.brickconfig_uuid).await {
            Ok(config) => config,
            Err(e) => {
                warn!(brick = %brick.id, "cannot notify, brickconfig missing: {}", e);
                return;
            }
        };

        let notifier = self.notifier.clone();
        let spawned = self.pool.spawn(async move {
            actions::notify_completion(notifier, &brick, &brickconfig).await;
            Ok(())
        });
        if let Err(e) = spawned {
            warn!("completion notification skipped: {}", e);
        }
    }

    /// Heartbeat replies from agents; liveness problems are surfaced in
    /// the log for operators.
    pub async fn do_task_report(
        &self,
        _context: RequestContext,
        report: HeartbeatReport,
    ) -> Result<(), ConductorError> {
        for health in &report.instances {
            if health.alive {
                debug!(host = %report.host, instance = %health.instance_id, "instance alive");
            } else {
                warn!(host = %report.host, instance = %health.instance_id,
                      "instance reported dead by agent");
            }
        }
        debug!(host = %report.host, cpu = report.cpu_usage as f64, "agent heartbeat processed");
        Ok(())
    }

    /// Fetch the tail of a brick's execution log from its agent
    /// (synchronous call).
    pub async fn do_tail_brick_log(
        &self,
        context: RequestContext,
        brick_uuid: Uuid,
        length: usize,
    ) -> Result<BrickLog, ConductorError> {
        let brick = self.store.get_brick(brick_uuid).await?;
        let instance_id = brick
            .instance_id
            .clone()
            .ok_or(ConductorError::BrickWithoutInstance(brick_uuid))?;

        Ok(self
            .mortar
            .do_tail_brick_log(context, &self.mortar_topic, instance_id, length)
            .await?)
    }

    // ============================ PERIODIC TASKS ============================ //

    /// For every owned brick in INIT, render its config files and dispatch
    /// an execution task to the agents. Bricks stuck without an instance
    /// are skipped with a warning.
    pub async fn initiate_initialized_bricks(
        &self,
        context: RequestContext,
    ) -> Result<(), ConductorError> {
        for brick in self
            .owned_bricks(BrickFilter::with_status(BrickStatus::Init))
            .await?
        {
            let brick_id = brick.id;
            if let Err(e) = self.dispatch_execution(context.clone(), brick).await {
                warn!(brick = %brick_id, "initialization dispatch failed: {}", e);
            }
        }
        Ok(())
    }

    async fn dispatch_execution(
        &self,
        context: RequestContext,
        brick: Brick,
    ) -> Result<(), ConductorError> {
        let Some(instance_id) = brick.instance_id.clone() else {
            warn!(brick = %brick.id,
                  "brick is initializing but has no instance; needs operator attention");
            return Ok(());
        };

        let brickconfig = self.store.get_brickconfig(brick.brickconfig_uuid).await?;
        let configfiles = self.store.list_configfiles(brickconfig.id).await?;

        let files = configfiles
            .iter()
            .map(|file| {
                (
                    file.name.clone(),
                    render_config_file(file, &brick, &brickconfig),
                )
            })
            .collect();

        debug!(brick = %brick.id, instance = %instance_id, "dispatching execution task");
        let task = ExecutionTask { instance_id, files };
        self.mortar
            .do_execute(context, &self.mortar_topic, task)
            .await?;
        Ok(())
    }

    /// Ask agents for the last task outcome of every owned DEPLOYING
    /// brick; answers come back through `do_report_last_task`.
    pub async fn check_deploying_bricks(
        &self,
        context: RequestContext,
    ) -> Result<(), ConductorError> {
        for brick in self
            .owned_bricks(BrickFilter::with_status(BrickStatus::Deploying))
            .await?
        {
            let Some(instance_id) = brick.instance_id.clone() else {
                warn!(brick = %brick.id, "deploying brick has no instance, skipping check");
                continue;
            };
            if let Err(e) = self
                .mortar
                .do_check_last_task(context.clone(), &self.mortar_topic, instance_id)
                .await
            {
                warn!(brick = %brick.id, "last-task check dispatch failed: {}", e);
            }
        }
        Ok(())
    }

    /// Ask agents to confirm liveness of every known owned instance.
    pub async fn check_instance_heartbeats(
        &self,
        context: RequestContext,
    ) -> Result<(), ConductorError> {
        let instances: Vec<String> = self
            .owned_bricks(BrickFilter::default())
            .await?
            .into_iter()
            .filter_map(|brick| brick.instance_id)
            .collect();

        if instances.is_empty() {
            return Ok(());
        }

        debug!(count = instances.len(), "requesting instance heartbeats");
        self.mortar
            .do_check_instances(context, &self.mortar_topic, instances)
            .await?;
        Ok(())
    }

    /// Compare persisted instance ids against the live infrastructure set
    /// and delete bricks whose instance vanished (async command).
    pub async fn check_for_deleted_instances(
        &self,
        _context: RequestContext,
    ) -> Result<WorkerHandle<usize>, ConductorError> {
        let store = self.store.clone();
        let infra = self.infra.clone();
        let partitioner = self.partitioner.clone();
        Ok(self.pool.spawn(async move {
            let removed =
                actions::deleted_instances_cleanup_action(store, infra, partitioner).await?;
            Ok(removed)
        })?)
    }

    /// Stamp each owned brick's configuration with its brickconfig's
    /// current version.
    pub async fn set_bricks_versions(
        &self,
        _context: RequestContext,
    ) -> Result<(), ConductorError> {
        for brick in self.owned_bricks(BrickFilter::default()).await? {
            if let Err(e) = self.stamp_version(&brick).await {
                warn!(brick = %brick.id, "version stamp failed: {}", e);
            }
        }
        Ok(())
    }

    async fn stamp_version(&self, brick: &Brick) -> Result<(), ConductorError> {
        let brickconfig = self.store.get_brickconfig(brick.brickconfig_uuid).await?;
        if brick.config_str("current_version") == Some(brickconfig.version.as_str()) {
            return Ok(());
        }

        let mut configuration = brick.configuration.clone();
        configuration.insert(
            "current_version".to_string(),
            serde_json::Value::String(brickconfig.version.clone()),
        );
        self.store
            .update_brick(
                brick.id,
                BrickUpdate {
                    configuration: Some(configuration),
                    ..Default::default()
                },
            )
            .await?;
        info!(brick = %brick.id, version = %brickconfig.version, "brick version stamped");
        Ok(())
    }

    /// Bricks matching `filter` that this conductor owns, across all
    /// pages.
    async fn owned_bricks(&self, filter: BrickFilter) -> Result<Vec<Brick>, ConductorError> {
        let mut owned = Vec::new();
        let mut page = Pagination {
            limit: Some(100),
            marker: None,
        };
        loop {
            let result = self.store.list_bricks(&filter, &page).await?;
            for brick in result.items {
                if self.partitioner.owns(&brick.id) {
                    owned.push(brick);
                }
            }

            match result.next_marker {
                Some(marker) => page.marker = Some(marker),
                None => break,
            }
        }
        Ok(owned)
    }
}
