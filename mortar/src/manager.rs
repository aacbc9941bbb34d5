//! Mortar manager
//!
//! Handles dispatch traffic for this host: execution tasks, last-task
//! checks, liveness checks and log tails. Every potentially-blocking step
//! runs in the bounded pool; outcomes flow back to the conductor through
//! linked completion callbacks, exactly one report per unit of work.
//!
//! Tasks arrive on a topic shared by every agent; an agent only acts on
//! instances present on its own host and silently leaves the rest to
//! their owners.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use brick_core::dispatch::RequestContext;
use brick_core::models::{ExecutionTask, InstanceHealth};
use brick_core::pool::{UnitResult, WorkerPool};
use brick_core::rpc::{BrickLog, ConductorClient};
use brick_core::states::TaskStatus;

use crate::channel::ChannelLayout;
use crate::errors::MortarError;
use crate::executor;
use crate::instances::InstanceHost;
use crate::telemetry::build_heartbeat;

pub struct MortarManager {
    host: String,
    layout: ChannelLayout,
    instances: Arc<dyn InstanceHost>,
    conductor: ConductorClient,
    conductor_topic: String,
    pool: Arc<WorkerPool>,
    io_timeout: Duration,
}

impl MortarManager {
    pub fn new(
        host: String,
        layout: ChannelLayout,
        instances: Arc<dyn InstanceHost>,
        conductor: ConductorClient,
        conductor_topic: String,
        pool: Arc<WorkerPool>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            host,
            layout,
            instances,
            conductor,
            conductor_topic,
            pool,
            io_timeout,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Liveness ping from the conductor.
    pub async fn do_ping(&self, _context: RequestContext) {
        debug!(host = %self.host, "ping received");
    }

    /// True when the instance lives on this host.
    async fn hosts_instance(&self, instance_id: &str) -> bool {
        tokio::fs::metadata(self.layout.instance_dir(instance_id))
            .await
            .is_ok()
    }

    /// Push an execution task into its instance and report the outcome
    /// back to the conductor.
    pub async fn do_execute(
        &self,
        context: RequestContext,
        task: ExecutionTask,
    ) -> Result<(), MortarError> {
        if !self.hosts_instance(&task.instance_id).await {
            debug!(instance = %task.instance_id, "instance not on this host, ignoring task");
            return Ok(());
        }
        debug!(instance = %task.instance_id, "received some things to do");

        let layout = self.layout.clone();
        let instances = self.instances.clone();
        let io_timeout = self.io_timeout;
        let instance_id = task.instance_id.clone();

        let handle = self.pool.spawn(async move {
            Ok(executor::do_execute(&layout, &*instances, &task, io_timeout).await)
        })?;
        handle.link(self.report_callback(context, instance_id));
        Ok(())
    }

    /// Check the most recent task outcome for an instance and report it
    /// back to the conductor.
    pub async fn do_check_last_task(
        &self,
        context: RequestContext,
        instance_id: String,
    ) -> Result<(), MortarError> {
        if !self.hosts_instance(&instance_id).await {
            debug!(instance = %instance_id, "instance not on this host, ignoring check");
            return Ok(());
        }
        debug!(instance = %instance_id, "checking on instance");

        let layout = self.layout.clone();
        let check_instance = instance_id.clone();
        let handle = self.pool.spawn(async move {
            Ok(executor::do_check_last_task(&layout, &check_instance).await)
        })?;
        handle.link(self.report_callback(context, instance_id));
        Ok(())
    }

    /// One status report to the conductor per finished unit of work. A
    /// unit that failed outright reports ERROR.
    fn report_callback(
        &self,
        context: RequestContext,
        instance_id: String,
    ) -> impl FnOnce(&UnitResult<TaskStatus>) + Send + 'static {
        let conductor = self.conductor.clone();
        let topic = self.conductor_topic.clone();

        move |result| {
            let status = match result {
                Ok(status) => *status,
                Err(e) => {
                    warn!(instance = %instance_id, "task unit failed: {e:#}");
                    TaskStatus::Error
                }
            };

            tokio::spawn(async move {
                if let Err(e) = conductor
                    .do_report_last_task(context, &topic, instance_id, status)
                    .await
                {
                    warn!("could not report task status: {}", e);
                }
            });
        }
    }

    /// Health-check the requested instances and send a heartbeat report
    /// back to the conductor.
    pub async fn do_check_instances(
        &self,
        context: RequestContext,
        requested: Vec<String>,
    ) -> Result<(), MortarError> {
        debug!("doing health check, as commanded by my conductor");

        let host = self.host.clone();
        let layout = self.layout.clone();
        let instances = self.instances.clone();
        let conductor = self.conductor.clone();
        let topic = self.conductor_topic.clone();

        self.pool.spawn(async move {
            let running = instances.running_instances().await?;

            let mut health = Vec::new();
            for instance_id in requested {
                let hosted = tokio::fs::metadata(layout.instance_dir(&instance_id))
                    .await
                    .is_ok();
                if !hosted {
                    continue;
                }
                health.push(InstanceHealth {
                    alive: running.contains(&instance_id),
                    instance_id,
                });
            }

            let report = build_heartbeat(&host, health);
            conductor.do_task_report(context, &topic, report).await?;
            Ok(())
        })?;
        Ok(())
    }

    /// Tail an instance's execution log (synchronous call).
    pub async fn do_tail_brick_log(
        &self,
        _context: RequestContext,
        instance_id: String,
        length: usize,
    ) -> Result<BrickLog, MortarError> {
        let log = executor::tail_log(&self.layout, &instance_id, length).await?;
        Ok(BrickLog { instance_id, log })
    }
}
