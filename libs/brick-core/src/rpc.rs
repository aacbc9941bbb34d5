//! Typed client side of the conductor and mortar dispatch APIs
//!
//! Method names and argument shapes live here so both services (and any
//! API front end) agree on the wire surface.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::{DispatchError, Envelope, RequestContext, Transport};
use crate::models::{ExecutionTask, HeartbeatReport};
use crate::states::TaskStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrickIdArgs {
    pub brick_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteArgs {
    pub task: ExecutionTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceArgs {
    pub instance_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInstancesArgs {
    pub instances: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailLogArgs {
    pub instance_id: String,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailBrickLogArgs {
    pub brick_uuid: Uuid,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportLastTaskArgs {
    pub instance_id: String,
    pub status: TaskStatus,
}

/// Tail of one instance's execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrickLog {
    pub instance_id: String,
    pub log: String,
}

/// Client side of the mortar dispatch API
#[derive(Clone)]
pub struct MortarClient {
    transport: Arc<dyn Transport>,
    call_timeout: Duration,
}

impl MortarClient {
    pub fn new(transport: Arc<dyn Transport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }

    pub async fn do_ping(&self, context: RequestContext, topic: &str) -> Result<(), DispatchError> {
        let envelope = Envelope::new(context, "do_ping", &serde_json::json!({}))?;
        self.transport.cast(topic, envelope).await
    }

    pub async fn do_execute(
        &self,
        context: RequestContext,
        topic: &str,
        task: ExecutionTask,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope::new(context, "do_execute", &ExecuteArgs { task })?;
        self.transport.cast(topic, envelope).await
    }

    pub async fn do_check_last_task(
        &self,
        context: RequestContext,
        topic: &str,
        instance_id: String,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope::new(context, "do_check_last_task", &InstanceArgs { instance_id })?;
        self.transport.cast(topic, envelope).await
    }

    pub async fn do_check_instances(
        &self,
        context: RequestContext,
        topic: &str,
        instances: Vec<String>,
    ) -> Result<(), DispatchError> {
        let envelope =
            Envelope::new(context, "do_check_instances", &CheckInstancesArgs { instances })?;
        self.transport.cast(topic, envelope).await
    }

    /// Synchronous call; blocks up to the configured timeout.
    pub async fn do_tail_brick_log(
        &self,
        context: RequestContext,
        topic: &str,
        instance_id: String,
        length: usize,
    ) -> Result<BrickLog, DispatchError> {
        let envelope = Envelope::new(
            context,
            "do_tail_brick_log",
            &TailLogArgs { instance_id, length },
        )?;
        let value = self
            .transport
            .call(topic, envelope, self.call_timeout)
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Client side of the conductor dispatch API
#[derive(Clone)]
pub struct ConductorClient {
    transport: Arc<dyn Transport>,
    call_timeout: Duration,
}

impl ConductorClient {
    pub fn new(transport: Arc<dyn Transport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }

    pub async fn do_brick_deploy(
        &self,
        context: RequestContext,
        topic: &str,
        brick_id: Uuid,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope::new(context, "do_brick_deploy", &BrickIdArgs { brick_id })?;
        self.transport.cast(topic, envelope).await
    }

    pub async fn do_brick_deploying(
        &self,
        context: RequestContext,
        topic: &str,
        brick_id: Uuid,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope::new(context, "do_brick_deploying", &BrickIdArgs { brick_id })?;
        self.transport.cast(topic, envelope).await
    }

    pub async fn do_brick_deployfail(
        &self,
        context: RequestContext,
        topic: &str,
        brick_id: Uuid,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope::new(context, "do_brick_deployfail", &BrickIdArgs { brick_id })?;
        self.transport.cast(topic, envelope).await
    }

    pub async fn do_brick_deploydone(
        &self,
        context: RequestContext,
        topic: &str,
        brick_id: Uuid,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope::new(context, "do_brick_deploydone", &BrickIdArgs { brick_id })?;
        self.transport.cast(topic, envelope).await
    }

    pub async fn do_brick_destroy(
        &self,
        context: RequestContext,
        topic: &str,
        brick_id: Uuid,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope::new(context, "do_brick_destroy", &BrickIdArgs { brick_id })?;
        self.transport.cast(topic, envelope).await
    }

    pub async fn do_report_last_task(
        &self,
        context: RequestContext,
        topic: &str,
        instance_id: String,
        status: TaskStatus,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope::new(
            context,
            "do_report_last_task",
            &ReportLastTaskArgs { instance_id, status },
        )?;
        self.transport.cast(topic, envelope).await
    }

    pub async fn do_task_report(
        &self,
        context: RequestContext,
        topic: &str,
        report: HeartbeatReport,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope::new(context, "do_task_report", &report)?;
        self.transport.cast(topic, envelope).await
    }

    /// Synchronous call; blocks up to the configured timeout.
    pub async fn do_tail_brick_log(
        &self,
        context: RequestContext,
        topic: &str,
        brick_uuid: Uuid,
        length: usize,
    ) -> Result<BrickLog, DispatchError> {
        let envelope = Envelope::new(
            context,
            "do_tail_brick_log",
            &TailBrickLogArgs { brick_uuid, length },
        )?;
        let value = self
            .transport
            .call(topic, envelope, self.call_timeout)
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}
