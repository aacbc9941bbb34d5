//! Message dispatch between conductor and mortar
//!
//! Two primitives over a pluggable transport: `cast` is one-way and
//! fire-and-forget, `call` is synchronous with a caller-side timeout.
//! Messages are addressed by topic; each service drains its own topic
//! through an [`Inbox`].

mod local;
mod mqtt;
mod topics;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use local::LocalTransport;
pub use mqtt::{MqttAddress, MqttTransport};
pub use topics::Topics;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("call timed out waiting for a reply")]
    Timeout,

    #[error("remote handler failed: {0}")]
    Remote(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Caller identity carried with every message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl RequestContext {
    /// Context for conductor-internal work (periodic tasks, reconciliation)
    pub fn admin() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            tenant_id: None,
            user: None,
        }
    }

    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            tenant_id: Some(tenant_id.into()),
            user: None,
        }
    }
}

/// One dispatched message: method name plus JSON arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub context: RequestContext,
    pub method: String,
    pub args: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(
        context: RequestContext,
        method: &str,
        args: &T,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            context,
            method: method.to_string(),
            args: serde_json::to_value(args)?,
        })
    }

    pub fn parse_args<T: for<'de> Deserialize<'de>>(&self) -> Result<T, DispatchError> {
        Ok(serde_json::from_value(self.args.clone())?)
    }
}

/// Reply path for a `call` delivery; sending consumes the handle so a
/// handler can answer at most once.
pub struct ReplyHandle {
    send_fn: Box<dyn FnOnce(Result<serde_json::Value, String>) + Send>,
}

impl ReplyHandle {
    pub fn new<F>(send_fn: F) -> Self
    where
        F: FnOnce(Result<serde_json::Value, String>) + Send + 'static,
    {
        Self {
            send_fn: Box::new(send_fn),
        }
    }

    pub fn send(self, result: Result<serde_json::Value, String>) {
        (self.send_fn)(result)
    }
}

impl std::fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReplyHandle")
    }
}

/// A received message; `reply` is present only for `call` deliveries
#[derive(Debug)]
pub struct Delivery {
    pub envelope: Envelope,
    pub reply: Option<ReplyHandle>,
}

/// Stream of deliveries for one served topic
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Inbox {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { rx }
    }

    /// Next delivery; None once the transport is gone
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// Topic-addressed message delivery
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fire-and-forget send. Succeeding only means the message was handed
    /// to the transport; nobody may be listening.
    async fn cast(&self, topic: &str, envelope: Envelope) -> Result<(), DispatchError>;

    /// Send and wait for the reply, bounded by `timeout`.
    async fn call(
        &self,
        topic: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<serde_json::Value, DispatchError>;

    /// Start consuming a topic. A later serve of the same topic replaces
    /// the previous consumer.
    async fn serve(&self, topic: &str) -> Result<Inbox, DispatchError>;
}
