//! Deploy-completion notification collaborator

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use brick_core::render::render_template;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Fire-and-forget notification sink, consumed on deploy completion.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &str,
        template: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<(), NotifyError>;
}

/// Default sink: renders the template and logs it. Deployments wanting
/// email wire their own implementation.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient: &str,
        template: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<(), NotifyError> {
        let body = render_template(template, context);
        info!(recipient, "deploy completion notification: {}", body);
        Ok(())
    }
}
