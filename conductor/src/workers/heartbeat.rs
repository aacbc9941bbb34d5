//! Heartbeat sweep worker
//!
//! Periodically asks agents to confirm liveness of all known instances.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use brick_core::dispatch::RequestContext;

use crate::manager::ConductorManager;

/// Heartbeat sweep options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Run the heartbeat sweep worker
pub async fn run<S, F>(
    options: &Options,
    manager: Arc<ConductorManager>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Heartbeat sweep worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Heartbeat sweep worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with sweep
            }
        }

        debug!("Requesting instance heartbeats...");
        if let Err(e) = manager
            .check_instance_heartbeats(RequestContext::admin())
            .await
        {
            error!("Heartbeat sweep failed: {}", e);
        }
    }
}
