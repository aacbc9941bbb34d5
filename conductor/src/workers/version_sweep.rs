//! Version sync sweep worker
//!
//! Keeps each brick's recorded application version aligned with its
//! brickconfig.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use brick_core::dispatch::RequestContext;

use crate::manager::ConductorManager;

/// Version sweep options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Run the version sync sweep worker
pub async fn run<S, F>(
    options: &Options,
    manager: Arc<ConductorManager>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Version sweep worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Version sweep worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with sweep
            }
        }

        debug!("Syncing brick versions...");
        if let Err(e) = manager.set_bricks_versions(RequestContext::admin()).await {
            error!("Version sweep failed: {}", e);
        }
    }
}
