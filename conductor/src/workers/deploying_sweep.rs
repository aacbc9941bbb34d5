//! Deploying sweep worker
//!
//! Asks agents for the last task outcome of every owned DEPLOYING brick.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use brick_core::dispatch::RequestContext;

use crate::manager::ConductorManager;

/// Deploying sweep options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
        }
    }
}

/// Run the deploying sweep worker
pub async fn run<S, F>(
    options: &Options,
    manager: Arc<ConductorManager>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Deploying sweep worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deploying sweep worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with sweep
            }
        }

        debug!("Sweeping deploying bricks...");
        if let Err(e) = manager.check_deploying_bricks(RequestContext::admin()).await {
            error!("Deploying sweep failed: {}", e);
        }
    }
}
