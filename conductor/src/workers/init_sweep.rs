//! Initialization sweep worker
//!
//! Pushes rendered configuration to every owned brick sitting in INIT.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use brick_core::dispatch::RequestContext;

use crate::manager::ConductorManager;

/// Init sweep options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Run the initialization sweep worker
pub async fn run<S, F>(
    options: &Options,
    manager: Arc<ConductorManager>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Init sweep worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Init sweep worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with sweep
            }
        }

        debug!("Sweeping initializing bricks...");
        if let Err(e) = manager
            .initiate_initialized_bricks(RequestContext::admin())
            .await
        {
            error!("Init sweep failed: {}", e);
        }
    }
}
