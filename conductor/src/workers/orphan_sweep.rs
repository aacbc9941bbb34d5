//! Orphan cleanup sweep worker
//!
//! Deletes brick records whose compute instance no longer exists at the
//! provider. Best-effort consistency repair.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use brick_core::dispatch::RequestContext;

use crate::manager::ConductorManager;

/// Orphan sweep options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Run the orphan cleanup sweep worker
pub async fn run<S, F>(
    options: &Options,
    manager: Arc<ConductorManager>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Orphan cleanup worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Orphan cleanup worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with sweep
            }
        }

        debug!("Checking for deleted instances...");
        match manager
            .check_for_deleted_instances(RequestContext::admin())
            .await
        {
            // The pool worker owns the sweep from here; its outcome lands
            // in the log.
            Ok(_handle) => {}
            Err(e) => error!("Orphan cleanup could not start: {}", e),
        }
    }
}
