//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use brick_core::dispatch::{Topics, Transport};
use brick_core::pool::WorkerPool;
use brick_core::rpc::ConductorClient;

use crate::app::options::AppOptions;
use crate::channel::ChannelLayout;
use crate::errors::MortarError;
use crate::instances::{InstanceHost, LocalInstances};
use crate::manager::MortarManager;
use crate::rpc;

/// Run the bricks mortar agent
pub async fn run(
    options: AppOptions,
    transport: Arc<dyn Transport>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), MortarError> {
    info!("Initializing Bricks Mortar...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);

    let layout = ChannelLayout::new(options.instances_path.clone());
    let instances: Arc<dyn InstanceHost> = Arc::new(LocalInstances::new(layout.clone()));
    let pool = Arc::new(WorkerPool::new(options.pool_size));
    let conductor = ConductorClient::new(transport.clone(), options.call_timeout);

    let manager = Arc::new(MortarManager::new(
        options.host.clone(),
        layout,
        instances,
        conductor,
        options.conductor_topic.clone(),
        pool.clone(),
        options.socket_timeout,
    ));

    // Dispatch loop
    let dispatch_handle = {
        let manager = manager.clone();
        let transport = transport.clone();
        let host_topic = Topics::mortar(&options.host);
        let shared_topic = Topics::mortar_shared();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            rpc::run(
                manager,
                transport,
                host_topic,
                shared_topic,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        })
    };

    info!("Bricks Mortar running on host {}", options.host);
    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    let _ = shutdown_tx.send(());
    drop(shutdown_tx);
    shutdown(options.max_shutdown_delay, dispatch_handle, &pool).await
}

async fn shutdown(
    max_delay: Duration,
    dispatch_handle: JoinHandle<()>,
    pool: &WorkerPool,
) -> Result<(), MortarError> {
    let drain = async {
        dispatch_handle
            .await
            .map_err(|e| MortarError::ShutdownError(e.to_string()))?;

        // Let in-flight units report before the process goes away
        pool.wait_idle().await;
        Ok(())
    };

    match tokio::time::timeout(max_delay, drain).await {
        Ok(result) => {
            info!("Shutdown complete");
            result
        }
        Err(_) => {
            error!("Shutdown timed out after {:?}, forcing shutdown...", max_delay);
            std::process::exit(1);
        }
    }
}
