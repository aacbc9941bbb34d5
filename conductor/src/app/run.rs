//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use brick_core::dispatch::{Topics, Transport};
use brick_core::pool::WorkerPool;
use brick_core::rpc::MortarClient;
use brick_core::store::Store;

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::ConductorError;
use crate::infra::Infrastructure;
use crate::manager::ConductorManager;
use crate::notify::Notifier;
use crate::partition::Partitioner;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::{deploying_sweep, heartbeat, init_sweep, orphan_sweep, version_sweep};
use crate::rpc;

/// Run the bricks conductor
pub async fn run(
    version: String,
    options: AppOptions,
    store: Arc<dyn Store>,
    infra: Arc<dyn Infrastructure>,
    notifier: Arc<dyn Notifier>,
    transport: Arc<dyn Transport>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ConductorError> {
    info!("Initializing Bricks Conductor...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager =
        ShutdownManager::new(shutdown_tx.clone(), options.max_shutdown_delay);

    let pool = Arc::new(WorkerPool::new(options.pool_size));
    let partitioner = Partitioner::new(options.host.clone(), options.conductors.clone());
    let mortar = MortarClient::new(transport.clone(), options.call_timeout);

    let manager = Arc::new(ConductorManager::new(
        store.clone(),
        infra,
        notifier,
        mortar,
        options.mortar_topic.clone(),
        pool.clone(),
        partitioner,
        options.deploy_params.clone(),
    ));

    let app_state = Arc::new(AppState {
        version,
        started_at: Instant::now(),
        manager: manager.clone(),
        store: store.clone(),
    });

    // Dispatch loop
    {
        let manager = manager.clone();
        let transport = transport.clone();
        let host_topic = Topics::conductor(&options.host);
        let shared_topic = Topics::conductor_shared();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
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
        });
        shutdown_manager.add_worker("dispatch", handle);
    }

    // Periodic sweeps
    {
        let sweep_options = options.init_sweep.clone();
        let manager = manager.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            init_sweep::run(
                &sweep_options,
                manager,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.add_worker("init_sweep", handle);
    }

    {
        let sweep_options = options.deploying_sweep.clone();
        let manager = manager.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            deploying_sweep::run(
                &sweep_options,
                manager,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.add_worker("deploying_sweep", handle);
    }

    {
        let sweep_options = options.heartbeat.clone();
        let manager = manager.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            heartbeat::run(
                &sweep_options,
                manager,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.add_worker("heartbeat", handle);
    }

    {
        let sweep_options = options.orphan_sweep.clone();
        let manager = manager.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            orphan_sweep::run(
                &sweep_options,
                manager,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.add_worker("orphan_sweep", handle);
    }

    {
        let sweep_options = options.version_sweep.clone();
        let manager = manager.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            version_sweep::run(
                &sweep_options,
                manager,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.add_worker("version_sweep", handle);
    }

    // Status server
    if options.enable_status_server {
        let server_state = Arc::new(ServerState {
            version: app_state.version.clone(),
            started_at: app_state.started_at,
            store: store.clone(),
        });
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = serve(&options.server, server_state, async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;
        shutdown_manager.with_server_handle(handle);
    }

    info!("Bricks Conductor running on host {}", options.host);
    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown(&pool).await
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    max_shutdown_delay: Duration,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    server_handle: Option<JoinHandle<Result<(), ConductorError>>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, max_shutdown_delay: Duration) -> Self {
        Self {
            shutdown_tx,
            max_shutdown_delay,
            workers: Vec::new(),
            server_handle: None,
        }
    }

    fn add_worker(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.workers.push((name, handle));
    }

    fn with_server_handle(&mut self, handle: JoinHandle<Result<(), ConductorError>>) {
        self.server_handle = Some(handle);
    }

    async fn shutdown(&mut self, pool: &WorkerPool) -> Result<(), ConductorError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.max_shutdown_delay, self.shutdown_impl(pool)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self, pool: &WorkerPool) -> Result<(), ConductorError> {
        info!("Shutting down Bricks Conductor...");

        for (name, handle) in self.workers.drain(..) {
            handle
                .await
                .map_err(|e| ConductorError::ShutdownError(format!("{name}: {e}")))?;
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| ConductorError::ShutdownError(e.to_string()))??;
        }

        // Let in-flight pool units finish before the store goes away
        pool.wait_idle().await;

        info!("Shutdown complete");
        Ok(())
    }
}
