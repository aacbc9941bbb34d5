//! Server side of the mortar dispatch API
//!
//! Drains the host-addressed topic and the shared worker topic, handing
//! methods to the manager. Handler failures are logged; the loop only
//! exits on shutdown.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{error, info, warn};

use brick_core::dispatch::{Delivery, Transport};
use brick_core::rpc::{CheckInstancesArgs, ExecuteArgs, InstanceArgs, TailLogArgs};

use crate::manager::MortarManager;

/// Run the mortar dispatch loop
pub async fn run(
    manager: Arc<MortarManager>,
    transport: Arc<dyn Transport>,
    host_topic: String,
    shared_topic: String,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    let mut host_inbox = match transport.serve(&host_topic).await {
        Ok(inbox) => inbox,
        Err(e) => {
            error!(topic = %host_topic, "cannot serve mortar topic: {}", e);
            return;
        }
    };
    let mut shared_inbox = match transport.serve(&shared_topic).await {
        Ok(inbox) => inbox,
        Err(e) => {
            error!(topic = %shared_topic, "cannot serve mortar topic: {}", e);
            return;
        }
    };
    info!(host_topic = %host_topic, shared_topic = %shared_topic, "Mortar dispatch loop starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Mortar dispatch loop shutting down...");
                return;
            }
            delivery = host_inbox.recv() => {
                let Some(delivery) = delivery else {
                    warn!("mortar inbox closed, stopping dispatch loop");
                    return;
                };
                handle_delivery(&manager, delivery).await;
            }
            delivery = shared_inbox.recv() => {
                let Some(delivery) = delivery else {
                    warn!("mortar inbox closed, stopping dispatch loop");
                    return;
                };
                handle_delivery(&manager, delivery).await;
            }
        }
    }
}

async fn handle_delivery(manager: &MortarManager, delivery: Delivery) {
    let Delivery { envelope, reply } = delivery;
    let method = envelope.method.clone();
    let context = envelope.context.clone();

    match method.as_str() {
        "do_ping" => manager.do_ping(context).await,

        "do_execute" => {
            let args: ExecuteArgs = match envelope.parse_args() {
                Ok(args) => args,
                Err(e) => {
                    warn!(method = %method, "bad arguments, dropping: {}", e);
                    return;
                }
            };
            if let Err(e) = manager.do_execute(context, args.task).await {
                error!("execution task failed to start: {}", e);
            }
        }

        "do_check_last_task" => {
            let args: InstanceArgs = match envelope.parse_args() {
                Ok(args) => args,
                Err(e) => {
                    warn!(method = %method, "bad arguments, dropping: {}", e);
                    return;
                }
            };
            if let Err(e) = manager.do_check_last_task(context, args.instance_id).await {
                error!("last-task check failed to start: {}", e);
            }
        }

        "do_check_instances" => {
            let args: CheckInstancesArgs = match envelope.parse_args() {
                Ok(args) => args,
                Err(e) => {
                    warn!(method = %method, "bad arguments, dropping: {}", e);
                    return;
                }
            };
            if let Err(e) = manager.do_check_instances(context, args.instances).await {
                error!("health check failed to start: {}", e);
            }
        }

        "do_tail_brick_log" => {
            let Some(reply) = reply else {
                warn!(method = %method, "tail requires a call, cast dropped");
                return;
            };
            let args: TailLogArgs = match envelope.parse_args() {
                Ok(args) => args,
                Err(e) => {
                    reply.send(Err(e.to_string()));
                    return;
                }
            };

            match manager
                .do_tail_brick_log(context, args.instance_id, args.length)
                .await
            {
                Ok(log) => reply.send(serde_json::to_value(&log).map_err(|e| e.to_string())),
                Err(e) => reply.send(Err(e.to_string())),
            }
        }

        other => warn!(method = other, "unknown mortar method, dropping"),
    }
}
