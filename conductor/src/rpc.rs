//! Server side of the conductor dispatch API
//!
//! Drains the conductor topic and translates methods onto the manager.
//! Handler failures are logged; the loop itself only exits on shutdown.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{error, info, warn};

use brick_core::dispatch::{Delivery, Transport};
use brick_core::models::HeartbeatReport;
use brick_core::rpc::{BrickIdArgs, ReportLastTaskArgs, TailBrickLogArgs};

use crate::errors::ConductorError;
use crate::manager::ConductorManager;

/// Run the conductor dispatch loop, draining both the host-addressed
/// topic and the shared conductor topic.
pub async fn run(
    manager: Arc<ConductorManager>,
    transport: Arc<dyn Transport>,
    host_topic: String,
    shared_topic: String,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    let mut host_inbox = match transport.serve(&host_topic).await {
        Ok(inbox) => inbox,
        Err(e) => {
            error!(topic = %host_topic, "cannot serve conductor topic: {}", e);
            return;
        }
    };
    let mut shared_inbox = match transport.serve(&shared_topic).await {
        Ok(inbox) => inbox,
        Err(e) => {
            error!(topic = %shared_topic, "cannot serve conductor topic: {}", e);
            return;
        }
    };
    info!(host_topic = %host_topic, shared_topic = %shared_topic, "Conductor dispatch loop starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Conductor dispatch loop shutting down...");
                return;
            }
            delivery = host_inbox.recv() => {
                let Some(delivery) = delivery else {
                    warn!("conductor inbox closed, stopping dispatch loop");
                    return;
                };
                handle_delivery(&manager, delivery).await;
            }
            delivery = shared_inbox.recv() => {
                let Some(delivery) = delivery else {
                    warn!("conductor inbox closed, stopping dispatch loop");
                    return;
                };
                handle_delivery(&manager, delivery).await;
            }
        }
    }
}

async fn handle_delivery(manager: &ConductorManager, delivery: Delivery) {
    let Delivery { envelope, reply } = delivery;
    let method = envelope.method.clone();
    let context = envelope.context.clone();

    match method.as_str() {
        "do_brick_deploy" | "do_brick_deploying" | "do_brick_deployfail"
        | "do_brick_deploydone" | "do_brick_destroy" => {
            let args: BrickIdArgs = match envelope.parse_args() {
                Ok(args) => args,
                Err(e) => {
                    warn!(method = %method, "bad arguments, dropping: {}", e);
                    return;
                }
            };

            let result: Result<_, ConductorError> = match method.as_str() {
                "do_brick_deploy" => manager.do_brick_deploy(context, args.brick_id).await,
                "do_brick_deploying" => manager.do_brick_deploying(context, args.brick_id).await,
                "do_brick_deployfail" => manager.do_brick_deployfail(context, args.brick_id).await,
                "do_brick_deploydone" => manager.do_brick_deploydone(context, args.brick_id).await,
                _ => manager.do_brick_destroy(context, args.brick_id).await,
            };

            match result {
                // Fire-and-forget command; the worker owns the outcome
                Ok(_handle) => {}
                Err(e) if e.is_retryable() => {
                    warn!(method = %method, brick = %args.brick_id, "command deferred, retryable: {}", e);
                }
                Err(e) => error!(method = %method, brick = %args.brick_id, "command failed: {}", e),
            }
        }

        "do_report_last_task" => {
            let args: ReportLastTaskArgs = match envelope.parse_args() {
                Ok(args) => args,
                Err(e) => {
                    warn!(method = %method, "bad arguments, dropping: {}", e);
                    return;
                }
            };
            if let Err(e) = manager
                .do_report_last_task(context, &args.instance_id, args.status)
                .await
            {
                error!(instance = %args.instance_id, "task report failed: {}", e);
            }
        }

        "do_task_report" => {
            let report: HeartbeatReport = match envelope.parse_args() {
                Ok(report) => report,
                Err(e) => {
                    warn!(method = %method, "bad arguments, dropping: {}", e);
                    return;
                }
            };
            if let Err(e) = manager.do_task_report(context, report).await {
                error!("heartbeat report failed: {}", e);
            }
        }

        "do_tail_brick_log" => {
            let Some(reply) = reply else {
                warn!(method = %method, "tail requires a call, cast dropped");
                return;
            };
            let args: TailBrickLogArgs = match envelope.parse_args() {
                Ok(args) => args,
                Err(e) => {
                    reply.send(Err(e.to_string()));
                    return;
                }
            };

            match manager
                .do_tail_brick_log(context, args.brick_uuid, args.length)
                .await
            {
                Ok(log) => reply.send(serde_json::to_value(&log).map_err(|e| e.to_string())),
                Err(e) => reply.send(Err(e.to_string())),
            }
        }

        other => warn!(method = other, "unknown conductor method, dropping"),
    }
}
