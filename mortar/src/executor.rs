//! Agent task executor
//!
//! Pushes rendered configuration into an instance over its channel socket
//! and reads task outcomes back out of the instance log. Channel trouble
//! is an ERROR outcome, a channel that is not there yet is
//! INSUFFICIENT-DATA; neither ever propagates as an error to the caller.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use brick_core::models::ExecutionTask;
use brick_core::states::TaskStatus;

use crate::channel::ChannelLayout;
use crate::instances::InstanceHost;

/// Push an execution task to its instance.
///
/// A missing channel means the instance is not ready: recovery is
/// initiated (channel ensured, instance start requested) and the outcome
/// is INSUFFICIENT-DATA so the conductor re-checks later.
pub async fn do_execute(
    layout: &ChannelLayout,
    host: &dyn InstanceHost,
    task: &ExecutionTask,
    io_timeout: Duration,
) -> TaskStatus {
    let socket_path = layout.socket_path(&task.instance_id);

    if tokio::fs::metadata(&socket_path).await.is_err() {
        debug!(instance = %task.instance_id, "channel socket missing, starting recovery");
        if let Err(e) = layout.ensure_channel(&task.instance_id).await {
            warn!(instance = %task.instance_id, "channel recovery failed: {}", e);
            return TaskStatus::Error;
        }
        if let Err(e) = host.start_instance(&task.instance_id).await {
            warn!(instance = %task.instance_id, "instance start failed: {}", e);
            return TaskStatus::Error;
        }
        return TaskStatus::InsufficientData;
    }

    match push_payload(&socket_path, task, io_timeout).await {
        Ok(()) => TaskStatus::Running,
        Err(e) => {
            warn!(instance = %task.instance_id, "channel push failed: {}", e);
            TaskStatus::Error
        }
    }
}

async fn push_payload(
    socket_path: &std::path::Path,
    task: &ExecutionTask,
    io_timeout: Duration,
) -> std::io::Result<()> {
    let mut stream = timeout(io_timeout, UnixStream::connect(socket_path))
        .await
        .map_err(elapsed)??;

    send(&mut stream, b"StartStream\n", io_timeout).await?;
    for (filename, contents) in &task.files {
        send(&mut stream, format!("BOF {}\n", filename).as_bytes(), io_timeout).await?;
        send(&mut stream, contents.as_bytes(), io_timeout).await?;
        send(&mut stream, b"\nEOF\n", io_timeout).await?;
    }
    send(&mut stream, b"StopStream\n", io_timeout).await?;

    timeout(io_timeout, stream.flush()).await.map_err(elapsed)??;
    Ok(())
}

async fn send(stream: &mut UnixStream, bytes: &[u8], io_timeout: Duration) -> std::io::Result<()> {
    timeout(io_timeout, stream.write_all(bytes))
        .await
        .map_err(elapsed)?
}

fn elapsed(_: tokio::time::error::Elapsed) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "channel operation timed out")
}

/// Scan the instance log from the end for the most recent recognized
/// status marker. No marker (or no log yet) is INSUFFICIENT-DATA.
pub async fn do_check_last_task(layout: &ChannelLayout, instance_id: &str) -> TaskStatus {
    let log_path = layout.log_path(instance_id);

    let log = match tokio::fs::read_to_string(&log_path).await {
        Ok(log) => log,
        Err(_) => return TaskStatus::InsufficientData,
    };

    for line in log.lines().rev() {
        if let Some(status) = TaskStatus::from_marker(line) {
            return status;
        }
    }

    TaskStatus::InsufficientData
}

/// Last `length` lines of the instance log. An absent log reads as
/// empty.
pub async fn tail_log(
    layout: &ChannelLayout,
    instance_id: &str,
    length: usize,
) -> std::io::Result<String> {
    let log_path = layout.log_path(instance_id);

    let log = match tokio::fs::read_to_string(&log_path).await {
        Ok(log) => log,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e),
    };

    let lines: Vec<&str> = log.lines().collect();
    let start = lines.len().saturating_sub(length);
    Ok(lines[start..].join("\n"))
}
