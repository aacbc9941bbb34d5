//! Per-instance channel layout
//!
//! Each instance exposes a command channel (Unix stream socket) and an
//! append-only execution log under the host's instances directory:
//!
//!   <instances_path>/<instance_id>/bricks/bricks.sock
//!   <instances_path>/<instance_id>/bricks/bricks.log
//!
//! The channel endpoints themselves are established out-of-band by the
//! hypervisor tooling; the agent only materializes the directory when it
//! is missing and talks to whatever is bound there.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

pub const SOCKET_NAME: &str = "bricks.sock";
pub const LOG_NAME: &str = "bricks.log";

#[derive(Debug, Clone)]
pub struct ChannelLayout {
    instances_path: PathBuf,
}

impl ChannelLayout {
    pub fn new(instances_path: impl Into<PathBuf>) -> Self {
        Self {
            instances_path: instances_path.into(),
        }
    }

    pub fn instances_path(&self) -> &Path {
        &self.instances_path
    }

    pub fn instance_dir(&self, instance_id: &str) -> PathBuf {
        self.instances_path.join(instance_id)
    }

    pub fn channel_dir(&self, instance_id: &str) -> PathBuf {
        self.instance_dir(instance_id).join("bricks")
    }

    pub fn socket_path(&self, instance_id: &str) -> PathBuf {
        self.channel_dir(instance_id).join(SOCKET_NAME)
    }

    pub fn log_path(&self, instance_id: &str) -> PathBuf {
        self.channel_dir(instance_id).join(LOG_NAME)
    }

    /// Make sure the channel directory exists so the hypervisor tooling
    /// can bind the socket into it. Returns true when it had to be
    /// created.
    pub async fn ensure_channel(&self, instance_id: &str) -> std::io::Result<bool> {
        let dir = self.channel_dir(instance_id);
        if fs::metadata(&dir).await.is_ok() {
            return Ok(false);
        }

        fs::create_dir_all(&dir).await?;
        info!(instance = instance_id, "channel directory created");
        Ok(true)
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::new("/var/lib/bricks/instances")
    }
}
