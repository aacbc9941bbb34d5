//! Host instance enumeration
//!
//! The agent needs to know which instances are present and running on
//! this host before it pushes anything. The hypervisor surface itself is
//! not the agent's business; this trait is the narrow slice it consumes.

use async_trait::async_trait;
use tracing::info;

use crate::channel::ChannelLayout;

#[async_trait]
pub trait InstanceHost: Send + Sync {
    /// Ids of instances currently running on this host.
    async fn running_instances(&self) -> std::io::Result<Vec<String>>;

    /// Start an instance that is present but not running.
    async fn start_instance(&self, instance_id: &str) -> std::io::Result<()>;
}

/// Directory-backed host view: an instance is present when its directory
/// exists under the instances path, and running when its channel socket
/// is bound.
pub struct LocalInstances {
    layout: ChannelLayout,
}

impl LocalInstances {
    pub fn new(layout: ChannelLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl InstanceHost for LocalInstances {
    async fn running_instances(&self) -> std::io::Result<Vec<String>> {
        let mut running = Vec::new();

        let mut entries = match tokio::fs::read_dir(self.layout.instances_path()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(running),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let instance_id = entry.file_name().to_string_lossy().to_string();
            if tokio::fs::metadata(self.layout.socket_path(&instance_id))
                .await
                .is_ok()
            {
                running.push(instance_id);
            }
        }

        running.sort();
        Ok(running)
    }

    async fn start_instance(&self, instance_id: &str) -> std::io::Result<()> {
        // Starting a domain is hypervisor tooling's job; record the intent
        // so operators can see the agent asked for it.
        info!(instance = instance_id, "requesting instance start");
        self.layout.ensure_channel(instance_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_running_requires_bound_socket() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ChannelLayout::new(dir.path());
        let host = LocalInstances::new(layout.clone());

        // Present but no socket: not running
        layout.ensure_channel("inst-1").await.unwrap();
        assert!(host.running_instances().await.unwrap().is_empty());

        // Bind the socket: running
        let _listener = tokio::net::UnixListener::bind(layout.socket_path("inst-1")).unwrap();
        assert_eq!(host.running_instances().await.unwrap(), vec!["inst-1"]);
    }

    #[tokio::test]
    async fn test_missing_instances_path_is_empty() {
        let layout = ChannelLayout::new("/nonexistent/bricks/instances");
        let host = LocalInstances::new(layout);
        assert!(host.running_instances().await.unwrap().is_empty());
    }
}
