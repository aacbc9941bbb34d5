//! Host telemetry carried in heartbeat replies

use sysinfo::System;

use brick_core::models::{HeartbeatReport, InstanceHealth};

/// Build a heartbeat report from the current host metrics and the
/// per-instance liveness results.
pub fn build_heartbeat(host: &str, instances: Vec<InstanceHealth>) -> HeartbeatReport {
    let mut sys = System::new_all();
    sys.refresh_all();

    HeartbeatReport {
        host: host.to_string(),
        instances,
        cpu_usage: sys.global_cpu_usage(),
        memory_used: sys.used_memory(),
        memory_total: sys.total_memory(),
        uptime_secs: System::uptime(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_carries_instances() {
        let report = build_heartbeat(
            "compute-1",
            vec![InstanceHealth {
                instance_id: "inst-1".to_string(),
                alive: true,
            }],
        );

        assert_eq!(report.host, "compute-1");
        assert_eq!(report.instances.len(), 1);
        assert!(report.memory_total > 0);
    }
}
