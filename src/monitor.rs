use std::sync::{Arc, Mutex};

use sysinfo::System;

use crate::registry::TaskRegistry;

/// Host CPU/RAM sampling and abort-status reporting, backing `GET /metrics`.
/// Sampling happens on demand, not on a background timer. `abort_status` is
/// informational only, read straight from the registry's cancellation tokens;
/// the Lifecycle Engine's per-task cancellation is the authoritative path.
pub struct HostMonitor {
    sys: Mutex<System>,
    registry: Arc<TaskRegistry>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HostStatus {
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub ram_used_mb: u64,
    pub ram_total_mb: u64,
    pub abort_status: bool,
}

impl HostMonitor {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self {
            sys: Mutex::new(sys),
            registry,
        }
    }

    pub fn sample(&self) -> HostStatus {
        let mut sys = self.sys.lock().expect("monitor mutex poisoned");
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu_percent = sys.global_cpu_info().cpu_usage();
        let total_mem = sys.total_memory();
        let used_mem = sys.used_memory();
        let ram_percent = if total_mem > 0 {
            (used_mem as f64 / total_mem as f64 * 100.0) as f32
        } else {
            0.0
        };

        HostStatus {
            cpu_percent,
            ram_percent,
            ram_used_mb: used_mem / 1024 / 1024,
            ram_total_mb: total_mem / 1024 / 1024,
            abort_status: self.registry.any_aborting(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_percentages_in_range() {
        let registry = Arc::new(TaskRegistry::new(8));
        let monitor = HostMonitor::new(registry);
        let status = monitor.sample();
        assert!(status.ram_percent >= 0.0 && status.ram_percent <= 100.0);
    }

    #[test]
    fn abort_status_reflects_cancelled_task() {
        let registry = Arc::new(TaskRegistry::new(8));
        let monitor = HostMonitor::new(registry.clone());
        let (id, _handle, _cancel) = registry.allocate("goal".to_string());
        assert!(!monitor.sample().abort_status);
        registry.cancel(&id);
        assert!(monitor.sample().abort_status);
    }
}
