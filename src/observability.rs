use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Task and device counters for the running process
#[derive(Debug, Default)]
pub struct TaskMetrics {
    pub tasks_started: AtomicU64,
    pub tasks_succeeded: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub items_not_identified: AtomicU64,
    pub probe_attempts: AtomicU64,
    pub compensating_maneuvers: AtomicU64,
    pub device_faults: AtomicU64,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_task_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_succeeded(&self) {
        self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_identified(&self) {
        self.items_not_identified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_attempt(&self) {
        self.probe_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_maneuver(&self) {
        self.compensating_maneuvers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_fault(&self) {
        self.device_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> TaskStats {
        TaskStats {
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            items_not_identified: self.items_not_identified.load(Ordering::Relaxed),
            probe_attempts: self.probe_attempts.load(Ordering::Relaxed),
            compensating_maneuvers: self.compensating_maneuvers.load(Ordering::Relaxed),
            device_faults: self.device_faults.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Task metrics: started={}, succeeded={}, failed={}, not_identified={}, probe_attempts={}, maneuvers={}, device_faults={}",
            stats.tasks_started,
            stats.tasks_succeeded,
            stats.tasks_failed,
            stats.items_not_identified,
            stats.probe_attempts,
            stats.compensating_maneuvers,
            stats.device_faults
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStats {
    pub tasks_started: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub items_not_identified: u64,
    pub probe_attempts: u64,
    pub compensating_maneuvers: u64,
    pub device_faults: u64,
}

/// Global metrics instance
static TASK_METRICS: std::sync::LazyLock<TaskMetrics> = std::sync::LazyLock::new(TaskMetrics::new);

pub fn task_metrics() -> &'static TaskMetrics {
    &TASK_METRICS
}

/// Logs how long an operation took when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        debug!(
            operation = %self.operation,
            elapsed_ms = elapsed.as_millis() as u64,
            "Operation finished"
        );
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = TaskMetrics::new();
        metrics.record_task_started();
        metrics.record_task_started();
        metrics.record_task_succeeded();
        metrics.record_not_identified();
        metrics.record_probe_attempt();
        metrics.record_probe_attempt();
        metrics.record_maneuver();

        let stats = metrics.get_stats();
        assert_eq!(stats.tasks_started, 2);
        assert_eq!(stats.tasks_succeeded, 1);
        assert_eq!(stats.items_not_identified, 1);
        assert_eq!(stats.probe_attempts, 2);
        assert_eq!(stats.compensating_maneuvers, 1);
        assert_eq!(stats.device_faults, 0);
    }
}
