use anyhow::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::observability::task_metrics;
use crate::orchestrator::TaskOrchestrator;

/// Graceful shutdown coordinator for slotkeeper
pub struct ShutdownCoordinator {
    /// How long a running task may keep the arm before shutdown gives up on it
    drain_timeout: Duration,
    log_metrics: bool,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(120), true)
    }
}

impl ShutdownCoordinator {
    pub fn new(drain_timeout: Duration, log_metrics: bool) -> Self {
        Self {
            drain_timeout,
            log_metrics,
        }
    }

    pub fn with_metrics(mut self, log_metrics: bool) -> Self {
        self.log_metrics = log_metrics;
        self
    }

    /// Resolve on SIGINT, or SIGTERM on unix
    pub async fn wait_for_signal() -> Result<()> {
        #[cfg(unix)]
        {
            let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        tokio::signal::ctrl_c().await?;

        info!("Shutdown signal received");
        Ok(())
    }

    /// Release the arm and log final statistics.
    ///
    /// Tasks are never cancelled mid-motion, so this first waits for the
    /// workcell to be free.
    pub async fn shutdown_all_services(&self, orchestrator: &TaskOrchestrator) -> Result<()> {
        info!("Initiating graceful shutdown...");

        if timeout(self.drain_timeout, orchestrator.shutdown()).await.is_err() {
            warn!(
                timeout_s = self.drain_timeout.as_secs(),
                "Timed out waiting for the running task; arm left connected"
            );
        }

        if self.log_metrics {
            task_metrics().log_stats();
        }

        info!("Graceful shutdown completed");
        Ok(())
    }
}
