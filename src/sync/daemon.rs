// ABOUTME: SyncDaemon - repeats sync cycles at a fixed interval until shutdown
// ABOUTME: Each cycle is a full orchestrator run; failures are logged and the loop continues

use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use super::connection::Connector;
use super::orchestrator::SyncOrchestrator;

/// Drives [`SyncOrchestrator::run`] on a schedule.
pub struct SyncDaemon<C> {
    orchestrator: SyncOrchestrator<C>,
    sync_interval: Duration,
}

impl<C: Connector> SyncDaemon<C> {
    pub fn new(orchestrator: SyncOrchestrator<C>, sync_interval: Duration) -> Self {
        Self {
            orchestrator,
            sync_interval,
        }
    }

    /// Run cycles until a shutdown signal arrives. Returns the number of cycles started.
    ///
    /// A cycle in progress when shutdown is signalled is abandoned; its tables keep
    /// their previous watermarks and are picked up again on the next start.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<u64> {
        let mut ticker = interval(self.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        tracing::info!(
            "Starting SyncDaemon with sync_interval={:?}",
            self.sync_interval
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping SyncDaemon");
                    break;
                }
                _ = ticker.tick() => {
                    cycles += 1;
                    tracing::info!("Starting sync cycle {}", cycles);

                    tokio::select! {
                        biased;
                        _ = shutdown.recv() => {
                            tracing::info!("Shutdown signal received during sync cycle, aborting");
                            break;
                        }
                        result = self.orchestrator.run() => {
                            match result {
                                Ok(report) => {
                                    report.log_summary();
                                    if report.is_fatal() {
                                        tracing::warn!("Sync cycle {}: every table failed", cycles);
                                    }
                                }
                                Err(e) => {
                                    tracing::error!("Sync cycle {} failed: {:?}", cycles, e);
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(cycles)
    }
}
