// Archival Scheduler
// Runs the archival pipeline on a fixed interval until shut down

use super::constants::ARCHIVAL_INTERVAL;
use super::{ArchivalPipeline, ArchivalState, CycleReport};
use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::error::{AppError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Archival scheduling configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalConfig {
    /// Time between cycle starts
    pub interval: Duration,
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            interval: ARCHIVAL_INTERVAL,
        }
    }
}

impl ArchivalConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }
}

/// Archival scheduler
///
/// The first cycle runs as soon as the scheduler starts; later cycles
/// follow every `interval`.
pub struct ArchivalScheduler {
    pipeline: Arc<ArchivalPipeline>,
    config: ArchivalConfig,
    reports: watch::Sender<Option<CycleReport>>,
}

impl ArchivalScheduler {
    pub fn new(pipeline: Arc<ArchivalPipeline>, config: ArchivalConfig) -> Result<Self> {
        if config.interval.is_zero() {
            return Err(AppError::Config(
                "archival interval must be greater than zero".to_string(),
            ));
        }

        let (reports, _) = watch::channel(None);
        Ok(Self {
            pipeline,
            config,
            reports,
        })
    }

    /// Spawn the scheduler loop on its own task
    pub fn start(self) -> ArchivalHandle {
        let (shutdown, token) = shutdown_channel();
        let state = self.pipeline.subscribe();
        let reports = self.reports.subscribe();

        let task = tokio::spawn(self.run(token));

        ArchivalHandle {
            shutdown,
            task,
            state,
            reports,
        }
    }

    /// Scheduler loop
    ///
    /// Exits when `shutdown` fires: immediately while waiting for the next
    /// tick, or after the current cycle when one is running.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Archival task started"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.wait() => break,
            }

            if shutdown.is_shutdown() {
                break;
            }

            info!("Archival cycle started");
            match self.pipeline.run_cycle().await {
                Ok(report) => {
                    info!(
                        scanned = report.scanned,
                        expired = report.expired,
                        archived = report.archived,
                        already_archived = report.already_archived,
                        failed = report.failed,
                        relation_failures = report.relation_failures,
                        delete_anomalies = report.delete_anomalies,
                        "Archival cycle finished"
                    );
                    self.reports.send_replace(Some(report));
                }
                Err(e) => error!(error = %e, "Archival cycle aborted"),
            }

            if shutdown.is_shutdown() {
                info!("Shutdown was requested during the archival cycle, no further cycles");
                break;
            }
        }

        self.pipeline.set_state(ArchivalState::Stopped);
        info!("Archival task shutdown successfully");
    }
}

/// Handle to a running archival scheduler
pub struct ArchivalHandle {
    shutdown: ShutdownSender,
    task: JoinHandle<()>,
    state: watch::Receiver<ArchivalState>,
    reports: watch::Receiver<Option<CycleReport>>,
}

impl ArchivalHandle {
    pub fn state(&self) -> ArchivalState {
        *self.state.borrow()
    }

    /// Observe pipeline state transitions
    pub fn state_watch(&self) -> watch::Receiver<ArchivalState> {
        self.state.clone()
    }

    /// Report of the most recent completed cycle
    pub fn last_report(&self) -> Option<CycleReport> {
        self.reports.borrow().clone()
    }

    /// Observe completed cycles
    pub fn reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.clone()
    }

    /// Stop the scheduler and wait for its task to end
    ///
    /// An in-flight cycle always runs to completion; callers that need a
    /// bound wrap this in their own timeout.
    pub async fn stop_task(self) -> Result<()> {
        let state = self.state();
        self.shutdown.shutdown();

        match state {
            ArchivalState::Scanning | ArchivalState::Migrating => info!(
                state = %state,
                "Stopping archival task, waiting for the current cycle to finish"
            ),
            _ => info!(state = %state, "Stopping archival task"),
        }

        self.task.await.map_err(|e| {
            AppError::unexpected("Archival task terminated abnormally", e.to_string())
        })
    }
}
