//! Recurring trigger for scheduled sync runs.
//!
//! The scheduler is an owned value created at startup and stopped during
//! shutdown. It holds at most one recurring job; starting it again replaces
//! the previous job instead of adding a second timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

use super::SyncService;
use crate::models::SyncType;

// ---

/// Identifier of the single recurring job.
pub const SYNC_JOB_ID: &str = "sync_air_quality";

struct Job {
    // ---
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the background task that triggers `run_sync(scheduled, source)` every period.
pub struct Scheduler {
    // ---
    service: Arc<SyncService>,
    data_source: String,
    job: Option<Job>,
}

impl Scheduler {
    // ---
    pub fn new(service: Arc<SyncService>, data_source: impl Into<String>) -> Self {
        Self {
            service,
            data_source: data_source.into(),
            job: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.job.as_ref().is_some_and(|job| !job.handle.is_finished())
    }

    /// Register the recurring job; the first run fires one `period` from now.
    ///
    /// An already registered job is cancelled and replaced. A run it has in
    /// flight is allowed to finish.
    pub fn start(&mut self, period: Duration) {
        // ---
        if let Some(previous) = self.job.take() {
            info!(job = SYNC_JOB_ID, "Replacing existing sync job");
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let service = Arc::clone(&self.service);
        let data_source = self.data_source.clone();
        let token = cancel.clone();

        let task = async move {
            // ---
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match service.run_sync(SyncType::Scheduled, &data_source).await {
                    Ok(summary) => info!(
                        run_id = summary.run_id,
                        status = summary.status.as_str(),
                        "Scheduled sync finished"
                    ),
                    Err(err) => error!(error = %err, "Scheduled sync failed"),
                }
            }
            info!("Sync job stopped");
        };

        let handle = tokio::spawn(task.instrument(tracing::info_span!("scheduler", job = SYNC_JOB_ID)));
        info!(job = SYNC_JOB_ID, period_secs = period.as_secs(), "Sync job registered");
        self.job = Some(Job { cancel, handle });
    }

    /// Cancel the job and wait for an in-flight run to complete.
    pub async fn stop(&mut self) {
        // ---
        if let Some(job) = self.job.take() {
            job.cancel.cancel();
            if let Err(err) = job.handle.await {
                error!(error = %err, "Sync job terminated abnormally");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            job.cancel.cancel();
        }
    }
}
