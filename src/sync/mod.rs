//! Air-quality synchronization pipeline.
//!
//! One call to [`SyncService::run_sync`] is one sync run:
//! 1. open an `in_progress` audit record
//! 2. load the city registry (capped)
//! 3. fetch and upsert every city independently, counting soft failures
//! 4. seal the audit record exactly once
//!
//! Per-city provider failures never abort a run. A reading store failure or an
//! elapsed run deadline stops the iteration and seals the run as `failed`
//! with the counters accumulated so far.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::models::{City, SyncRunSummary, SyncSeal, SyncStatus, SyncType};
use crate::provider::AirQualityProvider;
use crate::store::{CityRegistry, ReadingStore, StoreError, SyncAuditLog};

pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use scheduler::Scheduler;

// ---

/// Reason recorded when a run finds no cities to fetch.
pub const NO_CITIES_FOUND: &str = "no_cities_found";

/// Reason recorded when every city failed and the run is configured to fail.
pub const ALL_CITIES_FAILED: &str = "all_cities_failed";

/// Run-level errors returned to the caller.
#[derive(Debug, Error)]
pub enum SyncError {
    // ---
    #[error("unknown data source `{0}`")]
    UnknownSource(String),

    #[error("sync setup failed: {0}")]
    Setup(#[source] StoreError),

    #[error("failed to seal sync run {run_id}: {source}")]
    Seal {
        run_id: i64,
        #[source]
        source: StoreError,
    },
}

/// Success and failure counters for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    // ---
    success: i32,
    fail: i32,
}

/// Drives sync runs against injected collaborators.
pub struct SyncService {
    // ---
    cities: Arc<dyn CityRegistry>,
    readings: Arc<dyn ReadingStore>,
    audit: Arc<dyn SyncAuditLog>,
    provider: Arc<dyn AirQualityProvider>,
    config: SyncConfig,
}

impl SyncService {
    // ---
    pub fn new(
        cities: Arc<dyn CityRegistry>,
        readings: Arc<dyn ReadingStore>,
        audit: Arc<dyn SyncAuditLog>,
        provider: Arc<dyn AirQualityProvider>,
        config: SyncConfig,
    ) -> Self {
        Self {
            cities,
            readings,
            audit,
            provider,
            config,
        }
    }

    /// Data source label of the configured provider.
    pub fn data_source(&self) -> &str {
        self.provider.source_name()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Execute one complete sync run and return its sealed summary.
    ///
    /// # Errors
    /// - [`SyncError::UnknownSource`] when `data_source` is not served by the provider
    /// - [`SyncError::Setup`] when the audit record cannot be opened or the
    ///   registry cannot be read (the latter after sealing the run as `failed`)
    /// - [`SyncError::Seal`] when the terminal audit update fails
    pub async fn run_sync(&self, sync_type: SyncType, data_source: &str) -> Result<SyncRunSummary, SyncError> {
        // ---
        if !data_source.eq_ignore_ascii_case(self.provider.source_name()) {
            return Err(SyncError::UnknownSource(data_source.to_string()));
        }

        let span = tracing::info_span!(
            "sync_run",
            key = %Uuid::new_v4(),
            sync_type = sync_type.as_str(),
            data_source,
            run_id = tracing::field::Empty,
        );
        self.run_sync_inner(sync_type, self.provider.source_name())
            .instrument(span)
            .await
    }

    async fn run_sync_inner(&self, sync_type: SyncType, data_source: &str) -> Result<SyncRunSummary, SyncError> {
        // ---
        let start_time = Utc::now();
        let run_id = self
            .audit
            .open_run(sync_type, data_source, start_time, SyncStatus::InProgress)
            .await
            .map_err(SyncError::Setup)?;
        tracing::Span::current().record("run_id", run_id);
        info!("Sync run started");

        let cities = match self.cities.list_cities(1, self.config.city_cap).await {
            Ok((cities, _total)) => cities,
            Err(err) => {
                warn!(error = %err, "City registry unreadable, aborting run");
                let seal = SyncSeal {
                    end_time: Utc::now(),
                    status: SyncStatus::Failed,
                    success_count: 0,
                    fail_count: 0,
                    total_count: 0,
                    error_message: Some(err.to_string()),
                };
                if let Err(seal_err) = self.audit.seal_run(run_id, &seal).await {
                    warn!(error = %seal_err, "Failed to seal aborted run");
                }
                return Err(SyncError::Setup(err));
            }
        };

        if cities.is_empty() {
            warn!("No cities registered, aborting run");
            let seal = SyncSeal {
                end_time: Utc::now(),
                status: SyncStatus::Failed,
                success_count: 0,
                fail_count: 0,
                total_count: 0,
                error_message: Some(NO_CITIES_FOUND.to_string()),
            };
            return self.seal(run_id, sync_type, data_source, start_time, seal).await;
        }

        let mut tally = Tally::default();
        let outcome = match self.config.run_deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.fetch_all(&cities, data_source, &mut tally))
                .await
                .unwrap_or_else(|_| Err(format!("deadline_exceeded after {}s", deadline.as_secs()))),
            None => self.fetch_all(&cities, data_source, &mut tally).await,
        };

        let seal = match outcome {
            Ok(()) => {
                let total_count = i32::try_from(cities.len()).unwrap_or(i32::MAX);
                let all_failed = tally.success == 0 && total_count > 0;
                let (status, error_message) = if all_failed && self.config.fail_on_total_failure {
                    (SyncStatus::Failed, Some(ALL_CITIES_FAILED.to_string()))
                } else {
                    (SyncStatus::Success, None)
                };
                SyncSeal {
                    end_time: Utc::now(),
                    status,
                    success_count: tally.success,
                    fail_count: tally.fail,
                    total_count,
                    error_message,
                }
            }
            Err(message) => {
                warn!(error = %message, "Sync run aborted mid-iteration");
                SyncSeal {
                    end_time: Utc::now(),
                    status: SyncStatus::Failed,
                    success_count: tally.success,
                    fail_count: tally.fail,
                    total_count: tally.success + tally.fail,
                    error_message: Some(message),
                }
            }
        };

        self.seal(run_id, sync_type, data_source, start_time, seal).await
    }

    /// Fetch and store every city, accumulating into `tally`.
    ///
    /// Returns `Err` with a message only for run-level failures.
    async fn fetch_all(&self, cities: &[City], data_source: &str, tally: &mut Tally) -> Result<(), String> {
        // ---
        let attempts: Vec<_> = cities
            .iter()
            .map(|city| self.sync_city(city, data_source))
            .collect();
        let mut outcomes = stream::iter(attempts).buffer_unordered(self.config.concurrency.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(true) => tally.success += 1,
                Ok(false) => tally.fail += 1,
                Err(err) => return Err(err.to_string()),
            }
        }
        Ok(())
    }

    /// Fetch one city and upsert its reading.
    ///
    /// `Ok(false)` is a soft failure; `Err` means the reading store failed.
    async fn sync_city(&self, city: &City, data_source: &str) -> Result<bool, StoreError> {
        // ---
        match self.provider.fetch(&city.name, city.province.as_deref()).await {
            Ok(reading) => {
                let id = self.readings.upsert_reading(city.id, &reading, data_source).await?;
                debug!(city_id = city.id, reading_id = id, aqi = ?reading.aqi, "Reading stored");
                Ok(true)
            }
            Err(err) => {
                warn!(city_id = city.id, city = %city.name, error = %err, "City fetch failed");
                Ok(false)
            }
        }
    }

    async fn seal(
        &self,
        run_id: i64,
        sync_type: SyncType,
        data_source: &str,
        start_time: chrono::DateTime<Utc>,
        seal: SyncSeal,
    ) -> Result<SyncRunSummary, SyncError> {
        // ---
        self.audit
            .seal_run(run_id, &seal)
            .await
            .map_err(|source| SyncError::Seal { run_id, source })?;

        info!(
            status = seal.status.as_str(),
            success = seal.success_count,
            failed = seal.fail_count,
            total = seal.total_count,
            "Sync run sealed"
        );

        Ok(SyncRunSummary {
            run_id,
            sync_type,
            data_source: data_source.to_string(),
            start_time,
            end_time: seal.end_time,
            status: seal.status,
            success_count: seal.success_count,
            fail_count: seal.fail_count,
            total_count: seal.total_count,
            error_message: seal.error_message,
        })
    }
}
