//! In-memory collaborators for sync pipeline tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::SyncService;
use crate::config::SyncConfig;
use crate::models::{City, NormalizedReading, Pollutants, SyncSeal, SyncStatus, SyncType};
use crate::provider::{AirQualityProvider, FetchError};
use crate::store::{CityRegistry, ReadingStore, StoreError, SyncAuditLog};

// ---

#[derive(Debug, Clone)]
pub struct StoredReading {
    // ---
    pub id: i64,
    pub city_id: i64,
    pub reading: NormalizedReading,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    // ---
    pub id: i64,
    pub sync_type: SyncType,
    pub data_source: String,
    pub status: SyncStatus,
    pub end_time: Option<DateTime<Utc>>,
    pub success_count: i32,
    pub fail_count: i32,
    pub total_count: i32,
    pub error_message: Option<String>,
}

#[derive(Default)]
struct Inner {
    // ---
    cities: Vec<City>,
    readings: BTreeMap<(i64, DateTime<Utc>), StoredReading>,
    runs: Vec<RunRecord>,
    next_reading_id: i64,
    upserts: usize,
}

/// Cities, readings and sync runs held in memory, with failure switches.
#[derive(Clone, Default)]
pub struct MemoryStore {
    // ---
    inner: Arc<Mutex<Inner>>,
    fail_open: Arc<AtomicBool>,
    open_attempts: Arc<AtomicUsize>,
    fail_list: Arc<AtomicBool>,
    fail_upserts_after: Arc<Mutex<Option<usize>>>,
}

impl MemoryStore {
    // ---
    pub fn with_cities(cities: &[(i64, &str)]) -> Self {
        // ---
        let store = Self::default();
        store.inner.lock().unwrap().cities = cities
            .iter()
            .map(|(id, name)| City {
                id: *id,
                name: name.to_string(),
                province: None,
                lat: None,
                lon: None,
            })
            .collect();
        store
    }

    pub fn fail_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    pub fn recover_open(&self) {
        self.fail_open.store(false, Ordering::SeqCst);
    }

    /// Number of `open_run` calls, failed ones included.
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    /// Let `n` upserts succeed, then fail every later one.
    pub fn fail_upserts_after(&self, n: usize) {
        *self.fail_upserts_after.lock().unwrap() = Some(n);
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.inner.lock().unwrap().runs.clone()
    }

    pub fn readings(&self) -> Vec<StoredReading> {
        self.inner.lock().unwrap().readings.values().cloned().collect()
    }
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl CityRegistry for MemoryStore {
    async fn list_cities(&self, page: u32, page_size: u32) -> Result<(Vec<City>, i64), StoreError> {
        // ---
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let inner = self.inner.lock().unwrap();
        let mut cities = inner.cities.clone();
        cities.sort_by(|a, b| a.name.cmp(&b.name));
        let skip = (page.max(1) as usize - 1) * page_size as usize;
        let items = cities.into_iter().skip(skip).take(page_size as usize).collect();
        Ok((items, inner.cities.len() as i64))
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn upsert_reading(
        &self,
        city_id: i64,
        reading: &NormalizedReading,
        source: &str,
    ) -> Result<i64, StoreError> {
        // ---
        let limit = *self.fail_upserts_after.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        if limit.is_some_and(|limit| inner.upserts >= limit) {
            return Err(unavailable());
        }
        inner.upserts += 1;

        let key = (city_id, reading.recorded_time);
        let id = match inner.readings.get(&key) {
            Some(existing) => existing.id,
            None => {
                inner.next_reading_id += 1;
                inner.next_reading_id
            }
        };
        inner.readings.insert(
            key,
            StoredReading {
                id,
                city_id,
                reading: reading.clone(),
                source: source.to_string(),
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl SyncAuditLog for MemoryStore {
    async fn open_run(
        &self,
        sync_type: SyncType,
        data_source: &str,
        _start_time: DateTime<Utc>,
        status: SyncStatus,
    ) -> Result<i64, StoreError> {
        // ---
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut inner = self.inner.lock().unwrap();
        let id = inner.runs.len() as i64 + 1;
        inner.runs.push(RunRecord {
            id,
            sync_type,
            data_source: data_source.to_string(),
            status,
            end_time: None,
            success_count: 0,
            fail_count: 0,
            total_count: 0,
            error_message: None,
        });
        Ok(id)
    }

    async fn seal_run(&self, run_id: i64, seal: &SyncSeal) -> Result<(), StoreError> {
        // ---
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .iter_mut()
            .find(|run| run.id == run_id && !run.status.is_terminal())
            .ok_or(StoreError::NotFound("open sync run"))?;

        run.status = seal.status;
        run.end_time = Some(seal.end_time);
        run.success_count = seal.success_count;
        run.fail_count = seal.fail_count;
        run.total_count = seal.total_count;
        run.error_message = seal.error_message.clone();
        Ok(())
    }
}

/// Provider that knows a fixed AQI per city name and fails for every other city.
#[derive(Clone, Default)]
pub struct FakeProvider {
    // ---
    aqi: HashMap<String, i32>,
    delay: Option<Duration>,
    recorded_time: Option<DateTime<Utc>>,
    calls: Arc<AtomicUsize>,
}

impl FakeProvider {
    // ---
    pub fn with_aqi(mut self, city: &str, aqi: i32) -> Self {
        self.aqi.insert(city.to_string(), aqi);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Stamp every reading with `recorded_time` instead of the current time.
    pub fn at(mut self, recorded_time: DateTime<Utc>) -> Self {
        self.recorded_time = Some(recorded_time);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl AirQualityProvider for FakeProvider {
    fn source_name(&self) -> &str {
        "AQICN"
    }

    async fn fetch(&self, city_name: &str, _province: Option<&str>) -> Result<NormalizedReading, FetchError> {
        // ---
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let aqi = *self
            .aqi
            .get(city_name)
            .ok_or_else(|| FetchError::ProviderStatus("error: Unknown station".to_string()))?;

        Ok(NormalizedReading::new(
            self.recorded_time.unwrap_or_else(Utc::now),
            Some(aqi),
            Some("pm25".to_string()),
            Some("Test Bureau".to_string()),
            Pollutants {
                pm25: Some(f64::from(aqi)),
                ..Pollutants::default()
            },
        ))
    }
}

pub fn service(store: &MemoryStore, provider: FakeProvider) -> SyncService {
    service_with(store, provider, SyncConfig::default())
}

pub fn service_with(store: &MemoryStore, provider: FakeProvider, config: SyncConfig) -> SyncService {
    // ---
    SyncService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(provider),
        config,
    )
}
