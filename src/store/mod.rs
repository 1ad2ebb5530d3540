//! PostgreSQL persistence for cities, readings, sync logs and users.
//!
//! The sync pipeline only sees the three narrow traits defined here
//! ([`CityRegistry`], [`ReadingStore`], [`SyncAuditLog`]); route handlers use
//! the wider inherent API on [`PgStore`]. Every method borrows a pooled
//! connection for the duration of one statement or transaction and returns it
//! before the call completes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::models::{City, NormalizedReading, SyncSeal, SyncStatus, SyncType};

mod cities;
mod readings;
mod sync_logs;
mod users;

pub use cities::CityFilter;
pub use users::UserUpdate;

// ---

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    // ---
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),
}

impl StoreError {
    /// Map a unique-constraint violation onto [`StoreError::Conflict`].
    pub(crate) fn from_unique(err: sqlx::Error, what: &'static str) -> Self {
        // ---
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(what),
            _ => Self::Database(err),
        }
    }
}

/// Read access to the monitored locations.
#[async_trait]
pub trait CityRegistry: Send + Sync {
    /// Return one page of cities ordered by name, plus the total count.
    async fn list_cities(&self, page: u32, page_size: u32) -> Result<(Vec<City>, i64), StoreError>;
}

/// Write access to air-quality readings.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Insert or replace the reading for `(city_id, reading.recorded_time)`.
    ///
    /// Returns the row id, which is stable across replacements.
    async fn upsert_reading(
        &self,
        city_id: i64,
        reading: &NormalizedReading,
        source: &str,
    ) -> Result<i64, StoreError>;
}

/// Lifecycle of sync run audit records.
#[async_trait]
pub trait SyncAuditLog: Send + Sync {
    /// Create a run record and return its id.
    async fn open_run(
        &self,
        sync_type: SyncType,
        data_source: &str,
        start_time: DateTime<Utc>,
        status: SyncStatus,
    ) -> Result<i64, StoreError>;

    /// Write the terminal state of a run.
    ///
    /// Fails with [`StoreError::NotFound`] when the run does not exist or has
    /// already been sealed.
    async fn seal_run(&self, run_id: i64, seal: &SyncSeal) -> Result<(), StoreError>;
}

/// Shared handle over the connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    // ---
    pool: PgPool,
}

impl PgStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Offset for a 1-based page number.
pub(crate) fn page_offset(page: u32, page_size: u32) -> i64 {
    // ---
    i64::from(page.max(1) - 1) * i64::from(page_size)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_page_offset() {
        // ---
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
        assert_eq!(page_offset(0, 20), 0);
    }

    #[test]
    fn test_non_unique_errors_stay_database_errors() {
        // ---
        let err = StoreError::from_unique(sqlx::Error::RowNotFound, "user");
        assert!(matches!(err, StoreError::Database(_)));
    }
}
