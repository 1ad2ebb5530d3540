//! Sync run audit log.
//!
//! A run is inserted `in_progress` and sealed exactly once. The seal statement
//! only matches rows that are still `in_progress`, so a terminal record can
//! never be rewritten.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::{page_offset, PgStore, StoreError, SyncAuditLog};
use crate::models::{SyncLogEntry, SyncSeal, SyncStats, SyncStatus, SyncType};

// ---

fn push_date_range(qb: &mut QueryBuilder<'_, Postgres>, start: Option<NaiveDate>, end: Option<NaiveDate>) {
    // ---
    let mut sep = " WHERE ";
    if let Some(start) = start {
        qb.push(sep).push("DATE(created_at) >= ").push_bind(start);
        sep = " AND ";
    }
    if let Some(end) = end {
        qb.push(sep).push("DATE(created_at) <= ").push_bind(end);
    }
}

/// Success percentage, `0.0` when there were no runs.
pub(crate) fn success_rate(total: i64, succeeded: i64) -> f64 {
    // ---
    if total > 0 {
        succeeded as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

impl PgStore {
    // ---
    /// Sync runs created within `[start, end]` (inclusive dates), newest first.
    pub async fn list_sync_logs(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<SyncLogEntry>, i64), StoreError> {
        // ---
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM sync_logs");
        push_date_range(&mut count, start, end);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            r#"
            SELECT id, sync_type, data_source, start_time, end_time,
                   success_count, fail_count, total_count, status, error_message,
                   EXTRACT(EPOCH FROM (end_time - start_time))::FLOAT8 AS duration_seconds,
                   created_at
            FROM sync_logs
            "#,
        );
        push_date_range(&mut select, start, end);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page_size))
            .push(" OFFSET ")
            .push_bind(page_offset(page, page_size));

        let items = select.build_query_as::<SyncLogEntry>().fetch_all(&self.pool).await?;
        Ok((items, total))
    }

    /// Aggregate statistics for runs created in the trailing `days`.
    pub async fn sync_stats(&self, days: u32) -> Result<SyncStats, StoreError> {
        // ---
        let (total_syncs, success_syncs, total_success_data, total_fail_data, average_duration_seconds): (
            i64,
            i64,
            i64,
            i64,
            Option<f64>,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*)                                              AS total_syncs,
                COUNT(*) FILTER (WHERE status = $2)                   AS success_syncs,
                COALESCE(SUM(success_count), 0)::BIGINT               AS total_success_data,
                COALESCE(SUM(fail_count), 0)::BIGINT                  AS total_fail_data,
                AVG(EXTRACT(EPOCH FROM (end_time - start_time)))::FLOAT8 AS avg_duration
            FROM sync_logs
            WHERE created_at >= NOW() - make_interval(days => $1)
            "#,
        )
        .bind(i32::try_from(days).unwrap_or(i32::MAX))
        .bind(SyncStatus::Success.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(SyncStats {
            total_syncs,
            success_syncs,
            success_rate: success_rate(total_syncs, success_syncs),
            total_success_data,
            total_fail_data,
            average_duration_seconds,
        })
    }
}

#[async_trait]
impl SyncAuditLog for PgStore {
    async fn open_run(
        &self,
        sync_type: SyncType,
        data_source: &str,
        start_time: DateTime<Utc>,
        status: SyncStatus,
    ) -> Result<i64, StoreError> {
        // ---
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sync_logs (sync_type, data_source, start_time, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(sync_type.as_str())
        .bind(data_source)
        .bind(start_time)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn seal_run(&self, run_id: i64, seal: &SyncSeal) -> Result<(), StoreError> {
        // ---
        debug_assert!(seal.status.is_terminal(), "runs are sealed with a terminal status");
        let result = sqlx::query(
            r#"
            UPDATE sync_logs SET
                end_time      = $2,
                status        = $3,
                success_count = $4,
                fail_count    = $5,
                total_count   = $6,
                error_message = $7
            WHERE id = $1 AND status = $8
            "#,
        )
        .bind(run_id)
        .bind(seal.end_time)
        .bind(seal.status.as_str())
        .bind(seal.success_count)
        .bind(seal.fail_count)
        .bind(seal.total_count)
        .bind(&seal.error_message)
        .bind(SyncStatus::InProgress.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("open sync run"));
        }
        Ok(())
    }
}
