//! Database schema management for `airwatch`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Statements applied in order; each is idempotent.
const SCHEMA: &[&str] = &[
    // Monitored locations
    r#"
    CREATE TABLE IF NOT EXISTS cities (
        id        BIGSERIAL PRIMARY KEY,
        name      TEXT             NOT NULL,
        province  TEXT,
        lat       DOUBLE PRECISION,
        lon       DOUBLE PRECISION
    );
    "#,
    // One snapshot per (city_id, recorded_time); no FK so orphans survive city deletes
    r#"
    CREATE TABLE IF NOT EXISTS air_quality_data (
        id                 BIGSERIAL PRIMARY KEY,
        city_id            BIGINT           NOT NULL,
        recorded_time      TIMESTAMPTZ      NOT NULL,
        aqi                INTEGER,
        aqi_level          TEXT,
        dominant_pollutant TEXT,
        pm25               DOUBLE PRECISION,
        pm10               DOUBLE PRECISION,
        o3                 DOUBLE PRECISION,
        no2                DOUBLE PRECISION,
        so2                DOUBLE PRECISION,
        co                 DOUBLE PRECISION,
        source             TEXT             NOT NULL,
        attribution        TEXT,
        CONSTRAINT uq_air_quality_city_time UNIQUE (city_id, recorded_time)
    );
    "#,
    // Sync run audit log
    r#"
    CREATE TABLE IF NOT EXISTS sync_logs (
        id            BIGSERIAL PRIMARY KEY,
        sync_type     TEXT        NOT NULL,
        data_source   TEXT        NOT NULL,
        start_time    TIMESTAMPTZ NOT NULL,
        end_time      TIMESTAMPTZ,
        success_count INTEGER     NOT NULL DEFAULT 0,
        fail_count    INTEGER     NOT NULL DEFAULT 0,
        total_count   INTEGER     NOT NULL DEFAULT 0,
        status        TEXT        NOT NULL,
        error_message TEXT,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id              BIGSERIAL PRIMARY KEY,
        phone           TEXT NOT NULL UNIQUE,
        password_hash   TEXT NOT NULL,
        nickname        TEXT,
        default_city_id BIGINT,
        tag             TEXT,
        role            TEXT NOT NULL DEFAULT 'user'
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_cities_name
        ON cities (name);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_air_quality_city_time
        ON air_quality_data (city_id, recorded_time DESC);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_sync_logs_created_at
        ON sync_logs (created_at DESC);
    "#,
];

/// Create or update the database schema (idempotent).
///
/// Creates the `cities`, `air_quality_data`, `sync_logs` and `users` tables
/// plus their lookup indexes. Safe to call on every startup; no-op if objects
/// already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    for statement in SCHEMA {
        sqlx::query(*statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
