//! Configuration loader for the `airwatch` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, net::SocketAddr, time::Duration};

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional `u64` environment variable, `None` when unset.
macro_rules! parse_env_opt_u64 {
    ($var_name:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// HS256 secret used to sign access tokens.
    pub jwt_secret: String,

    /// Access token lifetime.
    pub jwt_ttl: Duration,

    /// Air-quality provider base URL.
    pub provider_url: String,

    /// Air-quality provider access token.
    pub provider_token: String,

    /// Per-request timeout for provider calls.
    pub provider_timeout: Duration,

    /// Sync settings shared by the scheduler and the admin trigger.
    pub sync: SyncConfig,
}

/// Settings for the synchronization pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    // ---
    /// Period of the recurring sync job.
    pub interval: Duration,

    /// Upper bound on cities loaded per run.
    pub city_cap: u32,

    /// Number of cities fetched concurrently.
    pub concurrency: usize,

    /// Optional wall-clock budget for a whole run.
    pub run_deadline: Option<Duration>,

    /// Seal a run as `failed` when every city failed.
    pub fail_on_total_failure: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            city_cap: 1000,
            concurrency: 8,
            run_deadline: None,
            fail_on_total_failure: false,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `JWT_SECRET` – token signing secret
/// - `AQICN_API_TOKEN` – provider access token
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 10)
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:5000`)
/// - `JWT_TTL_SECS` – token lifetime (default: 7 days)
/// - `AQICN_API_URL` – provider base URL (default: `https://api.waqi.info`)
/// - `PROVIDER_TIMEOUT_SECS` – provider timeout (default: 10)
/// - `SYNC_INTERVAL_SECS` – sync period (default: 3600)
/// - `SYNC_CITY_CAP` – max cities per run (default: 1000)
/// - `SYNC_CONCURRENCY` – parallel city fetches (default: 8)
/// - `SYNC_RUN_DEADLINE_SECS` – run budget (default: none)
/// - `SYNC_FAIL_ON_TOTAL_FAILURE` – `true` to fail runs where no city succeeded
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let jwt_secret = require_env!("JWT_SECRET");
    let provider_token = require_env!("AQICN_API_TOKEN");

    let provider_url = env::var("AQICN_API_URL")
        .unwrap_or_else(|_| "https://api.waqi.info".to_string())
        .trim_end_matches('/')
        .to_string();

    let bind_addr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:5000".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid BIND_ADDR: {}", e))?;

    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 10);
    let jwt_ttl_secs = parse_env_u32!("JWT_TTL_SECS", 604_800);
    let provider_timeout_secs = parse_env_u32!("PROVIDER_TIMEOUT_SECS", 10);
    let interval_secs = parse_env_u32!("SYNC_INTERVAL_SECS", 3600);
    let city_cap = parse_env_u32!("SYNC_CITY_CAP", 1000);
    let concurrency = parse_env_u32!("SYNC_CONCURRENCY", 8);
    let run_deadline = parse_env_opt_u64!("SYNC_RUN_DEADLINE_SECS").map(Duration::from_secs);
    let fail_on_total_failure = parse_bool(env::var("SYNC_FAIL_ON_TOTAL_FAILURE").ok().as_deref())
        .map_err(|v| anyhow!("Invalid SYNC_FAIL_ON_TOTAL_FAILURE: {}", v))?;

    if interval_secs == 0 {
        return Err(anyhow!("SYNC_INTERVAL_SECS must be greater than zero"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        bind_addr,
        jwt_secret,
        jwt_ttl: Duration::from_secs(u64::from(jwt_ttl_secs)),
        provider_url,
        provider_token,
        provider_timeout: Duration::from_secs(u64::from(provider_timeout_secs)),
        sync: SyncConfig {
            interval: Duration::from_secs(u64::from(interval_secs)),
            city_cap: city_cap.max(1),
            concurrency: (concurrency as usize).max(1),
            run_deadline,
            fail_on_total_failure,
        },
    })
}

/// Interpret a boolean flag; unset means `false`.
fn parse_bool(value: Option<&str>) -> std::result::Result<bool, String> {
    // ---
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") => Ok(false),
        Some(other) => Err(other.to_string()),
    }
}

/// Replace the password component of a connection URL with `****`.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    let userinfo_start = db_url.find("://").map_or(0, |pos| pos + 3);
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            if colon_pos >= userinfo_start {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password and never prints secrets.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL           : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX            : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR              : {}", self.bind_addr);
        tracing::info!("  JWT_TTL_SECS           : {}", self.jwt_ttl.as_secs());
        tracing::info!("  AQICN_API_URL          : {}", self.provider_url);
        tracing::info!("  PROVIDER_TIMEOUT_SECS  : {}", self.provider_timeout.as_secs());
        tracing::info!("  SYNC_INTERVAL_SECS     : {}", self.sync.interval.as_secs());
        tracing::info!("  SYNC_CITY_CAP          : {}", self.sync.city_cap);
        tracing::info!("  SYNC_CONCURRENCY       : {}", self.sync.concurrency);
        tracing::info!(
            "  SYNC_RUN_DEADLINE_SECS : {}",
            self.sync
                .run_deadline
                .map_or_else(|| "none".to_string(), |d| d.as_secs().to_string())
        );
        tracing::info!("  SYNC_FAIL_ON_TOTAL_FAILURE : {}", self.sync.fail_on_total_failure);
    }
}
