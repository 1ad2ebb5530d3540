//! Administrator endpoints: city reference data and sync operations.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{paging, AppState};
use crate::auth::AdminUser;
use crate::models::{City, CityInput, Page, SyncLogEntry, SyncRunSummary, SyncStats, SyncType};
use crate::provider::aqicn::AQICN_SOURCE;
use crate::response::{ApiError, ApiResponse, ApiResult};

// ---

const DEFAULT_STATS_DAYS: u32 = 7;
const MAX_STATS_DAYS: u32 = 90;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/admin/cities", post(create_city))
        .route("/admin/cities/{city_id}", put(update_city).delete(delete_city))
        .route("/admin/data/sync", post(trigger_sync))
        .route("/admin/data/sync-logs", get(sync_logs))
        .route("/admin/data/sync-stats", get(sync_stats))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// --- cities

/// `POST /admin/cities`
async fn create_city(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    body: Result<Json<CityInput>, JsonRejection>,
) -> ApiResult<City> {
    // ---
    let Json(mut input) = body?;
    let name = trimmed(input.name.take()).ok_or_else(|| ApiError::bad_request("name_required"))?;
    input.province = trimmed(input.province);

    let city = state.store.create_city(&name, &input).await?;
    info!(admin_id = claims.sub, city_id = city.id, "Admin created city");
    Ok(ApiResponse::ok(city, "created"))
}

/// `PUT /admin/cities/{city_id}`
async fn update_city(
    State(state): State<AppState>,
    _admin: AdminUser,
    city_id: Result<Path<i64>, PathRejection>,
    body: Result<Json<CityInput>, JsonRejection>,
) -> ApiResult<City> {
    // ---
    let Path(city_id) = city_id?;
    let Json(mut input) = body?;
    input.name = trimmed(input.name);
    input.province = trimmed(input.province);
    if input.name.is_none() && input.province.is_none() && input.lat.is_none() && input.lon.is_none() {
        return Err(ApiError::bad_request("no_fields"));
    }

    let city = state
        .store
        .update_city(city_id, &input)
        .await?
        .ok_or_else(|| ApiError::NotFound("city_not_found".to_string()))?;
    Ok(ApiResponse::ok(city, "updated"))
}

/// `DELETE /admin/cities/{city_id}`
async fn delete_city(
    State(state): State<AppState>,
    _admin: AdminUser,
    city_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Value> {
    // ---
    let Path(city_id) = city_id?;
    if !state.store.delete_city(city_id).await? {
        return Err(ApiError::NotFound("city_not_found".to_string()));
    }
    Ok(ApiResponse::ok(json!({ "id": city_id }), "deleted"))
}

// --- sync

#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
    source: Option<String>,
}

#[derive(Debug, Serialize)]
struct SyncTriggered {
    sync_id: i64,
    summary: SyncRunSummary,
}

/// Requested data source; an empty body or missing field means the default provider.
fn requested_source(body: &[u8]) -> Result<String, ApiError> {
    // ---
    let request: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(body).map_err(|_| ApiError::bad_request("invalid_body"))?
    };
    Ok(trimmed(request.source)
        .map(|s| s.to_ascii_uppercase())
        .unwrap_or_else(|| AQICN_SOURCE.to_string()))
}

/// `POST /admin/data/sync`
///
/// Runs a manual sync and answers once the run is sealed.
///
/// The run owns its task: dropping the request does not cancel it, so the
/// audit record is always sealed.
async fn trigger_sync(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    body: Bytes,
) -> ApiResult<SyncTriggered> {
    // ---
    let source = requested_source(&body)?;
    info!(admin_id = claims.sub, source = %source, "Manual sync requested");

    let service = Arc::clone(&state.sync);
    let run = tokio::spawn(async move { service.run_sync(SyncType::Manual, &source).await });
    let summary = run.await.map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(ApiResponse::ok(
        SyncTriggered {
            sync_id: summary.run_id,
            summary,
        },
        "sync_completed",
    ))
}

#[derive(Debug, Deserialize)]
struct SyncLogParams {
    start_date: Option<String>,
    end_date: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

fn date_bound(value: Option<&str>, reason: &str) -> Result<Option<NaiveDate>, ApiError> {
    // ---
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::bad_request(reason)),
    }
}

/// `GET /admin/data/sync-logs`
async fn sync_logs(
    State(state): State<AppState>,
    _admin: AdminUser,
    params: Result<Query<SyncLogParams>, QueryRejection>,
) -> ApiResult<Page<SyncLogEntry>> {
    // ---
    let Query(params) = params?;
    let start = date_bound(params.start_date.as_deref(), "invalid_start_date")?;
    let end = date_bound(params.end_date.as_deref(), "invalid_end_date")?;
    let (page, page_size) = paging(params.page, params.page_size);

    let (items, total) = state.store.list_sync_logs(start, end, page, page_size).await?;
    Ok(ApiResponse::ok(
        Page {
            items,
            total,
            page,
            page_size,
        },
        "success",
    ))
}

#[derive(Debug, Deserialize)]
struct SyncStatsParams {
    days: Option<u32>,
}

/// `GET /admin/data/sync-stats`
async fn sync_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
    params: Result<Query<SyncStatsParams>, QueryRejection>,
) -> ApiResult<SyncStats> {
    // ---
    let Query(params) = params?;
    let days = params.days.unwrap_or(DEFAULT_STATS_DAYS).clamp(1, MAX_STATS_DAYS);
    let stats = state.store.sync_stats(days).await?;
    Ok(ApiResponse::ok(stats, "success"))
}
