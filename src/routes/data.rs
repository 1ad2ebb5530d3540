//! Read-only city and reading queries for signed-in users.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::get,
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{paging, AppState};
use crate::auth::AuthUser;
use crate::models::{City, MonthlyStat, Page, Reading};
use crate::response::{ApiError, ApiResponse, ApiResult};
use crate::store::CityFilter;

// ---

const DEFAULT_MONTHS: u32 = 12;
const MAX_MONTHS: u32 = 24;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/data/cities", get(list_cities))
        .route("/data/cities/{city_id}", get(get_city))
        .route("/data/query", get(query_readings))
        .route("/data/detail", get(city_detail))
        .route("/data/monthly-stats", get(monthly_stats))
}

/// Parse an RFC 3339 timestamp. Timestamps without an offset are taken as UTC.
pub(crate) fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    // ---
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Optional time bound; blank means unbounded.
fn time_bound(value: Option<&str>, reason: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    // ---
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse_time(v).map(Some).ok_or_else(|| ApiError::bad_request(reason)),
    }
}

fn require_city_id(city_id: Option<i64>) -> Result<i64, ApiError> {
    city_id.ok_or_else(|| ApiError::bad_request("city_id_required"))
}

#[derive(Debug, Deserialize)]
struct CityListParams {
    q: Option<String>,
    province: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

/// `GET /data/cities`
async fn list_cities(
    State(state): State<AppState>,
    _user: AuthUser,
    params: Result<Query<CityListParams>, QueryRejection>,
) -> ApiResult<Page<City>> {
    // ---
    let Query(params) = params?;
    let (page, page_size) = paging(params.page, params.page_size);
    let filter = CityFilter {
        q: params.q.map(|q| q.trim().to_string()),
        province: params.province.map(|p| p.trim().to_string()),
    };

    let (items, total) = state.store.search_cities(&filter, page, page_size).await?;
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

/// `GET /data/cities/{city_id}`
async fn get_city(
    State(state): State<AppState>,
    _user: AuthUser,
    city_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<City> {
    // ---
    let Path(city_id) = city_id?;
    let city = state
        .store
        .get_city(city_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("city_not_found".to_string()))?;
    Ok(ApiResponse::ok(city, "success"))
}

#[derive(Debug, Deserialize)]
struct ReadingParams {
    city_id: Option<i64>,
    start_time: Option<String>,
    end_time: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

/// `GET /data/query`
async fn query_readings(
    State(state): State<AppState>,
    _user: AuthUser,
    params: Result<Query<ReadingParams>, QueryRejection>,
) -> ApiResult<Page<Reading>> {
    // ---
    let Query(params) = params?;
    let city_id = require_city_id(params.city_id)?;
    let start = time_bound(params.start_time.as_deref(), "invalid_start_time")?;
    let end = time_bound(params.end_time.as_deref(), "invalid_end_time")?;
    let (page, page_size) = paging(params.page, params.page_size);

    let (items, total) = state.store.query_readings(city_id, start, end, page, page_size).await?;
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
struct CityParams {
    city_id: Option<i64>,
    months: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CityDetail {
    city: City,
    latest_data: Option<Reading>,
}

/// `GET /data/detail`
async fn city_detail(
    State(state): State<AppState>,
    _user: AuthUser,
    params: Result<Query<CityParams>, QueryRejection>,
) -> ApiResult<CityDetail> {
    // ---
    let Query(params) = params?;
    let city_id = require_city_id(params.city_id)?;

    let city = state
        .store
        .get_city(city_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("city_not_found".to_string()))?;
    let latest_data = state.store.latest_reading(city_id).await?;
    Ok(ApiResponse::ok(CityDetail { city, latest_data }, "success"))
}

/// `GET /data/monthly-stats`
async fn monthly_stats(
    State(state): State<AppState>,
    _user: AuthUser,
    params: Result<Query<CityParams>, QueryRejection>,
) -> ApiResult<Vec<MonthlyStat>> {
    // ---
    let Query(params) = params?;
    let city_id = require_city_id(params.city_id)?;
    let months = params.months.unwrap_or(DEFAULT_MONTHS).clamp(1, MAX_MONTHS);

    let stats = state.store.monthly_stats(city_id, months).await?;
    Ok(ApiResponse::ok(stats, "success"))
}

#[cfg(test)]
mod tests {
    // ---
    use super::super::test_support::spawn;
    use super::*;
    use crate::sync::test_support::{FakeProvider, MemoryStore};
    use chrono::TimeZone;
    use serde_json::Value;

    #[test]
    fn test_parse_time_accepts_offsets_and_naive() {
        // ---
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(parse_time("2024-03-01T08:00:00Z"), Some(expected));
        assert_eq!(parse_time("2024-03-01T16:00:00+08:00"), Some(expected));
        assert_eq!(parse_time("2024-03-01T08:00:00"), Some(expected));
        assert_eq!(parse_time("2024-03-01 08:00:00"), Some(expected));
        assert_eq!(parse_time("yesterday"), None);
    }

    #[test]
    fn test_blank_bound_is_unbounded() {
        // ---
        assert_eq!(time_bound(Some("  "), "invalid_start_time").unwrap(), None);
        assert!(time_bound(Some("03/01/2024"), "invalid_start_time").is_err());
    }

    async fn get(path: &str, signed_in: bool) -> (u16, Value) {
        // ---
        let server = spawn(&MemoryStore::default(), FakeProvider::default()).await;
        let mut request = server.client.get(server.url(path));
        if signed_in {
            request = request.bearer_auth(server.user_token());
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_data_routes_require_token() {
        // ---
        for path in ["/data/cities", "/data/cities/1", "/data/query?city_id=1", "/data/detail?city_id=1"] {
            let (status, body) = get(path, false).await;
            assert_eq!(status, 401, "{path}");
            assert_eq!(body["message"], "token_required");
        }
    }

    #[tokio::test]
    async fn test_query_requires_city_id() {
        // ---
        let (status, body) = get("/data/query", true).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "city_id_required");

        let (status, body) = get("/data/monthly-stats", true).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "city_id_required");
    }

    #[tokio::test]
    async fn test_query_rejects_bad_time_bounds() {
        // ---
        let (status, body) = get("/data/query?city_id=1&start_time=tomorrow", true).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "invalid_start_time");

        let (status, body) = get("/data/query?city_id=1&end_time=2024-13-01T00:00:00Z", true).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "invalid_end_time");
    }

    #[tokio::test]
    async fn test_non_numeric_ids_are_rejected() {
        // ---
        let (status, body) = get("/data/detail?city_id=beijing", true).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "invalid_query");

        let (status, body) = get("/data/cities/beijing", true).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "invalid_path");
    }
}
