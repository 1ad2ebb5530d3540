//! Data models for the air-quality backend.
//!
//! Rows read from PostgreSQL derive [`sqlx::FromRow`]; values produced by the
//! provider adapter stay plain structs until the sync pipeline persists them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// A monitored location.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct City {
    // ---
    pub id: i64,
    pub name: String,
    pub province: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Attributes accepted when creating or updating a city.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CityInput {
    // ---
    pub name: Option<String>,
    pub province: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// One stored air-quality snapshot, unique per `(city_id, recorded_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Reading {
    // ---
    pub id: i64,
    pub city_id: i64,
    pub recorded_time: DateTime<Utc>,
    pub aqi: Option<i32>,
    pub aqi_level: Option<String>,
    pub dominant_pollutant: Option<String>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub source: String,
    pub attribution: Option<String>,
}

/// Provider output normalized into the reading store's shape.
///
/// `aqi_level` is never supplied independently; it is derived from `aqi`
/// by [`NormalizedReading::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    // ---
    pub recorded_time: DateTime<Utc>,
    pub aqi: Option<i32>,
    pub aqi_level: Option<AqiLevel>,
    pub dominant_pollutant: Option<String>,
    pub attribution: Option<String>,
    pub pollutants: Pollutants,
}

/// Per-pollutant sub-indices. Absent values stay `None`, never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pollutants {
    // ---
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
}

impl Pollutants {
    // ---
    pub fn is_empty(&self) -> bool {
        self.pm25.is_none()
            && self.pm10.is_none()
            && self.o3.is_none()
            && self.no2.is_none()
            && self.so2.is_none()
            && self.co.is_none()
    }
}

impl NormalizedReading {
    // ---
    pub fn new(
        recorded_time: DateTime<Utc>,
        aqi: Option<i32>,
        dominant_pollutant: Option<String>,
        attribution: Option<String>,
        pollutants: Pollutants,
    ) -> Self {
        Self {
            recorded_time,
            aqi,
            aqi_level: aqi_level(aqi),
            dominant_pollutant,
            attribution,
            pollutants,
        }
    }

    /// True when the provider gave neither an index nor any pollutant value.
    pub fn is_empty(&self) -> bool {
        self.aqi.is_none() && self.pollutants.is_empty()
    }
}

/// Severity band derived from an AQI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AqiLevel {
    // ---
    Excellent,
    Good,
    LightPollution,
    ModeratePollution,
    HeavyPollution,
    SeverePollution,
}

impl AqiLevel {
    // ---
    /// Map an AQI onto its band. Upper bounds are inclusive.
    pub fn from_aqi(aqi: i32) -> Self {
        match aqi {
            i32::MIN..=50 => Self::Excellent,
            51..=100 => Self::Good,
            101..=150 => Self::LightPollution,
            151..=200 => Self::ModeratePollution,
            201..=300 => Self::HeavyPollution,
            _ => Self::SeverePollution,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::LightPollution => "Light Pollution",
            Self::ModeratePollution => "Moderate Pollution",
            Self::HeavyPollution => "Heavy Pollution",
            Self::SeverePollution => "Severe Pollution",
        }
    }
}

impl fmt::Display for AqiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level for an optional AQI; `None` maps to `None`.
pub fn aqi_level(aqi: Option<i32>) -> Option<AqiLevel> {
    aqi.map(AqiLevel::from_aqi)
}

/// What started a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    // ---
    Scheduled,
    Manual,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

/// Lifecycle state of a sync run. `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    // ---
    InProgress,
    Success,
    Failed,
}

impl SyncStatus {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Terminal values written once when a run is sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSeal {
    // ---
    pub end_time: DateTime<Utc>,
    pub status: SyncStatus,
    pub success_count: i32,
    pub fail_count: i32,
    pub total_count: i32,
    pub error_message: Option<String>,
}

/// Outcome of one [`run_sync`](crate::sync::SyncService::run_sync) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRunSummary {
    // ---
    pub run_id: i64,
    pub sync_type: SyncType,
    pub data_source: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SyncStatus,
    pub success_count: i32,
    pub fail_count: i32,
    pub total_count: i32,
    pub error_message: Option<String>,
}

/// A sync log row as returned to administrators.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SyncLogEntry {
    // ---
    pub id: i64,
    pub sync_type: String,
    pub data_source: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub success_count: i32,
    pub fail_count: i32,
    pub total_count: i32,
    pub status: String,
    pub error_message: Option<String>,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate sync statistics over a trailing window of days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStats {
    // ---
    pub total_syncs: i64,
    pub success_syncs: i64,
    pub success_rate: f64,
    pub total_success_data: i64,
    pub total_fail_data: i64,
    pub average_duration_seconds: Option<f64>,
}

/// Monthly roll-up for one city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyStat {
    // ---
    pub month: String,
    pub good_ratio: f64,
    pub pm25_avg: Option<f64>,
}

/// Stored user account, including the password hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    // ---
    pub id: i64,
    pub phone: String,
    pub password_hash: String,
    pub nickname: Option<String>,
    pub default_city_id: Option<i64>,
    pub tag: Option<String>,
    pub role: String,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    // ---
    pub id: i64,
    pub phone: String,
    pub nickname: Option<String>,
    pub tag: Option<String>,
    pub default_city_id: Option<i64>,
    pub role: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            phone: user.phone,
            nickname: user.nickname,
            tag: user.tag,
            default_city_id: user.default_city_id,
            role: user.role,
        }
    }
}

/// A page of results plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    // ---
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_aqi_level_boundaries() {
        // ---
        let cases = [
            (0, "Excellent"),
            (50, "Excellent"),
            (51, "Good"),
            (100, "Good"),
            (101, "Light Pollution"),
            (150, "Light Pollution"),
            (151, "Moderate Pollution"),
            (200, "Moderate Pollution"),
            (201, "Heavy Pollution"),
            (300, "Heavy Pollution"),
            (301, "Severe Pollution"),
            (500, "Severe Pollution"),
        ];

        for (aqi, expected) in cases {
            assert_eq!(AqiLevel::from_aqi(aqi).as_str(), expected, "aqi={aqi}");
        }
    }

    #[test]
    fn test_aqi_level_is_monotonic_over_range() {
        // ---
        let rank = |level: AqiLevel| level as u8;
        let mut previous = rank(AqiLevel::from_aqi(0));
        for aqi in 1..=500 {
            let current = rank(AqiLevel::from_aqi(aqi));
            assert!(current >= previous, "level dropped at aqi={aqi}");
            previous = current;
        }
    }

    #[test]
    fn test_missing_aqi_has_no_level() {
        // ---
        assert_eq!(aqi_level(None), None);
        assert_eq!(aqi_level(Some(75)), Some(AqiLevel::Good));
    }

    #[test]
    fn test_normalized_reading_derives_level() {
        // ---
        let reading = NormalizedReading::new(Utc::now(), Some(75), None, None, Pollutants::default());
        assert_eq!(reading.aqi_level, Some(AqiLevel::Good));
        assert!(!reading.is_empty());

        let empty = NormalizedReading::new(Utc::now(), None, None, None, Pollutants::default());
        assert_eq!(empty.aqi_level, None);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_user_profile_drops_password_hash() {
        // ---
        let user = User {
            id: 7,
            phone: "13800000000".to_string(),
            password_hash: "secret".to_string(),
            nickname: Some("kai".to_string()),
            default_city_id: Some(1),
            tag: None,
            role: "user".to_string(),
        };

        let json = serde_json::to_value(UserProfile::from(user)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["phone"], "13800000000");
    }

    #[test]
    fn test_sync_status_terminality() {
        // ---
        assert!(!SyncStatus::InProgress.is_terminal());
        assert!(SyncStatus::Success.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
        assert_eq!(SyncType::Manual.as_str(), "manual");
    }
}
