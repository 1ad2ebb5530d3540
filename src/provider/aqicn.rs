//! Reqwest-backed adapter for the AQICN (World Air Quality Index) feed API.
//!
//! `GET {base}/feed/{query}/?token=...` returns
//! `{"status": "ok", "data": {"aqi": 75, "dominentpol": "pm25", "iaqi": {"pm25": {"v": 75}}, ...}}`
//! on success and `{"status": "error", "data": "Unknown station"}` otherwise.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use super::{location_query, AirQualityProvider, FetchError};
use crate::models::{NormalizedReading, Pollutants};

// ---

/// Data source label recorded for AQICN readings.
pub const AQICN_SOURCE: &str = "AQICN";

const DEFAULT_ATTRIBUTION: &str = "AQICN";

/// Top-level feed envelope. `data` is an object on success and a message string on error.
#[derive(Debug, Deserialize)]
struct FeedResponse {
    // ---
    status: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    // ---
    #[serde(default)]
    aqi: Value,
    dominentpol: Option<String>,
    #[serde(default)]
    attributions: Vec<Attribution>,
    #[serde(default)]
    iaqi: HashMap<String, IaqiValue>,
}

#[derive(Debug, Deserialize)]
struct Attribution {
    // ---
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IaqiValue {
    // ---
    v: Option<f64>,
}

/// AQICN feed client with a bounded request timeout.
#[derive(Debug, Clone)]
pub struct AqicnClient {
    // ---
    client: Client,
    base_url: Url,
    token: String,
}

impl AqicnClient {
    // ---
    /// Build a client for `base_url` authenticated with `token`.
    ///
    /// Fails when the URL is invalid or the HTTP client cannot be constructed.
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        // ---
        let base_url = Url::parse(base_url).map_err(|e| anyhow::anyhow!("Invalid provider URL '{}': {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Provider URL '{}' cannot be used as a base", base_url);
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    /// Feed URL for a location query, with the query as one encoded path segment.
    fn feed_url(&self, query: &str) -> Url {
        // ---
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("feed").push(query).push("");
        }
        url.query_pairs_mut().append_pair("token", &self.token);
        url
    }
}

#[async_trait]
impl AirQualityProvider for AqicnClient {
    fn source_name(&self) -> &str {
        AQICN_SOURCE
    }

    async fn fetch(&self, city_name: &str, province: Option<&str>) -> Result<NormalizedReading, FetchError> {
        // ---
        let query = location_query(city_name, province);
        tracing::debug!(query = %query, "Fetching AQICN feed");

        let response = self.client.get(self.feed_url(&query)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body: FeedResponse = response.json().await?;
        normalize(body, Utc::now())
    }
}

/// Convert a feed response into a reading stamped with `recorded_time`.
fn normalize(body: FeedResponse, recorded_time: DateTime<Utc>) -> Result<NormalizedReading, FetchError> {
    // ---
    if body.status != "ok" {
        let detail = body.data.as_str().map(|m| format!("{}: {}", body.status, m));
        return Err(FetchError::ProviderStatus(detail.unwrap_or(body.status)));
    }

    let data: FeedData = serde_json::from_value(body.data).map_err(|e| FetchError::Decode(e.to_string()))?;

    let pollutant = |name: &str| data.iaqi.get(name).and_then(|value| value.v);
    let pollutants = Pollutants {
        pm25: pollutant("pm25"),
        pm10: pollutant("pm10"),
        o3: pollutant("o3"),
        no2: pollutant("no2"),
        so2: pollutant("so2"),
        co: pollutant("co"),
    };

    let attribution = data
        .attributions
        .first()
        .and_then(|a| a.name.clone())
        .unwrap_or_else(|| DEFAULT_ATTRIBUTION.to_string());

    let reading = NormalizedReading::new(
        recorded_time,
        parse_aqi(&data.aqi)?,
        data.dominentpol.filter(|p| !p.is_empty()),
        Some(attribution),
        pollutants,
    );

    if reading.is_empty() {
        return Err(FetchError::Empty);
    }
    Ok(reading)
}

/// AQI arrives as a number or a numeric string. Fractions truncate toward zero
/// so band boundaries stay inclusive; `"-"` and other text are decode failures.
fn parse_aqi(value: &Value) -> Result<Option<i32>, FetchError> {
    // ---
    let raw = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64),
        _ => None,
    };
    raw.and_then(|aqi| i32::try_from(aqi).ok())
        .map(Some)
        .ok_or_else(|| FetchError::Decode(format!("non-numeric aqi {value}")))
}
