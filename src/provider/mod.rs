//! Outbound air-quality provider port.
//!
//! A provider turns one city identity into a [`NormalizedReading`]. Every
//! failure is returned as a typed [`FetchError`] so the sync pipeline can count
//! it and move on to the next city.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::NormalizedReading;

pub mod aqicn;

pub use aqicn::AqicnClient;

// ---

/// Per-city soft failures.
#[derive(Debug, Error)]
pub enum FetchError {
    // ---
    #[error("provider request timed out")]
    Timeout,

    #[error("provider transport failed: {0}")]
    Transport(String),

    #[error("provider returned HTTP {0}")]
    HttpStatus(u16),

    #[error("provider reported status `{0}`")]
    ProviderStatus(String),

    #[error("provider response could not be decoded: {0}")]
    Decode(String),

    #[error("provider returned no readings")]
    Empty,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // ---
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::HttpStatus(status.as_u16())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Source of current air-quality readings.
#[async_trait]
pub trait AirQualityProvider: Send + Sync {
    /// Identifier recorded as the reading `source` and sync `data_source`.
    fn source_name(&self) -> &str;

    /// Fetch and normalize the current reading for one city.
    async fn fetch(&self, city_name: &str, province: Option<&str>) -> Result<NormalizedReading, FetchError>;
}

/// `"{province},{city}"` when a province is known, else the city name alone.
pub fn location_query(city_name: &str, province: Option<&str>) -> String {
    // ---
    match province.map(str::trim).filter(|p| !p.is_empty()) {
        Some(province) => format!("{province},{city_name}"),
        None => city_name.to_string(),
    }
}
