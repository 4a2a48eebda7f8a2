//! Weather forecast integration (Open-Meteo)
//!
//! Supplies the hourly hub-height wind speed and irradiance series that drive
//! the power curves. Only the fields the pipeline consumes are requested.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::domain::{GeoLocation, WeatherPoint};
use crate::error::{PipelineError, PipelineResult};

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";
const HOURLY_FIELDS: &str = "windspeed_100m,direct_radiation,diffuse_radiation";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Hourly series over the forecast horizon for a location.
    async fn fetch_hourly(&self, location: &GeoLocation) -> PipelineResult<Vec<WeatherPoint>>;
}

/// Open-Meteo API client
#[derive(Clone)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
    forecast_days: u32,
}

impl OpenMeteoClient {
    pub fn new(base_url: impl Into<String>, forecast_days: u32, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("greenfleet/0.3"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            forecast_days,
        })
    }

    fn parse_forecast(response: OpenMeteoResponse) -> PipelineResult<Vec<WeatherPoint>> {
        let offset = FixedOffset::east_opt(response.utc_offset_seconds).ok_or_else(|| {
            PipelineError::UpstreamFetchFailure(format!(
                "invalid utc offset {}",
                response.utc_offset_seconds
            ))
        })?;
        let hourly = response.hourly;
        let n = hourly.time.len();
        if hourly.windspeed_100m.len() != n
            || hourly.direct_radiation.len() != n
            || hourly.diffuse_radiation.len() != n
        {
            return Err(PipelineError::UpstreamFetchFailure(format!(
                "hourly arrays differ in length (time={n}, wind={}, direct={}, diffuse={})",
                hourly.windspeed_100m.len(),
                hourly.direct_radiation.len(),
                hourly.diffuse_radiation.len()
            )));
        }

        let mut points = Vec::with_capacity(n);
        for (i, raw_time) in hourly.time.iter().enumerate() {
            let timestamp = parse_local_time(raw_time, offset)?;
            let ghi = match (hourly.direct_radiation[i], hourly.diffuse_radiation[i]) {
                (Some(direct), Some(diffuse)) => Some(direct + diffuse),
                _ => None,
            };
            points.push(WeatherPoint {
                timestamp,
                wind_speed: hourly.windspeed_100m[i],
                ghi,
            });
        }
        Ok(points)
    }
}

fn parse_local_time(raw: &str, offset: FixedOffset) -> PipelineResult<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| PipelineError::UpstreamFetchFailure(format!("bad timestamp '{raw}': {e}")))?;
    naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| PipelineError::UpstreamFetchFailure(format!("unmappable timestamp '{raw}'")))
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    async fn fetch_hourly(&self, location: &GeoLocation) -> PipelineResult<Vec<WeatherPoint>> {
        debug!(
            latitude = location.latitude,
            longitude = location.longitude,
            "fetching weather forecast from Open-Meteo"
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                ("hourly", HOURLY_FIELDS.to_string()),
                ("forecast_days", self.forecast_days.to_string()),
                ("timezone", "auto".to_string()),
                ("wind_speed_unit", "ms".to_string()),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::UpstreamFetchFailure(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "Open-Meteo returned error status");
            return Err(PipelineError::UpstreamFetchFailure(format!(
                "Open-Meteo HTTP {status}"
            )));
        }

        let body: OpenMeteoResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::UpstreamFetchFailure(format!("malformed response: {e}")))?;

        let points = Self::parse_forecast(body)?;
        info!(
            latitude = location.latitude,
            longitude = location.longitude,
            points = points.len(),
            "weather forecast fetched"
        );
        Ok(points)
    }
}

// Open-Meteo response structures
#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    hourly: OpenMeteoHourly,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoHourly {
    time: Vec<String>,
    windspeed_100m: Vec<Option<f64>>,
    direct_radiation: Vec<Option<f64>>,
    diffuse_radiation: Vec<Option<f64>>,
}
