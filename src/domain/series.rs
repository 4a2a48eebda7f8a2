use chrono::{DateTime, Duration, FixedOffset};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Default forecast horizon: 7 days of hourly points
pub const DEFAULT_HORIZON_HOURS: usize = 168;

/// One hour of raw weather input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherPoint {
    pub timestamp: DateTime<FixedOffset>,
    /// Hub-height wind speed (m/s)
    pub wind_speed: Option<f64>,
    /// Global horizontal irradiance (W/m²)
    pub ghi: Option<f64>,
}

/// One hour of an annotated forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<FixedOffset>,
    pub wind_speed: Option<f64>,
    pub ghi: Option<f64>,
    pub power_mw: f64,
    pub price_per_mwh: f64,
    pub revenue: f64,
    pub co2_saved_kg: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub battery_soc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub battery_power_mw: Option<f64>,
}

impl TimeSeriesPoint {
    /// Point carrying only the weather inputs; every derived column is zero.
    pub fn from_weather(w: &WeatherPoint) -> Self {
        Self {
            timestamp: w.timestamp,
            wind_speed: w.wind_speed,
            ghi: w.ghi,
            power_mw: 0.0,
            price_per_mwh: 0.0,
            revenue: 0.0,
            co2_saved_kg: 0.0,
            battery_soc: None,
            battery_power_mw: None,
        }
    }
}

/// Ensure timestamps are strictly increasing and spaced exactly one hour apart.
pub fn check_hourly<I>(timestamps: I) -> PipelineResult<()>
where
    I: IntoIterator<Item = DateTime<FixedOffset>>,
{
    let step = Duration::hours(1);
    for (idx, (prev, next)) in timestamps.into_iter().tuple_windows().enumerate() {
        if next - prev != step {
            return Err(PipelineError::DegenerateInput(format!(
                "timestamps at index {} and {} are not one hour apart ({} -> {})",
                idx,
                idx + 1,
                prev,
                next
            )));
        }
    }
    Ok(())
}
