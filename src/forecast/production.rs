//! Weather-to-power conversion for wind and solar sites.

use crate::domain::{Site, SiteType, TimeSeriesPoint, WeatherPoint};
use crate::error::{PipelineError, PipelineResult};

/// Wind speed below which a turbine produces nothing (m/s)
pub const CUT_IN_SPEED: f64 = 3.0;
/// Wind speed at which a turbine reaches rated output (m/s)
pub const RATED_SPEED: f64 = 12.0;
/// Wind speed above which a turbine shuts down (m/s)
pub const CUT_OUT_SPEED: f64 = 25.0;

pub const PANEL_EFFICIENCY: f64 = 0.20;
pub const SYSTEM_LOSSES: f64 = 0.15;
/// Irradiance below this is treated as dusk/dawn noise (W/m²)
pub const MIN_PRODUCTIVE_GHI: f64 = 5.0;

/// Fraction of rated output for a given hub-height wind speed.
pub fn wind_power_fraction(speed: f64) -> f64 {
    if (CUT_IN_SPEED..RATED_SPEED).contains(&speed) {
        ((speed - CUT_IN_SPEED) / (RATED_SPEED - CUT_IN_SPEED)).powi(3)
    } else if (RATED_SPEED..=CUT_OUT_SPEED).contains(&speed) {
        1.0
    } else {
        0.0
    }
}

/// Unclipped solar output (MW) for an irradiance value.
pub fn solar_power_mw(ghi: f64, capacity_mw: f64) -> f64 {
    if ghi < MIN_PRODUCTIVE_GHI {
        return 0.0;
    }
    ghi * PANEL_EFFICIENCY * (1.0 - SYSTEM_LOSSES) * (capacity_mw / 1000.0)
}

/// Power curve of a single site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerCurveModel {
    pub site_type: SiteType,
    pub capacity_mw: f64,
}

impl PowerCurveModel {
    pub fn new(site_type: SiteType, capacity_mw: f64) -> PipelineResult<Self> {
        if !capacity_mw.is_finite() || capacity_mw <= 0.0 {
            return Err(PipelineError::InvalidConfiguration(format!(
                "site capacity must be positive, got {capacity_mw} MW"
            )));
        }
        Ok(Self {
            site_type,
            capacity_mw,
        })
    }

    /// Build the curve for a site record, resolving its raw type.
    pub fn for_site(site: &Site) -> PipelineResult<Self> {
        Self::new(site.kind()?, site.capacity_mw)
    }

    /// Power output (MW) for one weather point, clipped to `[0, capacity]`.
    ///
    /// A missing input reading means no production for that hour.
    pub fn power_at(&self, point: &WeatherPoint) -> f64 {
        let raw = match self.site_type {
            SiteType::Wind => point
                .wind_speed
                .map(|v| wind_power_fraction(v) * self.capacity_mw)
                .unwrap_or(0.0),
            SiteType::Solar => point
                .ghi
                .map(|g| solar_power_mw(g, self.capacity_mw))
                .unwrap_or(0.0),
        };
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, self.capacity_mw)
        }
    }

    /// Convert a weather series into points carrying `power_mw`.
    pub fn apply(&self, weather: &[WeatherPoint]) -> Vec<TimeSeriesPoint> {
        weather
            .iter()
            .map(|w| TimeSeriesPoint {
                power_mw: self.power_at(w),
                ..TimeSeriesPoint::from_weather(w)
            })
            .collect()
    }
}
