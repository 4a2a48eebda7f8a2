//! Aggregate figures over a forecast window
//!
//! Totals assume hourly points, so summed MW equals MWh.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::TimeSeriesPoint;

/// Battery activity within a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySummary {
    pub charged_mwh: f64,
    pub discharged_mwh: f64,
    pub min_soc: f64,
    pub max_soc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub site_id: i64,
    pub points: usize,
    pub production_mwh: f64,
    pub revenue: f64,
    pub co2_saved_kg: f64,
    pub peak_power_mw: f64,
    pub mean_price_per_mwh: f64,
    pub battery: Option<BatterySummary>,
}

impl ForecastSummary {
    pub fn from_points(site_id: i64, points: &[TimeSeriesPoint]) -> Self {
        let n = points.len();
        let production_mwh = points.iter().map(|p| p.power_mw).sum();
        let revenue = points.iter().map(|p| p.revenue).sum();
        let co2_saved_kg = points.iter().map(|p| p.co2_saved_kg).sum();
        let peak_power_mw = points.iter().map(|p| p.power_mw).fold(0.0f64, f64::max);
        let mean_price_per_mwh = if n == 0 {
            0.0
        } else {
            points.iter().map(|p| p.price_per_mwh).sum::<f64>() / n as f64
        };

        let socs: Vec<f64> = points.iter().filter_map(|p| p.battery_soc).collect();
        let battery = if socs.is_empty() {
            None
        } else {
            let flows = points.iter().filter_map(|p| p.battery_power_mw);
            let (charged_mwh, discharged_mwh) = flows.fold((0.0, 0.0), |(c, d), bp| {
                if bp >= 0.0 {
                    (c + bp, d)
                } else {
                    (c, d - bp)
                }
            });
            Some(BatterySummary {
                charged_mwh,
                discharged_mwh,
                min_soc: socs.iter().copied().fold(f64::INFINITY, f64::min),
                max_soc: socs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
        };

        Self {
            site_id,
            points: n,
            production_mwh,
            revenue,
            co2_saved_kg,
            peak_power_mw,
            mean_price_per_mwh,
            battery,
        }
    }
}

impl fmt::Display for ForecastSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "site {}: {} h, {:.2} MWh, {:.2} EUR, {:.1} t CO2 saved, peak {:.2} MW",
            self.site_id,
            self.points,
            self.production_mwh,
            self.revenue,
            self.co2_saved_kg / 1000.0,
            self.peak_power_mw
        )?;
        if let Some(b) = &self.battery {
            write!(
                f,
                ", battery +{:.2}/-{:.2} MWh (SoC {:.2}-{:.2})",
                b.charged_mwh, b.discharged_mwh, b.min_soc, b.max_soc
            )?;
        }
        Ok(())
    }
}
