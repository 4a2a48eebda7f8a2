use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    EmissionFactorTable, EmissionsCalculator, PowerCurveModel, PriceNoise, PriceOracle,
    RevenueCalculator,
};
use crate::domain::{check_hourly, BatteryConfig, Site, TimeSeriesPoint, WeatherPoint};
use crate::error::{PipelineError, PipelineResult};
use crate::optimizer::{BatteryDispatchSimulator, DispatchOutcome};

/// Annotated forecast of one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub site_id: i64,
    /// kg CO₂ per kWh used for every point of this series
    pub grid_factor: f64,
    pub points: Vec<TimeSeriesPoint>,
    #[serde(skip)]
    pub dispatch: Option<DispatchOutcome>,
}

impl ForecastSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_battery(&self) -> bool {
        self.dispatch.is_some()
    }
}

/// Runs power → revenue → CO₂ → battery over one site's weather series.
///
/// Price and emission tables are snapshots; a run never observes a refresh.
#[derive(Clone)]
pub struct ForecastPipeline {
    prices: Arc<dyn PriceOracle>,
    emissions: Arc<EmissionFactorTable>,
}

impl ForecastPipeline {
    pub fn new(prices: Arc<dyn PriceOracle>, emissions: Arc<EmissionFactorTable>) -> Self {
        Self { prices, emissions }
    }

    pub fn run(
        &self,
        weather: &[WeatherPoint],
        site: &Site,
        battery: Option<&BatteryConfig>,
        noise: &mut dyn PriceNoise,
    ) -> PipelineResult<ForecastSeries> {
        let curve = PowerCurveModel::for_site(site)?;
        if weather.is_empty() {
            return Err(PipelineError::DegenerateInput(format!(
                "site {} has an empty weather series",
                site.id
            )));
        }
        check_hourly(weather.iter().map(|w| w.timestamp))?;

        let mut points = curve.apply(weather);
        debug!(
            site_id = site.id,
            site_type = %curve.site_type,
            points = points.len(),
            "power computed"
        );

        RevenueCalculator::new(self.prices.as_ref()).apply(&mut points, &site.country, noise)?;
        let grid_factor =
            EmissionsCalculator::new(&self.emissions).apply(&mut points, &site.country)?;

        let dispatch = match battery {
            Some(cfg) => {
                let simulator = BatteryDispatchSimulator::new(*cfg)?;
                Some(simulator.simulate(&mut points, grid_factor)?)
            }
            None => None,
        };

        info!(
            site_id = site.id,
            country = %site.country,
            points = points.len(),
            battery = dispatch.is_some(),
            "forecast pipeline completed"
        );

        Ok(ForecastSeries {
            site_id: site.id,
            grid_factor,
            points,
            dispatch,
        })
    }
}
