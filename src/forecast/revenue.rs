use tracing::debug;

use super::{PriceNoise, PriceOracle};
use crate::domain::TimeSeriesPoint;
use crate::error::PipelineResult;

/// Prices a power series and derives revenue per point.
pub struct RevenueCalculator<'a> {
    oracle: &'a dyn PriceOracle,
}

impl<'a> RevenueCalculator<'a> {
    pub fn new(oracle: &'a dyn PriceOracle) -> Self {
        Self { oracle }
    }

    /// Fill `price_per_mwh` and `revenue` for every point.
    ///
    /// Nothing is written unless the whole series can be priced.
    pub fn apply(
        &self,
        points: &mut [TimeSeriesPoint],
        country: &str,
        noise: &mut dyn PriceNoise,
    ) -> PipelineResult<()> {
        let timestamps: Vec<_> = points.iter().map(|p| p.timestamp).collect();
        let prices = self.oracle.prices(country, &timestamps, noise)?;

        for (point, price) in points.iter_mut().zip(prices) {
            point.price_per_mwh = price;
            point.revenue = point.power_mw * price;
        }
        debug!(%country, points = points.len(), "revenue computed");
        Ok(())
    }
}
