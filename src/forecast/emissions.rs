use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use tracing::debug;

use crate::domain::TimeSeriesPoint;
use crate::error::{PipelineError, PipelineResult};

/// Grid emission factors per country (kg CO₂ per kWh displaced)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmissionFactorTable {
    factors: HashMap<String, f64>,
}

impl EmissionFactorTable {
    pub fn new(factors: HashMap<String, f64>) -> Self {
        Self { factors }
    }

    pub fn from_json_str(raw: &str) -> PipelineResult<Self> {
        serde_json::from_str(raw).map_err(|e| {
            PipelineError::GridFactorUnavailable(format!("malformed grid factor table: {e}"))
        })
    }

    pub async fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::GridFactorUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn factor(&self, country: &str) -> PipelineResult<f64> {
        match self.factors.get(country) {
            Some(f) if f.is_finite() && *f >= 0.0 => Ok(*f),
            Some(f) => Err(PipelineError::GridFactorUnavailable(format!(
                "{country} (invalid factor {f})"
            ))),
            None => Err(PipelineError::GridFactorUnavailable(country.to_string())),
        }
    }
}

/// CO₂ savings of displaced grid generation.
pub fn co2_saved_kg(power_mw: f64, grid_factor: f64) -> f64 {
    power_mw * 1000.0 * grid_factor
}

pub struct EmissionsCalculator<'a> {
    table: &'a EmissionFactorTable,
}

impl<'a> EmissionsCalculator<'a> {
    pub fn new(table: &'a EmissionFactorTable) -> Self {
        Self { table }
    }

    /// Fill `co2_saved_kg` and return the factor used so later stages can reuse it.
    pub fn apply(&self, points: &mut [TimeSeriesPoint], country: &str) -> PipelineResult<f64> {
        let factor = self.table.factor(country)?;
        for p in points.iter_mut() {
            p.co2_saved_kg = co2_saved_kg(p.power_mw, factor);
        }
        debug!(%country, grid_factor = factor, "co2 savings computed");
        Ok(factor)
    }
}
