use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Charge,
    Discharge,
    Idle,
}

/// Carried state of the battery between hourly steps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    pub soc: f64,
    pub energy_mwh: f64,
}

impl BatteryState {
    pub fn new(soc: f64, capacity_mwh: f64) -> Self {
        Self {
            soc,
            energy_mwh: soc * capacity_mwh,
        }
    }
}

/// Record of one dispatch decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispatchStep {
    pub timestamp: DateTime<FixedOffset>,
    pub action: Action,
    pub price_per_mwh: f64,
    /// Renewable output before the battery acted (MW)
    pub renewable_power_mw: f64,
    /// Positive charges, negative discharges (MW)
    pub battery_power_mw: f64,
    pub energy_before_mwh: f64,
    /// Energy after applying `battery_power_mw`, before SoC clipping
    pub energy_unclipped_mwh: f64,
    pub soc: f64,
}

/// Result of simulating a whole series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Mean price over the series; charge below, discharge above
    pub price_threshold: f64,
    pub steps: Vec<DispatchStep>,
}

impl DispatchOutcome {
    pub fn charged_mwh(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| s.battery_power_mw.max(0.0))
            .sum()
    }

    pub fn discharged_mwh(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| (-s.battery_power_mw).max(0.0))
            .sum()
    }

    pub fn final_soc(&self) -> Option<f64> {
        self.steps.last().map(|s| s.soc)
    }

    pub fn count(&self, action: Action) -> usize {
        self.steps.iter().filter(|s| s.action == action).count()
    }
}
