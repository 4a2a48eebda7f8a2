use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{PipelineError, PipelineResult};

/// Battery co-located with a site
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct BatteryConfig {
    /// Usable energy capacity (MWh)
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_mwh: f64,
    /// Maximum charge/discharge rate (MW)
    #[validate(range(exclusive_min = 0.0))]
    pub power_mw: f64,
    /// State of charge at the start of the horizon (0-1)
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_soc: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_mwh: 4.0,
            power_mw: 1.0,
            initial_soc: 0.5,
        }
    }
}

impl BatteryConfig {
    pub fn new(capacity_mwh: f64, power_mw: f64, initial_soc: f64) -> Self {
        Self {
            capacity_mwh,
            power_mw,
            initial_soc,
        }
    }

    pub fn check(&self) -> PipelineResult<()> {
        self.validate()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("battery: {e}")))
    }
}

/// Battery record bound to a site
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteBattery {
    pub site_id: i64,
    #[serde(flatten)]
    pub config: BatteryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = BatteryConfig::default();
        assert_eq!(cfg.capacity_mwh, 4.0);
        assert_eq!(cfg.power_mw, 1.0);
        assert_eq!(cfg.initial_soc, 0.5);
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(BatteryConfig::new(0.0, 1.0, 0.5).check().is_err());
        assert!(BatteryConfig::new(4.0, -1.0, 0.5).check().is_err());
        assert!(BatteryConfig::new(4.0, 1.0, 1.2).check().is_err());
        assert!(BatteryConfig::new(4.0, 1.0, 1.0).check().is_ok());
    }

    #[test]
    fn test_site_battery_flattened() {
        let raw = r#"{"site_id": 3, "capacity_mwh": 8.0, "power_mw": 2.0, "initial_soc": 0.2}"#;
        let rec: SiteBattery = serde_json::from_str(raw).unwrap();
        assert_eq!(rec.site_id, 3);
        assert_eq!(rec.config, BatteryConfig::new(8.0, 2.0, 0.2));
    }
}
