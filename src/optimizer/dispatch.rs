use tracing::{debug, warn};

use super::{Action, BatteryState, DispatchOutcome, DispatchStep};
use crate::domain::{check_hourly, BatteryConfig, TimeSeriesPoint};
use crate::error::{PipelineError, PipelineResult};
use crate::forecast::co2_saved_kg;

/// Charging stops once SoC reaches this level
pub const CHARGE_CEILING_SOC: f64 = 0.95;
/// Discharging stops once SoC falls to this level
pub const DISCHARGE_FLOOR_SOC: f64 = 0.05;

/// Threshold-based battery arbitrage over an hourly price series:
/// - Charge from co-located renewables when the price is below the series mean
/// - Discharge when the price is above the mean
/// - Stay idle otherwise
///
/// The threshold is the mean over the whole horizon, computed before the first
/// step. That is look-ahead and only valid for offline simulation, not for a
/// live controller.
#[derive(Debug, Clone, Copy)]
pub struct BatteryDispatchSimulator {
    config: BatteryConfig,
}

impl BatteryDispatchSimulator {
    pub fn new(config: BatteryConfig) -> PipelineResult<Self> {
        if !(config.capacity_mwh.is_finite() && config.capacity_mwh > 0.0) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "battery capacity must be positive, got {} MWh",
                config.capacity_mwh
            )));
        }
        if !(config.power_mw.is_finite() && config.power_mw > 0.0) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "battery power rating must be positive, got {} MW",
                config.power_mw
            )));
        }
        if config.initial_soc.is_nan() {
            return Err(PipelineError::InvalidConfiguration(
                "battery initial SoC is NaN".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    /// Starting state, with the initial SoC clamped into [0, 1].
    pub fn initial_state(&self) -> BatteryState {
        let soc = self.config.initial_soc.clamp(0.0, 1.0);
        if soc != self.config.initial_soc {
            warn!(
                initial_soc = self.config.initial_soc,
                clamped = soc,
                "battery initial SoC outside [0, 1], clamping"
            );
        }
        BatteryState::new(soc, self.config.capacity_mwh)
    }

    /// Arithmetic mean of all prices in the series.
    pub fn price_threshold(points: &[TimeSeriesPoint]) -> PipelineResult<f64> {
        if points.is_empty() {
            return Err(PipelineError::DegenerateInput(
                "cannot dispatch a battery over an empty series".to_string(),
            ));
        }
        if let Some(p) = points.iter().find(|p| !p.price_per_mwh.is_finite()) {
            return Err(PipelineError::DegenerateInput(format!(
                "non-finite price at {}",
                p.timestamp
            )));
        }
        let sum: f64 = points.iter().map(|p| p.price_per_mwh).sum();
        Ok(sum / points.len() as f64)
    }

    /// Decide the battery power for one hour.
    ///
    /// Charging draws only on renewable output, never on the grid.
    pub fn decide(
        &self,
        state: &BatteryState,
        price: f64,
        threshold: f64,
        renewable_power_mw: f64,
    ) -> (Action, f64) {
        let cfg = &self.config;
        if price < threshold && state.soc < CHARGE_CEILING_SOC {
            let headroom = cfg.power_mw.min(cfg.capacity_mwh * (1.0 - state.soc));
            let power = headroom.min(renewable_power_mw.max(0.0));
            if power > 0.0 {
                return (Action::Charge, power);
            }
        } else if price > threshold && state.soc > DISCHARGE_FLOOR_SOC {
            let power = cfg.power_mw.min(cfg.capacity_mwh * state.soc);
            if power > 0.0 {
                return (Action::Discharge, -power);
            }
        }
        (Action::Idle, 0.0)
    }

    /// Apply `battery_power_mw` for one hour and reconcile energy with the clipped SoC.
    pub fn advance(&self, state: BatteryState, battery_power_mw: f64) -> (BatteryState, f64) {
        let capacity = self.config.capacity_mwh;
        let unclipped = state.energy_mwh + battery_power_mw;
        let soc = (unclipped / capacity).clamp(0.0, 1.0);
        (BatteryState::new(soc, capacity), unclipped)
    }

    /// Run the battery over a priced series in timestamp order.
    ///
    /// Rewrites `power_mw` as renewable plus battery power, then recomputes
    /// revenue and CO₂ savings with `grid_factor`.
    pub fn simulate(
        &self,
        points: &mut [TimeSeriesPoint],
        grid_factor: f64,
    ) -> PipelineResult<DispatchOutcome> {
        if !(grid_factor.is_finite() && grid_factor >= 0.0) {
            return Err(PipelineError::DegenerateInput(format!(
                "grid emission factor must be a non-negative number, got {grid_factor}"
            )));
        }
        check_hourly(points.iter().map(|p| p.timestamp))?;
        let threshold = Self::price_threshold(points)?;

        let mut state = self.initial_state();
        let mut steps = Vec::with_capacity(points.len());

        for point in points.iter_mut() {
            let price = point.price_per_mwh;
            let renewable = point.power_mw;
            let (action, battery_power) = self.decide(&state, price, threshold, renewable);

            let energy_before = state.energy_mwh;
            let (next, unclipped) = self.advance(state, battery_power);
            state = next;

            point.battery_soc = Some(state.soc);
            point.battery_power_mw = Some(battery_power);
            point.power_mw = renewable + battery_power;
            point.revenue = point.power_mw * price;
            point.co2_saved_kg = co2_saved_kg(point.power_mw, grid_factor);

            steps.push(DispatchStep {
                timestamp: point.timestamp,
                action,
                price_per_mwh: price,
                renewable_power_mw: renewable,
                battery_power_mw: battery_power,
                energy_before_mwh: energy_before,
                energy_unclipped_mwh: unclipped,
                soc: state.soc,
            });
        }

        let outcome = DispatchOutcome {
            price_threshold: threshold,
            steps,
        };
        debug!(
            threshold,
            charge_steps = outcome.count(Action::Charge),
            discharge_steps = outcome.count(Action::Discharge),
            final_soc = outcome.final_soc(),
            "battery dispatch simulated"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};
    use proptest::prelude::*;

    fn start() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 4, 7, 0, 0, 0)
            .unwrap()
    }

    fn series(prices: &[f64], power: &[f64]) -> Vec<TimeSeriesPoint> {
        prices
            .iter()
            .zip(power)
            .enumerate()
            .map(|(i, (&price, &p))| TimeSeriesPoint {
                timestamp: start() + Duration::hours(i as i64),
                wind_speed: None,
                ghi: None,
                power_mw: p,
                price_per_mwh: price,
                revenue: p * price,
                co2_saved_kg: p * 1000.0 * 0.4,
                battery_soc: None,
                battery_power_mw: None,
            })
            .collect()
    }

    fn simulator() -> BatteryDispatchSimulator {
        BatteryDispatchSimulator::new(BatteryConfig::default()).unwrap()
    }

    #[test]
    fn test_price_threshold() {
        let s = series(&[10.0, 20.0, 60.0], &[0.0; 3]);
        assert_eq!(BatteryDispatchSimulator::price_threshold(&s).unwrap(), 30.0);
        assert!(matches!(
            BatteryDispatchSimulator::price_threshold(&[]),
            Err(PipelineError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_cheap_regime_charges_to_ceiling_then_holds() {
        let prices: Vec<f64> = [10.0; 8].into_iter().chain([100.0; 8]).collect();
        let mut s = series(&prices, &[2.0; 16]);
        let outcome = simulator().simulate(&mut s, 0.4).unwrap();

        let cheap: Vec<f64> = outcome.steps[..8].iter().map(|st| st.soc).collect();
        let mut prev = 0.5;
        let mut reached_ceiling = false;
        for soc in cheap {
            assert!(soc <= 1.0);
            if reached_ceiling {
                assert_eq!(soc, prev, "SoC must hold once the ceiling is reached");
            } else {
                assert!(soc > prev, "SoC must strictly increase below the ceiling");
                reached_ceiling = soc >= CHARGE_CEILING_SOC;
            }
            prev = soc;
        }
        assert!(reached_ceiling);
        assert_eq!(outcome.steps[2].action, Action::Idle);
    }

    #[test]
    fn test_expensive_regime_discharges_to_floor() {
        let prices: Vec<f64> = [10.0; 4].into_iter().chain([100.0; 8]).collect();
        let mut s = series(&prices, &[0.0; 12]);
        let outcome = simulator().simulate(&mut s, 0.4).unwrap();

        // nothing to charge from during the cheap hours
        assert!(outcome.steps[..4].iter().all(|st| st.action == Action::Idle));
        let expensive: Vec<f64> = outcome.steps[4..].iter().map(|st| st.soc).collect();
        assert_eq!(expensive[0], 0.25);
        assert_eq!(expensive[1], 0.0);
        assert!(expensive[2..].iter().all(|&soc| soc == 0.0));
        assert_eq!(outcome.discharged_mwh(), 2.0);
    }

    #[test]
    fn test_net_power_revenue_and_co2_follow_battery() {
        let mut s = series(&[10.0, 90.0], &[3.0, 3.0]);
        simulator().simulate(&mut s, 0.5).unwrap();

        assert_eq!(s[0].battery_power_mw, Some(1.0));
        assert_eq!(s[0].power_mw, 4.0);
        assert_eq!(s[1].battery_power_mw, Some(-1.0));
        assert_eq!(s[1].power_mw, 2.0);
        for p in &s {
            assert_eq!(p.revenue, p.power_mw * p.price_per_mwh);
            assert_eq!(p.co2_saved_kg, p.power_mw * 1000.0 * 0.5);
        }
    }

    #[test]
    fn test_zero_renewable_output_keeps_emission_factor() {
        // first point produces nothing; the factor still applies to later points
        let mut s = series(&[90.0, 10.0, 90.0], &[0.0, 2.0, 0.0]);
        simulator().simulate(&mut s, 0.42).unwrap();
        for p in &s {
            assert!(p.co2_saved_kg.is_finite());
            assert_eq!(p.co2_saved_kg, p.power_mw * 1000.0 * 0.42);
        }
    }

    #[test]
    fn test_initial_soc_clamped() {
        let sim = BatteryDispatchSimulator::new(BatteryConfig::new(4.0, 1.0, 1.7)).unwrap();
        let state = sim.initial_state();
        assert_eq!(state.soc, 1.0);
        assert_eq!(state.energy_mwh, 4.0);

        let sim = BatteryDispatchSimulator::new(BatteryConfig::new(4.0, 1.0, -0.3)).unwrap();
        assert_eq!(sim.initial_state().soc, 0.0);
    }

    #[test]
    fn test_invalid_battery_rejected() {
        assert!(BatteryDispatchSimulator::new(BatteryConfig::new(0.0, 1.0, 0.5)).is_err());
        assert!(BatteryDispatchSimulator::new(BatteryConfig::new(4.0, 0.0, 0.5)).is_err());
        assert!(BatteryDispatchSimulator::new(BatteryConfig::new(4.0, 1.0, f64::NAN)).is_err());
    }

    #[test]
    fn test_unordered_series_rejected() {
        let mut s = series(&[10.0, 20.0], &[1.0, 1.0]);
        s.swap(0, 1);
        assert!(matches!(
            simulator().simulate(&mut s, 0.4),
            Err(PipelineError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_invalid_grid_factor_rejected() {
        let mut s = series(&[10.0], &[1.0]);
        assert!(simulator().simulate(&mut s, f64::NAN).is_err());
    }

    fn arb_case() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, BatteryConfig)> {
        (1usize..72).prop_flat_map(|n| {
            (
                prop::collection::vec(0.0f64..400.0, n),
                prop::collection::vec(0.0f64..20.0, n),
                (0.1f64..50.0, 0.1f64..10.0, -0.5f64..1.5)
                    .prop_map(|(c, p, s)| BatteryConfig::new(c, p, s)),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_soc_stays_in_bounds((prices, power, cfg) in arb_case()) {
            let mut s = series(&prices, &power);
            let outcome = BatteryDispatchSimulator::new(cfg).unwrap().simulate(&mut s, 0.4).unwrap();
            for step in &outcome.steps {
                prop_assert!((0.0..=1.0).contains(&step.soc));
            }
            for p in &s {
                let soc = p.battery_soc.unwrap();
                prop_assert!((0.0..=1.0).contains(&soc));
            }
        }

        #[test]
        fn prop_energy_conserved_before_clipping((prices, power, cfg) in arb_case()) {
            let mut s = series(&prices, &power);
            let outcome = BatteryDispatchSimulator::new(cfg).unwrap().simulate(&mut s, 0.4).unwrap();
            for step in &outcome.steps {
                let delta = step.energy_unclipped_mwh - step.energy_before_mwh - step.battery_power_mw;
                prop_assert!(delta.abs() < 1e-9);
            }
        }

        #[test]
        fn prop_no_grid_charging((prices, power, cfg) in arb_case()) {
            let mut s = series(&prices, &power);
            let outcome = BatteryDispatchSimulator::new(cfg).unwrap().simulate(&mut s, 0.4).unwrap();
            for step in &outcome.steps {
                if step.battery_power_mw > 0.0 {
                    prop_assert!(step.battery_power_mw <= step.renewable_power_mw);
                }
                prop_assert!(step.battery_power_mw <= cfg.power_mw);
                prop_assert!(-step.battery_power_mw <= cfg.power_mw);
            }
        }

        #[test]
        fn prop_revenue_identity_after_dispatch((prices, power, cfg) in arb_case()) {
            let mut s = series(&prices, &power);
            BatteryDispatchSimulator::new(cfg).unwrap().simulate(&mut s, 0.4).unwrap();
            for p in &s {
                prop_assert_eq!(p.revenue, p.power_mw * p.price_per_mwh);
            }
        }

        #[test]
        fn prop_dispatch_is_deterministic((prices, power, cfg) in arb_case()) {
            let sim = BatteryDispatchSimulator::new(cfg).unwrap();
            let mut a = series(&prices, &power);
            let mut b = a.clone();
            let oa = sim.simulate(&mut a, 0.4).unwrap();
            let ob = sim.simulate(&mut b, 0.4).unwrap();
            prop_assert_eq!(a, b);
            prop_assert_eq!(oa, ob);
        }
    }
}
