use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use greenfleet::config::Config;
use greenfleet::domain::{BatteryConfig, GeoLocation, Site, WeatherPoint, DEFAULT_HORIZON_HOURS};
use greenfleet::forecast::{
    EmissionFactorTable, FixedNoise, ForecastPipeline, ForecastSummary, PriceTable, UniformNoise,
};
use greenfleet::optimizer::{Action, CHARGE_CEILING_SOC};
use greenfleet::PipelineError;
use std::sync::Arc;

async fn pipeline() -> ForecastPipeline {
    let prices = PriceTable::load("data/prices.json").await.unwrap();
    let emissions = EmissionFactorTable::load("data/grid_factors.json").await.unwrap();
    ForecastPipeline::new(Arc::new(prices), Arc::new(emissions))
}

fn site(site_type: &str, capacity_mw: f64) -> Site {
    Site {
        id: 10,
        name: "Scenario".to_string(),
        country: "TR".to_string(),
        capacity_mw,
        site_type: site_type.to_string(),
        location: GeoLocation {
            latitude: 39.9,
            longitude: 32.8,
        },
    }
}

fn start() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(2025, 6, 2, 0, 0, 0)
        .unwrap()
}

fn week_of_weather() -> Vec<WeatherPoint> {
    (0..DEFAULT_HORIZON_HOURS as i64)
        .map(|h| {
            let hour = h % 24;
            WeatherPoint {
                timestamp: start() + Duration::hours(h),
                wind_speed: Some(2.0 + ((h * 7) % 24) as f64),
                ghi: Some(if (6..19).contains(&hour) {
                    900.0 * (1.0 - ((hour - 12) as f64 / 7.0).powi(2))
                } else {
                    0.0
                }),
            }
        })
        .collect()
}

#[tokio::test]
async fn shipped_tables_are_complete() {
    let prices = PriceTable::load("data/prices.json").await.unwrap();
    for country in ["TR", "RO"] {
        assert!(prices.country(country).unwrap().is_complete(), "{country}");
    }
    let factors = EmissionFactorTable::load("data/grid_factors.json").await.unwrap();
    assert!(factors.factor("TR").is_ok());
    assert!(factors.factor("RO").is_ok());
}

#[test]
fn default_config_loads() {
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.weather.forecast_days, 7);
    assert_eq!(cfg.battery, BatteryConfig::default());
    assert!(!cfg.sites.is_empty());
    for s in &cfg.sites {
        assert!(s.check().is_ok());
        assert!(s.kind().is_ok());
    }
}

#[tokio::test]
async fn wind_curve_scenario() {
    let weather: Vec<WeatherPoint> = [2.0, 3.0, 7.5, 12.0, 20.0, 26.0]
        .iter()
        .enumerate()
        .map(|(i, &v)| WeatherPoint {
            timestamp: start() + Duration::hours(i as i64),
            wind_speed: Some(v),
            ghi: None,
        })
        .collect();
    let out = pipeline()
        .await
        .run(&weather, &site("wind", 10.0), None, &mut FixedNoise(1.0))
        .unwrap();
    let power: Vec<f64> = out.points.iter().map(|p| p.power_mw).collect();
    assert_eq!(power, vec![0.0, 0.0, 1.25, 10.0, 10.0, 0.0]);
}

#[tokio::test]
async fn solar_curve_scenario() {
    let weather: Vec<WeatherPoint> = [0.0, 4.0, 500.0, 1000.0]
        .iter()
        .enumerate()
        .map(|(i, &g)| WeatherPoint {
            timestamp: start() + Duration::hours(i as i64),
            wind_speed: None,
            ghi: Some(g),
        })
        .collect();
    let out = pipeline()
        .await
        .run(&weather, &site("solar", 5.0), None, &mut FixedNoise(1.0))
        .unwrap();
    let expected = [0.0, 0.0, 0.425, 0.85];
    for (p, want) in out.points.iter().zip(expected) {
        assert!((p.power_mw - want).abs() < 1e-9);
    }
}

#[tokio::test]
async fn week_long_wind_forecast_with_battery() {
    let mut noise = UniformNoise::new(0.05, Some(2024)).unwrap();
    let cfg = BatteryConfig::default();
    let out = pipeline()
        .await
        .run(&week_of_weather(), &site("wind", 10.0), Some(&cfg), &mut noise)
        .unwrap();

    assert_eq!(out.len(), DEFAULT_HORIZON_HOURS);
    let dispatch = out.dispatch.as_ref().unwrap();
    assert!(dispatch.count(Action::Charge) > 0);
    assert!(dispatch.count(Action::Discharge) > 0);

    for (p, step) in out.points.iter().zip(&dispatch.steps) {
        assert_eq!(p.revenue, p.power_mw * p.price_per_mwh);
        assert_eq!(p.co2_saved_kg, p.power_mw * 1000.0 * out.grid_factor);
        assert_eq!(p.power_mw, step.renewable_power_mw + step.battery_power_mw);
        if step.action == Action::Charge {
            assert!(step.battery_power_mw <= step.renewable_power_mw);
        }
        let soc = p.battery_soc.unwrap();
        assert!((0.0..=1.0).contains(&soc));
    }
    for pair in out.points.windows(2) {
        assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::hours(1));
    }

    let summary = ForecastSummary::from_points(out.site_id, &out.points[..24]);
    assert_eq!(summary.points, 24);
    assert!(summary.battery.is_some());
}

#[tokio::test]
async fn solar_battery_never_charges_at_night() {
    let cfg = BatteryConfig::new(8.0, 2.0, 0.1);
    let out = pipeline()
        .await
        .run(&week_of_weather(), &site("solar", 5.0), Some(&cfg), &mut FixedNoise(1.0))
        .unwrap();
    for p in &out.points {
        if p.ghi == Some(0.0) {
            assert!(p.battery_power_mw.unwrap() <= 0.0);
        }
    }
}

#[tokio::test]
async fn charge_ceiling_holds_in_cheap_hours() {
    // constant wind, so only the price decides
    let weather: Vec<WeatherPoint> = (0..DEFAULT_HORIZON_HOURS as i64)
        .map(|h| WeatherPoint {
            timestamp: start() + Duration::hours(h),
            wind_speed: Some(14.0),
            ghi: None,
        })
        .collect();
    let cfg = BatteryConfig::default();
    let out = pipeline()
        .await
        .run(&weather, &site("wind", 10.0), Some(&cfg), &mut FixedNoise(1.0))
        .unwrap();
    let dispatch = out.dispatch.unwrap();
    for step in &dispatch.steps {
        if step.action == Action::Charge {
            assert!(step.energy_before_mwh / cfg.capacity_mwh < CHARGE_CEILING_SOC);
        }
    }
}

#[tokio::test]
async fn reproducible_with_same_seed() {
    let p = pipeline().await;
    let w = week_of_weather();
    let cfg = BatteryConfig::default();
    let run = |seed: u64| {
        let mut noise = UniformNoise::new(0.05, Some(seed)).unwrap();
        p.run(&w, &site("wind", 10.0), Some(&cfg), &mut noise).unwrap()
    };
    assert_eq!(run(5), run(5));
    assert_ne!(run(5).points, run(6).points);
}

#[tokio::test]
async fn unknown_country_is_reported() {
    let mut s = site("wind", 10.0);
    s.country = "DE".to_string();
    let err = pipeline()
        .await
        .run(&week_of_weather(), &s, None, &mut FixedNoise(1.0))
        .unwrap_err();
    assert!(matches!(err, PipelineError::PriceDataUnavailable { .. }));
    assert!(err.is_retryable());
}
