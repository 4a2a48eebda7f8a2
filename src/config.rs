use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{BatteryConfig, Site, SiteBattery};
use crate::telemetry::LoggingConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub weather: WeatherConfig,
    pub prices: PricesConfig,
    pub emissions: EmissionsConfig,
    /// Used for sites without a battery record when a battery run is requested
    #[serde(default)]
    pub battery: BatteryConfig,
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub batteries: Vec<SiteBattery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    pub base_url: String,
    pub forecast_days: u32,
    pub http_timeout_seconds: u64,
}
impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricesConfig {
    pub path: PathBuf,
    pub noise_amplitude: f64,
    pub noise_seed: Option<u64>,
    pub refresh_every_hours: u64,
    pub max_age_days: i64,
    #[serde(default)]
    pub fallback_base_price: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmissionsConfig { pub path: PathBuf }

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub update_every_hours: u64,
    pub retention_hours: i64,
    pub max_concurrent_sites: usize,
    pub run_on_start: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("GREENFLEET__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }
}
