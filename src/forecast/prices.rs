use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, Timelike, Weekday};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

/// Lowercase English weekday name used as multiplier key.
pub fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Price profile of one country (EUR/MWh)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryPrices {
    pub base_price: f64,
    /// Multipliers keyed by zero-padded hour ("00".."23")
    #[serde(default)]
    pub daily_pattern: HashMap<String, f64>,
    /// Multipliers keyed by lowercase weekday ("monday".."sunday")
    #[serde(default)]
    pub weekly_multiplier: HashMap<String, f64>,
}

impl CountryPrices {
    pub fn hourly_factor(&self, hour: u32) -> f64 {
        self.daily_pattern
            .get(&format!("{hour:02}"))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn weekday_factor(&self, day: Weekday) -> f64 {
        self.weekly_multiplier
            .get(weekday_key(day))
            .copied()
            .unwrap_or(1.0)
    }

    /// Deterministic part of the price at `ts`, in the timestamp's own offset.
    pub fn shaped_price(&self, ts: &DateTime<FixedOffset>) -> f64 {
        self.base_price * self.hourly_factor(ts.hour()) * self.weekday_factor(ts.weekday())
    }

    /// True when all 24 hours and all 7 weekdays carry a multiplier.
    pub fn is_complete(&self) -> bool {
        (0..24).all(|h| self.daily_pattern.contains_key(&format!("{h:02}")))
            && WEEKDAYS
                .iter()
                .all(|d| self.weekly_multiplier.contains_key(weekday_key(*d)))
    }
}

/// Snapshot of the per-country price tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    #[serde(default)]
    pub last_updated: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_with_fallback: bool,
    #[serde(flatten)]
    pub countries: HashMap<String, CountryPrices>,
}

impl PriceTable {
    pub fn from_json_str(raw: &str) -> PipelineResult<Self> {
        serde_json::from_str(raw).map_err(|e| {
            PipelineError::price_unavailable("*", format!("malformed price table: {e}"))
        })
    }

    pub async fn load(path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let path = path.into();
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PipelineError::price_unavailable("*", format!("cannot read {}: {e}", path.display()))
        })?;
        let table = Self::from_json_str(&raw)?;
        debug!(path = %path.display(), countries = table.countries.len(), "price table loaded");
        Ok(table)
    }

    pub fn country(&self, country: &str) -> PipelineResult<&CountryPrices> {
        self.countries
            .get(country)
            .ok_or_else(|| PipelineError::price_unavailable(country, "country not in price table"))
    }

    /// A table without a timestamp is always stale.
    pub fn is_stale(&self, now: NaiveDateTime, max_age: Duration) -> bool {
        match self.last_updated {
            Some(ts) => now - ts > max_age,
            None => true,
        }
    }

    /// Replace base prices with fallback values when the table is stale.
    ///
    /// Returns whether the fallback was applied.
    pub fn apply_fallback(
        &mut self,
        base_prices: &HashMap<String, f64>,
        now: NaiveDateTime,
        max_age: Duration,
    ) -> bool {
        if !self.is_stale(now, max_age) || base_prices.is_empty() {
            return false;
        }
        for (country, base) in base_prices {
            match self.countries.get_mut(country) {
                Some(entry) => entry.base_price = *base,
                None => warn!(%country, "fallback price for country missing from table"),
            }
        }
        self.last_updated = Some(now);
        self.updated_with_fallback = true;
        true
    }
}

/// Source of the multiplicative intraday noise applied to each price point.
pub trait PriceNoise: Send {
    fn factor(&mut self) -> f64;
}

/// Uniform noise in `[1 - amplitude, 1 + amplitude]`
pub struct UniformNoise {
    rng: StdRng,
    low: f64,
    high: f64,
}

impl UniformNoise {
    pub fn new(amplitude: f64, seed: Option<u64>) -> PipelineResult<Self> {
        if !(0.0..1.0).contains(&amplitude) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "price noise amplitude must be in [0, 1), got {amplitude}"
            )));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            low: 1.0 - amplitude,
            high: 1.0 + amplitude,
        })
    }
}

impl PriceNoise for UniformNoise {
    fn factor(&mut self) -> f64 {
        self.rng.gen_range(self.low..=self.high)
    }
}

/// Constant factor, `FixedNoise(1.0)` disables noise.
#[derive(Debug, Clone, Copy)]
pub struct FixedNoise(pub f64);

impl PriceNoise for FixedNoise {
    fn factor(&mut self) -> f64 {
        self.0
    }
}

/// Supplies a price per MWh for a country at a sequence of instants.
pub trait PriceOracle: Send + Sync {
    fn prices(
        &self,
        country: &str,
        timestamps: &[DateTime<FixedOffset>],
        noise: &mut dyn PriceNoise,
    ) -> PipelineResult<Vec<f64>>;

    fn price_at(
        &self,
        country: &str,
        timestamp: &DateTime<FixedOffset>,
        noise: &mut dyn PriceNoise,
    ) -> PipelineResult<f64> {
        self.prices(country, std::slice::from_ref(timestamp), noise)?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::price_unavailable(country, "no price returned"))
    }
}

impl PriceOracle for PriceTable {
    fn prices(
        &self,
        country: &str,
        timestamps: &[DateTime<FixedOffset>],
        noise: &mut dyn PriceNoise,
    ) -> PipelineResult<Vec<f64>> {
        let entry = self.country(country)?;
        if !entry.is_complete() {
            warn!(%country, "price profile incomplete, missing multipliers default to 1.0");
        }
        Ok(timestamps
            .iter()
            .map(|ts| entry.shaped_price(ts) * noise.factor())
            .collect())
    }
}

/// Where the price table comes from
#[async_trait]
pub trait PriceTableSource: Send + Sync {
    async fn load(&self) -> PipelineResult<PriceTable>;
}

/// JSON file on local disk
#[derive(Debug, Clone)]
pub struct FilePriceSource {
    pub path: PathBuf,
}

impl FilePriceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PriceTableSource for FilePriceSource {
    async fn load(&self) -> PipelineResult<PriceTable> {
        PriceTable::load(&self.path).await
    }
}
