pub mod scheduler;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, Local, Utc};
use futures::{stream, StreamExt};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{BatteryConfig, Site, TimeSeriesPoint, DEFAULT_HORIZON_HOURS};
use crate::error::{PipelineError, PipelineResult};
use crate::forecast::{
    EmissionFactorTable, FilePriceSource, ForecastPipeline, ForecastSeries, ForecastSummary,
    OpenMeteoClient, PriceTable, PriceTableSource, UniformNoise, WeatherProvider,
};
use crate::repo::Repositories;

pub use scheduler::{TaskSchedule, TaskScheduler, TaskStatus};

/// Latest published price table; readers take an `Arc` snapshot per run.
#[derive(Clone, Default)]
pub struct PriceBook {
    current: Arc<RwLock<Arc<PriceTable>>>,
}

impl PriceBook {
    pub fn new(table: PriceTable) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    pub async fn snapshot(&self) -> Arc<PriceTable> {
        self.current.read().await.clone()
    }

    pub async fn publish(&self, table: PriceTable) {
        *self.current.write().await = Arc::new(table);
    }
}

/// Knobs of the forecast service taken from configuration
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub default_battery: BatteryConfig,
    pub noise_amplitude: f64,
    pub noise_seed: Option<u64>,
    pub max_concurrent_sites: usize,
    pub retention: Duration,
}

impl ServiceSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            default_battery: cfg.battery,
            noise_amplitude: cfg.prices.noise_amplitude,
            noise_seed: cfg.prices.noise_seed,
            max_concurrent_sites: cfg.scheduler.max_concurrent_sites,
            retention: Duration::hours(cfg.scheduler.retention_hours),
        }
    }
}

/// Outcome of a bulk update over all sites
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub pruned: usize,
    /// Site id and number of stored points
    pub updated: Vec<(i64, usize)>,
    pub failures: Vec<(i64, PipelineError)>,
}

impl UpdateReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Whether a forecast answer came from the store or was computed on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ForecastOrigin {
    Stored,
    Computed,
}

#[derive(Debug, Clone)]
pub struct SiteForecast {
    pub site_id: i64,
    pub origin: ForecastOrigin,
    pub points: Vec<TimeSeriesPoint>,
}

pub struct ForecastService {
    weather: Arc<dyn WeatherProvider>,
    repos: Repositories,
    prices: PriceBook,
    emissions: Arc<EmissionFactorTable>,
    settings: ServiceSettings,
}

impl ForecastService {
    pub fn new(
        weather: Arc<dyn WeatherProvider>,
        repos: Repositories,
        prices: PriceBook,
        emissions: Arc<EmissionFactorTable>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            weather,
            repos,
            prices,
            emissions,
            settings,
        }
    }

    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    pub fn repos(&self) -> &Repositories {
        &self.repos
    }

    async fn pipeline(&self) -> ForecastPipeline {
        ForecastPipeline::new(self.prices.snapshot().await, self.emissions.clone())
    }

    /// Independent noise stream per site, reproducible when a seed is configured.
    fn noise_for(&self, site_id: i64) -> PipelineResult<UniformNoise> {
        UniformNoise::new(
            self.settings.noise_amplitude,
            self.settings
                .noise_seed
                .map(|seed| seed.wrapping_add(site_id as u64)),
        )
    }

    async fn run_site(
        &self,
        pipeline: &ForecastPipeline,
        site: &Site,
        battery: Option<BatteryConfig>,
    ) -> PipelineResult<ForecastSeries> {
        let weather = self.weather.fetch_hourly(&site.location).await?;
        let mut noise = self.noise_for(site.id)?;
        pipeline.run(&weather, site, battery.as_ref(), &mut noise)
    }

    /// Forecast one site on request; the battery stage falls back to the
    /// configured defaults when the site has no battery record.
    pub async fn forecast_site(
        &self,
        site_id: i64,
        include_battery: bool,
    ) -> PipelineResult<ForecastSeries> {
        let site = self.repos.sites.get(site_id).await?;
        let battery = if include_battery {
            Some(
                self.repos
                    .sites
                    .battery(site_id)
                    .await?
                    .unwrap_or(self.settings.default_battery),
            )
        } else {
            None
        };
        let pipeline = self.pipeline().await;
        self.run_site(&pipeline, &site, battery).await
    }

    /// Stored records of a site in `[from, to)`.
    pub async fn stored_forecast(
        &self,
        site_id: i64,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> PipelineResult<Vec<TimeSeriesPoint>> {
        self.repos.sites.get(site_id).await?;
        self.repos.forecasts.range(site_id, from, to).await
    }

    /// Forecast for the coming week, served from the store when records exist.
    pub async fn read_forecast(
        &self,
        site_id: i64,
        include_battery: bool,
    ) -> PipelineResult<SiteForecast> {
        self.read_forecast_from(site_id, Local::now().fixed_offset(), include_battery)
            .await
    }

    /// Serves stored records over `[from, from + horizon)` and only runs the
    /// pipeline when none exist. Stored battery columns are left out unless
    /// `include_battery` is set.
    pub async fn read_forecast_from(
        &self,
        site_id: i64,
        from: DateTime<FixedOffset>,
        include_battery: bool,
    ) -> PipelineResult<SiteForecast> {
        let to = from + Duration::hours(DEFAULT_HORIZON_HOURS as i64);
        let mut points = self.stored_forecast(site_id, from, to).await?;
        if points.is_empty() {
            debug!(site_id, "no stored forecast, computing on demand");
            let series = self.forecast_site(site_id, include_battery).await?;
            return Ok(SiteForecast {
                site_id,
                origin: ForecastOrigin::Computed,
                points: series.points,
            });
        }
        if !include_battery {
            for p in &mut points {
                p.battery_soc = None;
                p.battery_power_mw = None;
            }
        }
        Ok(SiteForecast {
            site_id,
            origin: ForecastOrigin::Stored,
            points,
        })
    }

    /// Recompute and store forecasts for every site.
    ///
    /// A failing site is recorded in the report and never aborts the others.
    /// The battery stage runs only for sites with a battery record.
    pub async fn update_all_sites(&self) -> PipelineResult<UpdateReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let cutoff: DateTime<FixedOffset> = Local::now().fixed_offset() - self.settings.retention;
        let pruned = self.repos.forecasts.delete_before(cutoff).await?;

        let sites = self.repos.sites.list().await?;
        let pipeline = self.pipeline().await;
        info!(%run_id, sites = sites.len(), pruned, "updating forecasts for all sites");

        let results: Vec<(i64, PipelineResult<usize>)> = stream::iter(sites)
            .map(|site| {
                let pipeline = &pipeline;
                async move { (site.id, self.update_site(pipeline, &site).await) }
            })
            .buffer_unordered(self.settings.max_concurrent_sites.max(1))
            .collect()
            .await;

        let mut report = UpdateReport {
            run_id,
            started_at,
            pruned,
            updated: Vec::new(),
            failures: Vec::new(),
        };
        for (site_id, outcome) in results {
            match outcome {
                Ok(n) => report.updated.push((site_id, n)),
                Err(e) => {
                    warn!(
                        %run_id,
                        site_id,
                        error = %e,
                        retryable = e.is_retryable(),
                        "site forecast failed"
                    );
                    report.failures.push((site_id, e));
                }
            }
        }
        report.updated.sort_by_key(|(id, _)| *id);
        report.failures.sort_by_key(|(id, _)| *id);

        info!(
            %run_id,
            updated = report.updated.len(),
            failed = report.failures.len(),
            "forecast update finished"
        );
        Ok(report)
    }

    async fn update_site(&self, pipeline: &ForecastPipeline, site: &Site) -> PipelineResult<usize> {
        let battery = self.repos.sites.battery(site.id).await?;
        let series = self.run_site(pipeline, site, battery).await?;
        let n = series.len();
        self.repos.forecasts.replace_from(site.id, series.points).await?;
        Ok(n)
    }

    /// Aggregate stored records of a site over `[from, from + hours)`.
    pub async fn site_summary(
        &self,
        site_id: i64,
        from: DateTime<FixedOffset>,
        hours: i64,
    ) -> PipelineResult<ForecastSummary> {
        let points = self
            .stored_forecast(site_id, from, from + Duration::hours(hours))
            .await?;
        Ok(ForecastSummary::from_points(site_id, &points))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub service: Arc<ForecastService>,
    pub scheduler: Arc<TaskScheduler>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let repos = Repositories::from_config(&cfg).context("invalid site records")?;

        let price_source: Arc<dyn PriceTableSource> =
            Arc::new(FilePriceSource::new(cfg.prices.path.clone()));
        let prices = PriceBook::new(price_source.load().await.context("loading price table")?);
        let emissions = Arc::new(
            EmissionFactorTable::load(&cfg.emissions.path)
                .await
                .context("loading grid emission factors")?,
        );
        let weather: Arc<dyn WeatherProvider> = Arc::new(OpenMeteoClient::new(
            cfg.weather.base_url.clone(),
            cfg.weather.forecast_days,
            cfg.weather.timeout(),
        )?);

        let service = Arc::new(ForecastService::new(
            weather,
            repos,
            prices,
            emissions,
            ServiceSettings::from_config(&cfg),
        ));
        let scheduler = Arc::new(TaskScheduler::new(
            service.clone(),
            price_source,
            TaskSchedule::from_config(&cfg),
        ));

        Ok(Self {
            cfg,
            service,
            scheduler,
        })
    }
}
