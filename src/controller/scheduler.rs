use chrono::{DateTime, Local, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::ForecastService;
use crate::config::Config;
use crate::error::PipelineResult;
use crate::forecast::PriceTableSource;

/// Periodic task configuration
#[derive(Debug, Clone)]
pub struct TaskSchedule {
    /// Forecast update interval
    pub forecast_every: Duration,
    /// Price table reload interval
    pub prices_every: Duration,
    /// Run both tasks immediately on start instead of after one interval
    pub run_on_start: bool,
    /// A price table older than this gets fallback base prices
    pub price_max_age: chrono::Duration,
    pub fallback_base_price: HashMap<String, f64>,
}

impl TaskSchedule {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            forecast_every: Duration::from_secs(cfg.scheduler.update_every_hours.max(1) * 3600),
            prices_every: Duration::from_secs(cfg.prices.refresh_every_hours.max(1) * 3600),
            run_on_start: cfg.scheduler.run_on_start,
            price_max_age: chrono::Duration::days(cfg.prices.max_age_days),
            fallback_base_price: cfg.prices.fallback_base_price.clone(),
        }
    }
}

impl Default for TaskSchedule {
    fn default() -> Self {
        Self {
            forecast_every: Duration::from_secs(6 * 3600), // 6 hours
            prices_every: Duration::from_secs(24 * 3600),  // daily
            run_on_start: true,
            price_max_age: chrono::Duration::days(7),
            fallback_base_price: HashMap::new(),
        }
    }
}

/// Task status tracking
#[derive(Debug, Clone, Default)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Sites that failed during the last otherwise successful run
    pub last_failed_sites: Vec<i64>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

impl TaskStatus {
    fn started(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        self.run_count += 1;
    }

    fn succeeded(&mut self, now: DateTime<Utc>) {
        self.last_success = Some(now);
        self.success_count += 1;
        self.last_error = None;
    }

    fn failed(&mut self, err: String) {
        self.error_count += 1;
        self.last_error = Some(err);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Forecast,
    Prices,
}

/// Owns the periodic forecast update and price refresh.
///
/// Lifecycle is explicit: [`TaskScheduler::start`] spawns both loops,
/// [`TaskScheduler::stop`] cancels them and waits for them to finish.
pub struct TaskScheduler {
    schedule: TaskSchedule,
    service: Arc<ForecastService>,
    price_source: Arc<dyn PriceTableSource>,
    forecast_status: RwLock<TaskStatus>,
    price_status: RwLock<TaskStatus>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(
        service: Arc<ForecastService>,
        price_source: Arc<dyn PriceTableSource>,
        schedule: TaskSchedule,
    ) -> Self {
        Self {
            schedule,
            service,
            price_source,
            forecast_status: RwLock::new(TaskStatus::default()),
            price_status: RwLock::new(TaskStatus::default()),
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start all periodic tasks. Calling it again while running is a no-op.
    ///
    /// With `run_on_start` the first price refresh completes before any
    /// forecast run, so the first stored forecast sees the published table.
    pub async fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            warn!("scheduler already running");
            return;
        }
        if self.cancel.is_cancelled() {
            warn!("scheduler was stopped and cannot be restarted");
            return;
        }

        if self.schedule.run_on_start {
            self.run_price_refresh().await;
        }
        for task in [Task::Prices, Task::Forecast] {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_loop(task).await;
            }));
        }
        info!(
            forecast_every_secs = self.schedule.forecast_every.as_secs(),
            prices_every_secs = self.schedule.prices_every.as_secs(),
            "periodic tasks started"
        );
    }

    /// Cancel all tasks and wait for them to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "periodic task panicked");
            }
        }
        info!("periodic tasks stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn run_loop(&self, task: Task) {
        let period = match task {
            Task::Forecast => self.schedule.forecast_every,
            Task::Prices => self.schedule.prices_every,
        };
        // the initial price refresh already ran inside start()
        let first = if self.schedule.run_on_start && task == Task::Forecast {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match task {
                Task::Forecast => self.run_forecast_update().await,
                Task::Prices => self.run_price_refresh().await,
            }
        }
    }

    /// One forecast update run, recorded in the task status.
    pub async fn run_forecast_update(&self) {
        let now = Utc::now();
        self.forecast_status.write().await.started(now);

        match self.service.update_all_sites().await {
            Ok(report) => {
                let mut status = self.forecast_status.write().await;
                status.succeeded(now);
                status.last_failed_sites = report.failures.iter().map(|(id, _)| *id).collect();
            }
            Err(e) => {
                self.forecast_status.write().await.failed(e.to_string());
                error!(error = %e, "forecast update failed");
            }
        }
    }

    /// One price refresh run, recorded in the task status.
    pub async fn run_price_refresh(&self) {
        let now = Utc::now();
        self.price_status.write().await.started(now);

        match self.refresh_prices().await {
            Ok(fallback) => {
                self.price_status.write().await.succeeded(now);
                info!(fallback, "price table refreshed");
            }
            Err(e) => {
                self.price_status.write().await.failed(e.to_string());
                warn!(error = %e, "price refresh failed, keeping previous table");
            }
        }
    }

    /// Reload the price table, apply the staleness fallback and publish it.
    ///
    /// Returns whether fallback base prices were applied.
    pub async fn refresh_prices(&self) -> PipelineResult<bool> {
        let mut table = self.price_source.load().await?;
        let fallback = table.apply_fallback(
            &self.schedule.fallback_base_price,
            Local::now().naive_local(),
            self.schedule.price_max_age,
        );
        if fallback {
            warn!(
                max_age_days = self.schedule.price_max_age.num_days(),
                "price table stale, fallback base prices applied"
            );
        }
        self.service.prices().publish(table).await;
        Ok(fallback)
    }

    pub async fn forecast_status(&self) -> TaskStatus {
        self.forecast_status.read().await.clone()
    }

    pub async fn price_status(&self) -> TaskStatus {
        self.price_status.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{first_hour, service_with, site, weather_at};
    use crate::domain::Site;
    use crate::error::PipelineError;
    use crate::forecast::{MockWeatherProvider, PriceTable};
    use async_trait::async_trait;

    struct StaticPrices(String);

    #[async_trait]
    impl PriceTableSource for StaticPrices {
        async fn load(&self) -> PipelineResult<PriceTable> {
            PriceTable::from_json_str(&self.0)
        }
    }

    struct BrokenPrices;

    #[async_trait]
    impl PriceTableSource for BrokenPrices {
        async fn load(&self) -> PipelineResult<PriceTable> {
            Err(PipelineError::price_unavailable("*", "source offline"))
        }
    }

    struct SlowPrices(String);

    #[async_trait]
    impl PriceTableSource for SlowPrices {
        async fn load(&self) -> PipelineResult<PriceTable> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            PriceTable::from_json_str(&self.0)
        }
    }

    const STALE_TABLE: &str = r#"{
        "TR": {"base_price": 75.0},
        "last_updated": "2020-01-01T00:00:00"
    }"#;

    fn fresh_table() -> String {
        let now = Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S");
        format!(r#"{{"TR": {{"base_price": 75.0}}, "last_updated": "{now}"}}"#)
    }

    fn scheduler(source: Arc<dyn PriceTableSource>) -> Arc<TaskScheduler> {
        scheduler_for(source, vec![site(1, "wind", "TR")])
    }

    fn scheduler_for(source: Arc<dyn PriceTableSource>, sites: Vec<Site>) -> Arc<TaskScheduler> {
        let mut weather = MockWeatherProvider::new();
        let start = first_hour();
        weather
            .expect_fetch_hourly()
            .returning(move |_| Ok(weather_at(start, 24)));
        let service = Arc::new(service_with(weather, sites, vec![]));
        let schedule = TaskSchedule {
            fallback_base_price: HashMap::from([("TR".to_string(), 85.0)]),
            ..TaskSchedule::default()
        };
        Arc::new(TaskScheduler::new(service, source, schedule))
    }

    #[tokio::test]
    async fn test_refresh_publishes_fresh_table() {
        let s = scheduler(Arc::new(StaticPrices(fresh_table())));
        assert!(!s.refresh_prices().await.unwrap());
        let table = s.service.prices().snapshot().await;
        assert_eq!(table.country("TR").unwrap().base_price, 75.0);
        assert!(!table.updated_with_fallback);
    }

    #[tokio::test]
    async fn test_refresh_applies_fallback_to_stale_table() {
        let s = scheduler(Arc::new(StaticPrices(STALE_TABLE.to_string())));
        assert!(s.refresh_prices().await.unwrap());
        let table = s.service.prices().snapshot().await;
        assert_eq!(table.country("TR").unwrap().base_price, 85.0);
        assert!(table.updated_with_fallback);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_table() {
        let s = scheduler(Arc::new(BrokenPrices));
        s.run_price_refresh().await;

        let status = s.price_status().await;
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 1);
        assert!(status.last_error.unwrap().contains("source offline"));
        assert_eq!(
            s.service.prices().snapshot().await.country("TR").unwrap().base_price,
            75.0
        );
    }

    #[tokio::test]
    async fn test_forecast_update_status() {
        let s = scheduler(Arc::new(StaticPrices(fresh_table())));
        s.run_forecast_update().await;
        let status = s.forecast_status().await;
        assert_eq!(status.run_count, 1);
        assert_eq!(status.success_count, 1);
        assert!(status.last_error.is_none());
        assert!(status.last_failed_sites.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_is_not_an_error() {
        let s = scheduler_for(
            Arc::new(StaticPrices(fresh_table())),
            vec![site(1, "wind", "TR"), site(2, "tidal", "TR")],
        );
        s.run_forecast_update().await;
        let status = s.forecast_status().await;
        assert_eq!(status.success_count, 1);
        assert_eq!(status.error_count, 0);
        assert!(status.last_error.is_none());
        assert_eq!(status.last_failed_sites, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_forecast_waits_for_price_refresh() {
        let s = scheduler(Arc::new(SlowPrices(STALE_TABLE.to_string())));
        s.start().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(s.forecast_status().await.run_count, 1);
        assert_eq!(s.price_status().await.run_count, 1);

        let start = first_hour();
        let stored = s
            .service
            .repos()
            .forecasts
            .range(1, start, start + chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(stored.len(), 24);
        // fallback base 85 with at most 5% noise, the stale table had 75
        assert!(stored.iter().all(|p| p.price_per_mwh > 80.0));
        s.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_immediately_and_stop_joins() {
        let s = scheduler(Arc::new(StaticPrices(fresh_table())));
        s.start().await;
        s.start().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(s.forecast_status().await.run_count, 1);
        assert_eq!(s.price_status().await.run_count, 1);

        s.stop().await;
        assert!(s.is_stopped());
        assert!(s.handles.lock().await.is_empty());

        // no further runs after stop, even when the interval elapses
        tokio::time::sleep(Duration::from_secs(7 * 3600)).await;
        assert_eq!(s.forecast_status().await.run_count, 1);
    }
}
