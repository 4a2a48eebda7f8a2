use anyhow::Result;
use greenfleet::{config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;
    init_tracing(&cfg.logging);

    if cfg.sites.is_empty() {
        warn!("no sites configured, forecast updates will be empty");
    }
    if cfg.prices.noise_seed.is_some() {
        warn!("price noise seed set, forecasts are reproducible across runs");
    }

    let app_state = controller::AppState::new(cfg.clone()).await?;

    info!(
        sites = cfg.sites.len(),
        update_every_hours = cfg.scheduler.update_every_hours,
        "starting GreenFleet forecaster"
    );

    app_state.scheduler.start().await;

    telemetry::shutdown_signal().await;
    app_state.scheduler.stop().await;

    warn!("shutdown complete");
    Ok(())
}
