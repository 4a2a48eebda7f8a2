use std::sync::Arc;

use crate::config::Config;
use crate::domain::Site;
use crate::error::PipelineResult;

pub mod forecasts;
pub mod sites;

pub use forecasts::*;
pub use sites::*;

#[derive(Clone)]
pub struct Repositories {
    pub sites: Arc<dyn SiteRepository>,
    pub forecasts: Arc<dyn ForecastRepository>,
}

impl Repositories {
    /// In-memory stores seeded with the sites and batteries from configuration.
    pub fn from_config(cfg: &Config) -> PipelineResult<Self> {
        for site in &cfg.sites {
            site.check()?;
        }
        for rec in &cfg.batteries {
            rec.config.check()?;
        }
        let sites: Vec<Site> = cfg.sites.clone();
        let batteries = cfg.batteries.iter().map(|b| (b.site_id, b.config));
        Ok(Self {
            sites: Arc::new(InMemorySiteRepository::new(sites, batteries)),
            forecasts: Arc::new(InMemoryForecastRepository::new()),
        })
    }
}
