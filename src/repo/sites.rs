use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::domain::{BatteryConfig, Site};
use crate::error::{PipelineError, PipelineResult};

/// Read access to site and battery records
#[async_trait]
pub trait SiteRepository: Send + Sync {
    async fn list(&self) -> PipelineResult<Vec<Site>>;
    async fn get(&self, id: i64) -> PipelineResult<Site>;
    async fn battery(&self, site_id: i64) -> PipelineResult<Option<BatteryConfig>>;
}

/// Site registry held in process memory, seeded from configuration
#[derive(Default)]
pub struct InMemorySiteRepository {
    sites: RwLock<BTreeMap<i64, Site>>,
    batteries: RwLock<HashMap<i64, BatteryConfig>>,
}

impl InMemorySiteRepository {
    pub fn new(
        sites: impl IntoIterator<Item = Site>,
        batteries: impl IntoIterator<Item = (i64, BatteryConfig)>,
    ) -> Self {
        Self {
            sites: RwLock::new(sites.into_iter().map(|s| (s.id, s)).collect()),
            batteries: RwLock::new(batteries.into_iter().collect()),
        }
    }

    pub async fn upsert_site(&self, site: Site) {
        self.sites.write().await.insert(site.id, site);
    }

    /// Remove a site together with its battery record.
    pub async fn remove_site(&self, id: i64) -> Option<Site> {
        self.batteries.write().await.remove(&id);
        self.sites.write().await.remove(&id)
    }

    pub async fn set_battery(&self, site_id: i64, config: BatteryConfig) -> PipelineResult<()> {
        if !self.sites.read().await.contains_key(&site_id) {
            return Err(PipelineError::SiteNotFound(site_id));
        }
        config.check()?;
        self.batteries.write().await.insert(site_id, config);
        Ok(())
    }
}

#[async_trait]
impl SiteRepository for InMemorySiteRepository {
    async fn list(&self) -> PipelineResult<Vec<Site>> {
        Ok(self.sites.read().await.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> PipelineResult<Site> {
        self.sites
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(PipelineError::SiteNotFound(id))
    }

    async fn battery(&self, site_id: i64) -> PipelineResult<Option<BatteryConfig>> {
        Ok(self.batteries.read().await.get(&site_id).copied())
    }
}
