use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::TimeSeriesPoint;
use crate::error::PipelineResult;

/// Historical and upcoming forecast records per site
#[async_trait]
pub trait ForecastRepository: Send + Sync {
    /// Store a freshly computed series, replacing stored points from its first timestamp on.
    async fn replace_from(&self, site_id: i64, points: Vec<TimeSeriesPoint>) -> PipelineResult<()>;

    /// Drop every record older than `cutoff`, returning how many were removed.
    async fn delete_before(&self, cutoff: DateTime<FixedOffset>) -> PipelineResult<usize>;

    /// Records in `[from, to)`, ordered by timestamp.
    async fn range(
        &self,
        site_id: i64,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> PipelineResult<Vec<TimeSeriesPoint>>;
}

#[derive(Default)]
pub struct InMemoryForecastRepository {
    records: RwLock<HashMap<i64, Vec<TimeSeriesPoint>>>,
}

impl InMemoryForecastRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, site_id: i64) -> usize {
        self.records
            .read()
            .await
            .get(&site_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ForecastRepository for InMemoryForecastRepository {
    async fn replace_from(&self, site_id: i64, points: Vec<TimeSeriesPoint>) -> PipelineResult<()> {
        let Some(first) = points.first().map(|p| p.timestamp) else {
            return Ok(());
        };
        let mut records = self.records.write().await;
        let stored = records.entry(site_id).or_default();
        stored.retain(|p| p.timestamp < first);
        stored.extend(points);
        stored.sort_by_key(|p| p.timestamp);
        Ok(())
    }

    async fn delete_before(&self, cutoff: DateTime<FixedOffset>) -> PipelineResult<usize> {
        let mut records = self.records.write().await;
        let mut removed = 0;
        for stored in records.values_mut() {
            let before = stored.len();
            stored.retain(|p| p.timestamp >= cutoff);
            removed += before - stored.len();
        }
        records.retain(|_, stored| !stored.is_empty());
        Ok(removed)
    }

    async fn range(
        &self,
        site_id: i64,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> PipelineResult<Vec<TimeSeriesPoint>> {
        Ok(self
            .records
            .read()
            .await
            .get(&site_id)
            .map(|stored| {
                stored
                    .iter()
                    .filter(|p| p.timestamp >= from && p.timestamp < to)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}
