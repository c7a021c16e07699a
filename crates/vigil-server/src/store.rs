//! In-memory, TTL-bounded report store.
//!
//! Reports are keyed by id. Zone and category lookups scan the map, which
//! is fine at the volumes a single instance sees. Every read filters out
//! expired reports, so results never depend on when the sweep last ran;
//! [`ReportStore::evict_expired`] only reclaims memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use vigil_shared::constants::{CATEGORY_QUERY_LIMIT, ZONE_QUERY_LIMIT};
use vigil_shared::{Category, Report};

use crate::clock::Clock;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Report id collision: {0}")]
    DuplicateId(Uuid),
}

/// Counters over the currently visible reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub by_zone: BTreeMap<String, usize>,
}

#[derive(Clone)]
pub struct ReportStore {
    reports: Arc<RwLock<HashMap<Uuid, Report>>>,
    clock: Arc<dyn Clock>,
}

impl ReportStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            reports: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn put(&self, report: Report) -> Result<(), StoreError> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&report.id) {
            return Err(StoreError::DuplicateId(report.id));
        }
        debug!(id = %report.id, zone = %report.zone, category = %report.category, "Stored report");
        reports.insert(report.id, report);
        Ok(())
    }

    /// Newest visible reports in `zone`. A filter that is not a known
    /// category is ignored rather than rejected.
    pub async fn get_by_zone(&self, zone: &str, category_filter: Option<&str>) -> Vec<Report> {
        let category = category_filter.and_then(|c| Category::parse(c).ok());
        self.collect_newest(ZONE_QUERY_LIMIT, |r| {
            r.zone == zone && category.map_or(true, |c| r.category == c)
        })
        .await
    }

    /// Newest visible reports of `category` across every zone.
    pub async fn get_by_category(&self, category: Category) -> Vec<Report> {
        self.collect_newest(CATEGORY_QUERY_LIMIT, |r| r.category == category)
            .await
    }

    pub async fn stats(&self) -> StoreStats {
        let now = self.now();
        let reports = self.reports.read().await;

        let mut by_category: BTreeMap<Category, usize> =
            Category::ALL.iter().map(|c| (*c, 0)).collect();
        let mut by_zone = BTreeMap::new();
        let mut total = 0;

        for report in reports.values().filter(|r| !r.is_expired(now)) {
            total += 1;
            *by_category.entry(report.category).or_default() += 1;
            *by_zone.entry(report.zone.clone()).or_default() += 1;
        }

        StoreStats {
            total,
            by_category,
            by_zone,
        }
    }

    /// Drop every expired report. Returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        let now = self.now();
        let mut reports = self.reports.write().await;
        let before = reports.len();
        reports.retain(|_, r| !r.is_expired(now));
        let removed = before - reports.len();
        if removed > 0 {
            debug!(removed, remaining = reports.len(), "Evicted expired reports");
        }
        removed
    }

    /// Run [`ReportStore::evict_expired`] every `interval`, starting
    /// immediately, until the returned task is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = store.evict_expired().await;
                let remaining = store.len().await;
                info!(removed, remaining, "Expired report sweep finished");
            }
        })
    }

    /// Physical entry count, expired reports included.
    pub async fn len(&self) -> usize {
        self.reports.read().await.len()
    }

    async fn collect_newest<F>(&self, limit: usize, predicate: F) -> Vec<Report>
    where
        F: Fn(&Report) -> bool,
    {
        let now = self.now();
        let mut matched: Vec<Report> = {
            let reports = self.reports.read().await;
            reports
                .values()
                .filter(|r| !r.is_expired(now) && predicate(r))
                .cloned()
                .collect()
        };
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit);
        matched
    }
}
