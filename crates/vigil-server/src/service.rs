//! Report submission, queries and subscriptions, independent of HTTP.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use vigil_shared::constants::{MAX_LATITUDE, MAX_LONGITUDE};
use vigil_shared::{anonymize, neighborhood, Category, Report, ReportView};

use crate::clock::Clock;
use crate::dispatcher::{BroadcastOutcome, NotificationDispatcher};
use crate::error::ServerError;
use crate::sanitize::Sanitizer;
use crate::store::{ReportStore, StoreStats};
use crate::subscriptions::{SubscriptionManager, SubscriptionResult};
use crate::transport::PushTransport;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReport {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub content: Option<String>,
    pub language: Option<String>,
    pub has_photo: Option<bool>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub report_id: Uuid,
    pub zone: String,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub affected_zones: Vec<String>,
    pub push_outcome: BroadcastOutcome,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub platform: Option<String>,
    pub token: Option<String>,
}

pub struct AlertService {
    store: ReportStore,
    dispatcher: NotificationDispatcher,
    subscriptions: SubscriptionManager,
    sanitizer: Arc<dyn Sanitizer>,
}

impl AlertService {
    pub fn new(
        clock: Arc<dyn Clock>,
        transport: Arc<dyn PushTransport>,
        sanitizer: Arc<dyn Sanitizer>,
    ) -> Self {
        Self {
            store: ReportStore::new(clock),
            dispatcher: NotificationDispatcher::new(transport.clone()),
            subscriptions: SubscriptionManager::new(transport),
            sanitizer,
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn push_enabled(&self) -> bool {
        self.dispatcher.is_enabled()
    }

    /// Anonymize, store and broadcast a report. Notification failures are
    /// reported in the receipt and never fail the submission.
    #[instrument(skip_all)]
    pub async fn submit_report(&self, req: SubmitReport) -> Result<SubmitReceipt, ServerError> {
        // Emptiness is judged on what would actually be stored.
        let content = req
            .content
            .as_deref()
            .map(|raw| self.sanitizer.sanitize(raw))
            .unwrap_or_default();

        let mut missing = Vec::new();
        if req.lat.is_none() {
            missing.push("lat");
        }
        if req.lng.is_none() {
            missing.push("lng");
        }
        if content.is_empty() {
            missing.push("content");
        }
        let (Some(lat), Some(lng), false) = (req.lat, req.lng, content.is_empty()) else {
            return Err(ServerError::MissingFields(missing));
        };
        check_location(lat, lng)?;

        let zone = anonymize(lat, lng).zone;
        let category = Category::normalize(req.category.as_deref());
        let report = Report::new(
            zone,
            content,
            req.language,
            req.has_photo.unwrap_or(false),
            category,
            self.store.now(),
        );

        self.store.put(report.clone()).await?;

        let affected_zones = neighborhood(&report.zone);
        let push_outcome = self.dispatcher.broadcast(&report, &affected_zones).await;

        info!(
            id = %report.id,
            zone = %report.zone,
            category = %category,
            push_enabled = !push_outcome.is_disabled(),
            "Report submitted"
        );

        Ok(SubmitReceipt {
            report_id: report.id,
            zone: report.zone,
            category,
            timestamp: report.created_at,
            expires: report.expires_at,
            affected_zones,
            push_outcome,
        })
    }

    pub async fn query_zone(&self, zone: &str, category: Option<&str>) -> Vec<ReportView> {
        self.store
            .get_by_zone(zone, category)
            .await
            .iter()
            .map(Report::view)
            .collect()
    }

    pub async fn query_category(&self, category: &str) -> Result<Vec<ReportView>, ServerError> {
        let category: Category = category.parse()?;
        Ok(self
            .store
            .get_by_category(category)
            .await
            .iter()
            .map(Report::view)
            .collect())
    }

    pub async fn subscribe(&self, req: SubscribeRequest) -> Result<SubscriptionResult, ServerError> {
        let (Some(lat), Some(lng)) = (req.lat, req.lng) else {
            return Err(ServerError::MissingLocation);
        };
        check_location(lat, lng)?;
        Ok(self
            .subscriptions
            .subscribe(lat, lng, req.token.as_deref(), req.platform.as_deref())
            .await)
    }

    pub async fn stats(&self) -> StoreStats {
        self.store.stats().await
    }
}

/// Coordinates must be finite degrees on the globe.
fn check_location(lat: f64, lng: f64) -> Result<(), ServerError> {
    let on_globe = lat.is_finite()
        && lng.is_finite()
        && lat.abs() <= MAX_LATITUDE
        && lng.abs() <= MAX_LONGITUDE;
    if on_globe {
        Ok(())
    } else {
        Err(ServerError::InvalidLocation)
    }
}
