//! Fan-out of new reports to per-zone push topics.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use vigil_shared::constants::{ELLIPSIS, MAX_ALERT_BODY_LEN};
use vigil_shared::{zone_topic, Report};

use crate::transport::{PushAlert, PushTransport};

pub const PUSH_DISABLED_MESSAGE: &str = "push notifications disabled";

/// Result of one delivery (or registration) on one zone's topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneOutcome {
    pub zone: String,
    pub topic: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ZoneOutcome {
    pub fn ok(zone: String, topic: String, message_id: Option<String>) -> Self {
        Self {
            zone,
            topic,
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(zone: String, topic: String, error: String) -> Self {
        Self {
            zone,
            topic,
            success: false,
            message_id: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum BroadcastOutcome {
    /// No transport configured; nothing was attempted.
    #[serde(rename_all = "camelCase")]
    Disabled { message: String },
    /// Every zone was attempted. Individual failures are in `results`.
    #[serde(rename_all = "camelCase")]
    Completed {
        sent: usize,
        failed: usize,
        results: Vec<ZoneOutcome>,
    },
}

impl BroadcastOutcome {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn PushTransport>,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_enabled()
    }

    /// Send one alert per zone. A failing zone never stops the others.
    pub async fn broadcast(&self, report: &Report, zones: &[String]) -> BroadcastOutcome {
        if !self.transport.is_enabled() {
            debug!(report = %report.id, "Push transport disabled, skipping broadcast");
            return BroadcastOutcome::Disabled {
                message: PUSH_DISABLED_MESSAGE.to_string(),
            };
        }

        let deliveries = zones.iter().map(|zone| async move {
            let alert = build_alert(report, zone);
            match self.transport.send_to_topic(&alert).await {
                Ok(message_id) => ZoneOutcome::ok(zone.clone(), alert.topic, Some(message_id)),
                Err(e) => {
                    warn!(report = %report.id, topic = %alert.topic, error = %e, "Zone alert failed");
                    ZoneOutcome::failed(zone.clone(), alert.topic, e.to_string())
                }
            }
        });
        let results = join_all(deliveries).await;

        let sent = results.iter().filter(|o| o.success).count();
        let failed = results.len() - sent;
        info!(report = %report.id, sent, failed, "Broadcast complete");

        BroadcastOutcome::Completed {
            sent,
            failed,
            results,
        }
    }
}

/// Build the alert for `zone`. The data block is consumed by client apps;
/// keep its key set stable.
pub fn build_alert(report: &Report, zone: &str) -> PushAlert {
    let category = report.category;

    let mut data = BTreeMap::new();
    data.insert("reportId".to_string(), report.id.to_string());
    data.insert("zone".to_string(), zone.to_string());
    data.insert("category".to_string(), category.to_string());
    data.insert("timestamp".to_string(), report.created_at.to_rfc3339());
    data.insert("expires".to_string(), report.expires_at.to_rfc3339());
    data.insert("hasPhoto".to_string(), report.has_photo.to_string());
    data.insert("language".to_string(), report.language.clone());

    PushAlert {
        topic: zone_topic(zone),
        title: format!("{} {}", category.icon(), category.title()),
        body: alert_body(&report.content),
        data,
    }
}

fn alert_body(content: &str) -> String {
    if content.chars().count() <= MAX_ALERT_BODY_LEN {
        return content.to_string();
    }
    let mut body: String = content.chars().take(MAX_ALERT_BODY_LEN).collect();
    body.push_str(ELLIPSIS);
    body
}
