use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use vigil_shared::{anonymize, neighborhood, zone_topic};

use crate::dispatcher::{ZoneOutcome, PUSH_DISABLED_MESSAGE};
use crate::transport::PushTransport;

pub const NO_TOKEN_MESSAGE: &str = "no device token supplied";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SubscriptionOutcome {
    /// Zones were resolved but nothing was registered with the transport.
    #[serde(rename_all = "camelCase")]
    LocalOnly { reason: String },
    #[serde(rename_all = "camelCase")]
    Registered {
        subscribed: usize,
        failed: usize,
        results: Vec<ZoneOutcome>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResult {
    pub zone: String,
    pub affected_zones: Vec<String>,
    pub outcome: SubscriptionOutcome,
}

#[derive(Clone)]
pub struct SubscriptionManager {
    transport: Arc<dyn PushTransport>,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport }
    }

    /// Resolve the caller's neighbourhood and register `token` on each
    /// zone topic. Without a token or a transport the zones are still
    /// returned.
    pub async fn subscribe(
        &self,
        lat: f64,
        lng: f64,
        token: Option<&str>,
        platform: Option<&str>,
    ) -> SubscriptionResult {
        let zone = anonymize(lat, lng).zone;
        let affected_zones = neighborhood(&zone);
        let platform = platform.unwrap_or("unknown");

        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let outcome = match token {
            _ if !self.transport.is_enabled() => SubscriptionOutcome::LocalOnly {
                reason: PUSH_DISABLED_MESSAGE.to_string(),
            },
            None => SubscriptionOutcome::LocalOnly {
                reason: NO_TOKEN_MESSAGE.to_string(),
            },
            Some(token) => self.register(token, &affected_zones).await,
        };

        debug!(zone = %zone, platform = %platform, outcome = ?outcome, "Subscription resolved");

        SubscriptionResult {
            zone,
            affected_zones,
            outcome,
        }
    }

    async fn register(&self, token: &str, zones: &[String]) -> SubscriptionOutcome {
        let registrations = zones.iter().map(|zone| async move {
            let topic = zone_topic(zone);
            match self.transport.subscribe_token(token, &topic).await {
                Ok(()) => ZoneOutcome::ok(zone.clone(), topic, None),
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Token registration failed");
                    ZoneOutcome::failed(zone.clone(), topic, e.to_string())
                }
            }
        });
        let results = join_all(registrations).await;

        let subscribed = results.iter().filter(|o| o.success).count();
        let failed = results.len() - subscribed;
        info!(subscribed, failed, "Device subscribed to zone topics");

        SubscriptionOutcome::Registered {
            subscribed,
            failed,
            results,
        }
    }
}
