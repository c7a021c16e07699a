//! Push transport abstraction.
//!
//! Alerts go out on per-zone topics and clients subscribe device tokens to
//! those topics. Topic membership lives entirely in the transport; the
//! server keeps no subscription state of its own.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Push transport is disabled")]
    Disabled,

    #[error("Delivery to topic '{topic}' failed: {reason}")]
    Delivery { topic: String, reason: String },

    #[error("Token registration on topic '{topic}' failed: {reason}")]
    Registration { topic: String, reason: String },
}

/// A single topic-addressed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushAlert {
    pub topic: String,
    pub title: String,
    pub body: String,
    /// String-valued fields delivered alongside the notification for
    /// client-side rendering.
    pub data: BTreeMap<String, String>,
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Cheap check made before any delivery is attempted.
    fn is_enabled(&self) -> bool;

    /// Publish an alert to its topic, returning the provider's message id.
    async fn send_to_topic(&self, alert: &PushAlert) -> Result<String, TransportError>;

    /// Add a device token to a topic.
    async fn subscribe_token(&self, token: &str, topic: &str) -> Result<(), TransportError>;
}

/// Used when no push provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTransport;

#[async_trait]
impl PushTransport for DisabledTransport {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn send_to_topic(&self, _alert: &PushAlert) -> Result<String, TransportError> {
        Err(TransportError::Disabled)
    }

    async fn subscribe_token(&self, _token: &str, _topic: &str) -> Result<(), TransportError> {
        Err(TransportError::Disabled)
    }
}

/// Writes every alert and registration to the log instead of a provider.
/// Handy for local development and for instances that only serve queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl PushTransport for LogTransport {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn send_to_topic(&self, alert: &PushAlert) -> Result<String, TransportError> {
        let message_id = Uuid::new_v4().to_string();
        info!(
            topic = %alert.topic,
            title = %alert.title,
            body = %alert.body,
            data = ?alert.data,
            message_id = %message_id,
            "Push alert"
        );
        Ok(message_id)
    }

    async fn subscribe_token(&self, _token: &str, topic: &str) -> Result<(), TransportError> {
        info!(topic = %topic, "Push token subscribed");
        Ok(())
    }
}
