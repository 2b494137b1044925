//! HTTP Notification Adapter
//!
//! Forwards order status changes to a downstream notification endpoint as
//! `{"orderId": .., "message": ..}`. Other events are ignored.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use crate::error::{Error, Result};

/// Default request timeout
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationPayload<'a> {
    order_id: i64,
    message: &'a str,
}

/// Posts order notifications over HTTP
#[derive(Debug, Clone)]
pub struct HttpNotificationPublisher {
    client: Client,
    endpoint: String,
}

impl HttpNotificationPublisher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(Error::Config("notification URL must not be empty".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self, message), fields(endpoint = %self.endpoint))]
    async fn post(&self, order_id: i64, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&NotificationPayload { order_id, message })
            .send()
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "endpoint answered {}",
                response.status()
            )));
        }
        debug!(order_id, "Notification delivered");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for HttpNotificationPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        match &event {
            DomainEvent::OrderStatusChanged {
                order_id, message, ..
            } => self.post(*order_id, message).await,
            _ => Ok(()),
        }
    }
}
