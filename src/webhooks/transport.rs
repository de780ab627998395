use async_trait::async_trait;
use std::time::Duration;

use super::signer::SIGNATURE_HEADER;
use crate::error::{AppError, Result};

/// A fully built, signed webhook ready to POST.
#[derive(Debug, Clone)]
pub struct OutgoingWebhook {
    pub url: String,
    pub event_id: String,
    pub event_type: String,
    pub body: String,
    pub signature: String,
}

/// Outbound HTTP seam. Returns the response status; transport-level failures
/// (timeouts, refused connections) are `DeliveryFailed`.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, webhook: &OutgoingWebhook) -> Result<u16>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chargeflow-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("webhook client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn send(&self, webhook: &OutgoingWebhook) -> Result<u16> {
        let response = self
            .client
            .post(&webhook.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, &webhook.signature)
            .header("X-Chargeflow-Event", &webhook.event_type)
            .header("X-Chargeflow-Event-Id", &webhook.event_id)
            .body(webhook.body.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::DeliveryFailed(format!("timed out: {}", e))
                } else {
                    AppError::DeliveryFailed(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}
