use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Channel, DeliverySink};
use crate::config::WebhookConfig;
use crate::error::DeliveryError;

/// Posts channel events as JSON to `<base_url><suffix>`.
pub struct WebhookSink {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl WebhookSink {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build webhook HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn endpoint(&self, channel: Channel) -> String {
        format!("{}{}", self.base_url, channel.suffix())
    }

    async fn post_once(&self, url: &str, body: &serde_json::Value) -> Result<u16, DeliveryError> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    async fn post(&self, channel: Channel, body: &serde_json::Value) -> Result<u16, DeliveryError> {
        let url = self.endpoint(channel);
        debug!("Posting to {}", url);

        let mut attempt = 0;
        loop {
            match self.post_once(&url, body).await {
                Ok(status) => return Ok(status),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        channel = %channel,
                        attempt,
                        "Transient delivery failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
