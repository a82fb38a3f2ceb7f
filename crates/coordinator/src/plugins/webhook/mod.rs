use std::{sync::Arc, time::Duration};

use anyhow::Error;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use shared::models::JobStatusEvent;

use crate::events::Subscription;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WebhookEvent {
    #[serde(rename = "job.status_changed")]
    JobStatusChanged {
        job_id: String,
        old_status: String,
        new_status: String,
        changed_at: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    #[serde(flatten)]
    pub event: WebhookEvent,
    pub timestamp: String,
}

impl WebhookPayload {
    pub fn new(event: WebhookEvent) -> Self {
        #[cfg(test)]
        let timestamp = "2024-01-01T00:00:00Z".to_string();
        #[cfg(not(test))]
        let timestamp = chrono::Utc::now().to_rfc3339();

        Self { event, timestamp }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub bearer_token: Option<String>,
}

/// Forwards job status changes to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookPlugin {
    webhook_url: String,
    client: Arc<reqwest::Client>,
}

impl WebhookPlugin {
    pub fn new(webhook_config: WebhookConfig) -> Result<Self, Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &webhook_config.bearer_token {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))?,
            );
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            webhook_url: webhook_config.url,
            client: Arc::new(client),
        })
    }

    async fn send_event(&self, event: WebhookEvent) -> Result<(), Error> {
        let payload = WebhookPayload::new(event);
        let webhook_url = self.webhook_url.clone();
        let client = self.client.clone();

        #[cfg(not(test))]
        {
            tokio::spawn(async move {
                if let Err(e) = client
                    .post(&webhook_url)
                    .json(&payload)
                    .timeout(Duration::from_secs(5))
                    .send()
                    .await
                {
                    error!("Failed to send webhook to {webhook_url}: {e}");
                } else {
                    debug!("Webhook to {webhook_url} triggered successfully");
                }
            });
            Ok(())
        }

        #[cfg(test)]
        {
            if let Err(e) = client
                .post(&webhook_url)
                .json(&payload)
                .timeout(Duration::from_secs(5))
                .send()
                .await
            {
                error!("Failed to send webhook to {webhook_url}: {e}");
                Err(e.into())
            } else {
                debug!("Webhook to {webhook_url} triggered successfully");
                Ok(())
            }
        }
    }

    pub async fn send_job_status_changed(&self, event: &JobStatusEvent) -> Result<(), Error> {
        let event = WebhookEvent::JobStatusChanged {
            job_id: event.job_id.clone(),
            old_status: event.old_status.to_string(),
            new_status: event.new_status.to_string(),
            changed_at: event.timestamp.to_rfc3339(),
        };

        self.send_event(event).await
    }

    /// Forwards every event of `subscription` until the bus goes away.
    pub async fn run(&self, mut subscription: Subscription) -> Result<(), Error> {
        info!("Forwarding job events to {}", self.webhook_url);
        while let Some(event) = subscription.next_event().await {
            if let Err(e) = self.send_job_status_changed(&event).await {
                error!("Failed to send webhook to {}: {e}", self.webhook_url);
            }
        }
        Ok(())
    }
}
