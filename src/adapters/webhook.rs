//! Webhook notifier.
//!
//! Posts the JSON run report to a configured HTTP endpoint. Delivery is
//! best-effort; the orchestrator logs failures and moves on.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::Notifier;
use crate::report::RunReport;

/// Delivery timeout; a stuck endpoint must not hold finalization open
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Webhook delivery channel
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a notifier for the given endpoint
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, report: &RunReport) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .context("Failed to deliver webhook report")?;

        if !response.status().is_success() {
            anyhow::bail!("webhook endpoint answered {}", response.status());
        }

        Ok(())
    }
}
