//! Discord webhook delivery.
//!
//! Posts `{"content": ...}` to an incoming webhook. Messages longer than
//! the channel limit go out as several posts split on line boundaries, so a
//! long divergence dump arrives whole. Every call is bounded by the client
//! timeout; non-success responses and transport errors are logged and
//! dropped.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::messages::split_on_lines;
use super::Notifier;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Sends notifications to a Discord channel webhook.
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: Url,
    max_len: usize,
}

impl DiscordNotifier {
    /// Create a notifier posting to `webhook_url`, giving up on any single
    /// delivery after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(webhook_url: Url, timeout: Duration, max_len: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build webhook client: {e}"))?;
        Ok(Self {
            client,
            webhook_url,
            max_len,
        })
    }

    async fn post(&self, content: &str, index: usize, total: usize) {
        let payload = WebhookPayload { content };

        match self
            .client
            .post(self.webhook_url.clone())
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!(part = index, parts = total, "webhook notification delivered");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), part = index, parts = total, "webhook rejected notification");
            }
            Err(e) => {
                warn!(error = %e, timeout = e.is_timeout(), part = index, parts = total, "failed to deliver webhook notification");
            }
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, message: &str) {
        let parts = split_on_lines(message, self.max_len);
        let total = parts.len();
        for (index, content) in parts.into_iter().enumerate() {
            self.post(content, index, total).await;
        }
    }
}
