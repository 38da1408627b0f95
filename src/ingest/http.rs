//! Streaming HTTP tail subscription.
//!
//! POSTs a tail request to a log streaming endpoint and reads back a
//! newline-delimited JSON stream of `{"entries": [LogEntry, ...]}` frames.
//! Reconnection is left to whoever restarts the process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

use super::{LogEntry, LogSource, RawRecord, SourceError, SubscriptionFilter};
use crate::notifier::messages::truncate;

/// Maximum number of body bytes kept in a [`SourceError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Largest frame accepted from the stream.
const MAX_FRAME_LEN: usize = 16_777_216;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TailRequest<'a> {
    resource_names: Vec<String>,
    filter: &'a str,
}

#[derive(Deserialize)]
struct TailFrame {
    #[serde(default)]
    entries: Vec<LogEntry>,
}

/// Subscribes to a remote log tail endpoint.
pub struct HttpTailSource {
    name: String,
    client: reqwest::Client,
    endpoint: Url,
    project_id: String,
    credentials: String,
}

impl HttpTailSource {
    /// Create a source for `project_id`, authenticating with `credentials`
    /// as a bearer token.
    pub fn new(name: &str, endpoint: Url, project_id: &str, credentials: &str) -> Self {
        Self {
            name: name.to_owned(),
            client: reqwest::Client::new(),
            endpoint,
            project_id: project_id.to_owned(),
            credentials: credentials.to_owned(),
        }
    }
}

#[async_trait]
impl LogSource for HttpTailSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &mut self,
        filter: &SubscriptionFilter,
        out: mpsc::Sender<RawRecord>,
    ) -> Result<(), SourceError> {
        let query = filter.to_query();
        let request = TailRequest {
            resource_names: vec![format!("projects/{}", self.project_id)],
            filter: &query,
        };

        let mut response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.credentials)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY).to_owned(),
            });
        }

        info!(source = %self.name, filter = %query, "established log stream");

        let mut frames = FrameBuffer::new(MAX_FRAME_LEN);
        while let Some(chunk) = response.chunk().await? {
            for frame in frames.push(&chunk)? {
                let frame: TailFrame = serde_json::from_slice(&frame)?;
                for entry in frame.entries {
                    if out.send(RawRecord::from(entry)).await.is_err() {
                        debug!(source = %self.name, "consumer gone, closing stream");
                        return Ok(());
                    }
                }
            }
        }

        info!(source = %self.name, "log stream EOF");
        Ok(())
    }
}

/// Splits a byte stream into newline-terminated frames.
struct FrameBuffer {
    pending: Vec<u8>,
    scanned: usize,
    limit: usize,
}

impl FrameBuffer {
    fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            limit,
        }
    }

    /// Append `bytes` and return every complete, non-blank frame.
    ///
    /// Bytes already searched for a newline are not searched again.
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, SourceError> {
        self.pending.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(found) = self
            .pending
            .get(self.scanned..)
            .and_then(|tail| tail.iter().position(|b| *b == b'\n'))
        {
            let end = self.scanned.saturating_add(found);
            let mut frame: Vec<u8> = self.pending.drain(..=end).collect();
            frame.pop();
            self.scanned = 0;
            if frame.iter().any(|b| !b.is_ascii_whitespace()) {
                frames.push(frame);
            }
        }
        self.scanned = self.pending.len();
        if self.pending.len() > self.limit {
            return Err(SourceError::FrameTooLarge { limit: self.limit });
        }
        Ok(frames)
    }
}
