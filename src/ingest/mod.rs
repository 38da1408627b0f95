//! Log ingestion: raw record model and the sources that produce records.
//!
//! Every source implements [`LogSource`] and pushes [`RawRecord`]s into a
//! bounded channel. A full channel backpressures the source's read loop.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tokio::sync::mpsc;

pub mod filter;
pub mod http;
pub mod tail;

pub use filter::SubscriptionFilter;

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// No severity assigned.
    #[default]
    Default,
    /// Debug or trace information.
    Debug,
    /// Routine information.
    Info,
    /// Normal but significant events.
    Notice,
    /// Events that might cause problems.
    Warning,
    /// Events likely to cause problems.
    Error,
    /// Severe problems or brief outages.
    Critical,
    /// Someone must act immediately.
    Alert,
    /// One or more systems are unusable.
    Emergency,
}

impl Severity {
    /// Upper-case name as used in filter expressions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Alert => "ALERT",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEFAULT" | "" => Ok(Self::Default),
            "DEBUG" | "TRACE" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "NOTICE" => Ok(Self::Notice),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            "ALERT" => Ok(Self::Alert),
            "EMERGENCY" => Ok(Self::Emergency),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One log record as delivered by a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Resource labels (container, cluster, pod name, ...).
    pub labels: BTreeMap<String, String>,
    /// Free-text payload.
    pub payload: String,
    /// Record severity.
    pub severity: Severity,
}

impl RawRecord {
    /// Look up a resource label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Wire shape of a log entry (`resource.labels`, `textPayload`, `severity`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogEntry {
    #[serde(default)]
    resource: Resource,
    #[serde(default)]
    text_payload: String,
    #[serde(default)]
    severity: Severity,
}

#[derive(Debug, Default, Deserialize)]
struct Resource {
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

impl From<LogEntry> for RawRecord {
    fn from(entry: LogEntry) -> Self {
        Self {
            labels: entry.resource.labels,
            payload: entry.text_payload,
            severity: entry.severity,
        }
    }
}

/// Errors raised by a log source. All of them end the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Local file access failed.
    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP transport failed.
    #[error("log stream transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The tail endpoint refused the subscription.
    #[error("log stream returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The stream sent more than `limit` bytes without a frame delimiter.
    #[error("log stream frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured frame size limit.
        limit: usize,
    },

    /// A stream frame could not be decoded.
    #[error("malformed log stream frame: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A producer of raw log records for one subscription.
#[async_trait]
pub trait LogSource: Send {
    /// Short name for diagnostics.
    fn name(&self) -> &str;

    /// Stream records matching `filter` into `out` until the upstream ends.
    ///
    /// Returns `Ok(())` on clean end of stream, or when the receiving side
    /// hangs up.
    async fn run(
        &mut self,
        filter: &SubscriptionFilter,
        out: mpsc::Sender<RawRecord>,
    ) -> Result<(), SourceError>;
}
