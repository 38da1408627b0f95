//! Configuration loading and validation.
//!
//! Two layers:
//! - [`Settings`]: required deployment values from the environment
//!   (optionally seeded from a `.env` file).
//! - [`RelayConfig`]: optional TOML tunables. Every section uses
//!   `#[serde(default)]` so a minimal or empty file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::ingest::Severity;

/// Environment variable holding the project/account identifier.
pub const PROJECT_ID_VAR: &str = "GCP_PROJECT_ID";
/// Environment variable holding the notification webhook URL.
pub const WEBHOOK_URL_VAR: &str = "DISCORD_WEBHOOK_URL";
/// Environment variable holding the monitored network name.
pub const NETWORK_VAR: &str = "PENUMBRA_NETWORK";
/// Environment variable holding inline credential material.
pub const CREDENTIALS_VAR: &str = "GCP_CREDENTIALS";
/// Environment variable holding a path to credential material.
pub const CREDENTIALS_FILE_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Errors in the required environment settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{0} is unset or empty")]
    MissingVar(&'static str),

    /// The webhook URL does not parse or is not http(s).
    #[error("{var} is not a valid http(s) URL: {reason}")]
    InvalidUrl {
        /// Variable that held the URL.
        var: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The credentials file could not be read.
    #[error("failed to read credentials file {path}: {source}")]
    CredentialsFile {
        /// Path named by the variable.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Credential material for the log transport.
#[derive(Clone)]
pub struct Credentials(String);

impl Credentials {
    /// Wrap raw credential material.
    pub fn new(material: impl Into<String>) -> Self {
        Self(material.into())
    }

    /// Expose the raw material.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials([REDACTED])")
    }
}

/// Required deployment settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Project/account the logs live in.
    pub project_id: String,
    /// Where notifications are posted.
    pub webhook_url: Url,
    /// Monitored network name.
    pub network: String,
    /// Transport credentials.
    pub credentials: Credentials,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup function.
    ///
    /// Variables are checked in a fixed order so the reported error is
    /// deterministic: `GCP_PROJECT_ID`, `DISCORD_WEBHOOK_URL`,
    /// `PENUMBRA_NETWORK`, then credentials. Only one credential source is
    /// required. Inline `GCP_CREDENTIALS` wins; when it is unset or empty,
    /// `GOOGLE_APPLICATION_CREDENTIALS` is read as a path to the material.
    /// Neither being set reports `GCP_CREDENTIALS` as missing.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar(key))
        };

        let project_id = require(PROJECT_ID_VAR)?;
        let webhook_url = parse_webhook(&require(WEBHOOK_URL_VAR)?)?;
        let network = require(NETWORK_VAR)?;

        let credentials = match require(CREDENTIALS_VAR) {
            Ok(inline) => Credentials::new(inline),
            Err(_) => {
                let path = require(CREDENTIALS_FILE_VAR)
                    .map(PathBuf::from)
                    .map_err(|_| ConfigError::MissingVar(CREDENTIALS_VAR))?;
                let material = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::CredentialsFile { path, source })?;
                Credentials::new(material.trim())
            }
        };

        Ok(Self {
            project_id,
            webhook_url,
            network,
            credentials,
        })
    }
}

fn parse_webhook(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        var: WEBHOOK_URL_VAR,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            var: WEBHOOK_URL_VAR,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}

/// Top-level tunables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Reconciliation engine behavior.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Subscription filter parameters.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Notification delivery.
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Liveness endpoint.
    #[serde(default)]
    pub health: HealthConfig,

    /// Where log records come from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reconciliation engine behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Post a progress notice at every height divisible by this.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Keep only the most recent K heights. Unset keeps every height.
    #[serde(default)]
    pub retain_heights: Option<u64>,

    /// Collapse repeat reports from the same source at the same height.
    #[serde(default)]
    pub dedupe_sources: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
            retain_heights: None,
            dedupe_sources: false,
        }
    }
}

/// Subscription filter parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Cluster the fleet runs in.
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// Container emitting consensus commit lines.
    #[serde(default = "default_commit_container")]
    pub commit_container: String,

    /// Container whose errors are relayed.
    #[serde(default = "default_error_container")]
    pub error_container: String,

    /// Pod name prefix; the network name is appended.
    #[serde(default = "default_pod_prefix")]
    pub pod_prefix: String,

    /// Resource label identifying the reporting node.
    #[serde(default = "default_source_label")]
    pub source_label: String,

    /// Minimum severity for the error pipeline.
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            cluster: default_cluster(),
            commit_container: default_commit_container(),
            error_container: default_error_container(),
            pod_prefix: default_pod_prefix(),
            source_label: default_source_label(),
            min_severity: default_min_severity(),
        }
    }
}

/// Notification delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Upper bound on a single webhook call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Operator mention prepended to divergence alerts.
    #[serde(default = "default_alert_mention")]
    pub alert_mention: String,

    /// Longer messages are split into several posts of at most this many
    /// bytes.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

impl NotifierConfig {
    /// Webhook call deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            alert_mention: default_alert_mention(),
            max_message_len: default_max_message_len(),
        }
    }
}

/// Liveness endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// TCP port; `0` disables the endpoint.
    #[serde(default = "default_health_port")]
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            port: default_health_port(),
        }
    }
}

/// Which transport feeds the pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Remote streaming tail endpoint.
    Http,
    /// Local JSONL export.
    File,
}

/// Log source settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Transport kind.
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,

    /// Tail endpoint for [`SourceKind::Http`].
    #[serde(default)]
    pub endpoint: Option<Url>,

    /// File or directory for [`SourceKind::File`].
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Poll period for file tails, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of each producer-to-consumer channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl SourceConfig {
    /// File tail poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            endpoint: None,
            path: None,
            poll_interval_ms: default_poll_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling JSON logs. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: default_log_level(),
        }
    }
}

impl RelayConfig {
    /// Validate that configuration values are within sane bounds.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.reconcile.progress_interval >= 1,
            "reconcile.progress_interval must be >= 1"
        );
        anyhow::ensure!(
            self.reconcile.retain_heights.is_none_or(|k| k >= 1),
            "reconcile.retain_heights must be >= 1 when set"
        );
        anyhow::ensure!(
            (1..=120).contains(&self.notifier.timeout_secs),
            "notifier.timeout_secs must be in [1, 120]"
        );
        anyhow::ensure!(
            self.notifier.max_message_len >= 64,
            "notifier.max_message_len must be >= 64"
        );
        anyhow::ensure!(
            self.source.channel_capacity >= 1,
            "source.channel_capacity must be >= 1"
        );
        anyhow::ensure!(
            self.source.poll_interval_ms >= 10,
            "source.poll_interval_ms must be >= 10"
        );
        anyhow::ensure!(
            !self.filter.source_label.trim().is_empty(),
            "filter.source_label must not be empty"
        );
        match self.source.kind {
            SourceKind::Http => anyhow::ensure!(
                self.source.endpoint.is_some(),
                "source.endpoint is required when source.kind = \"http\""
            ),
            SourceKind::File => anyhow::ensure!(
                self.source.path.is_some(),
                "source.path is required when source.kind = \"file\""
            ),
        }
        Ok(())
    }

    /// Parse tunables from TOML text without validating them.
    ///
    /// Callers that override the source (such as replays) call
    /// [`RelayConfig::validate`] after the override.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("failed to parse relay config")
    }
}

/// Load tunables from a TOML file, or defaults when `path` is `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_relay_config(path: Option<&Path>) -> anyhow::Result<RelayConfig> {
    let Some(path) = path else {
        return Ok(RelayConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read relay config at {}", path.display()))?;
    RelayConfig::from_toml(&contents)
        .with_context(|| format!("failed to parse relay config at {}", path.display()))
}

// Default value functions for serde.

fn default_progress_interval() -> u64 {
    1000
}

fn default_cluster() -> String {
    "testnet".to_owned()
}

fn default_commit_container() -> String {
    "tm".to_owned()
}

fn default_error_container() -> String {
    "pd".to_owned()
}

fn default_pod_prefix() -> String {
    "penumbra-".to_owned()
}

fn default_source_label() -> String {
    "pod_name".to_owned()
}

fn default_min_severity() -> Severity {
    Severity::Error
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_alert_mention() -> String {
    "@here".to_owned()
}

fn default_max_message_len() -> usize {
    2000
}

fn default_health_port() -> u16 {
    8080
}

fn default_source_kind() -> SourceKind {
    SourceKind::Http
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_owned()
}
