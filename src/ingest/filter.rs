//! Subscription filters.
//!
//! A filter renders to the server-side query string sent to the log
//! service and can also be evaluated locally for sources that deliver
//! unfiltered records (file tails, replays).

use std::fmt;

use super::{RawRecord, Severity};
use crate::config::FilterConfig;

/// A conjunction of resource-label predicates and an optional severity floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter {
    equals: Vec<(String, String)>,
    has: Vec<(String, String)>,
    min_severity: Option<Severity>,
}

impl SubscriptionFilter {
    /// An empty filter that matches every record.
    pub fn new() -> Self {
        Self {
            equals: Vec::new(),
            has: Vec::new(),
            min_severity: None,
        }
    }

    /// Require `resource.labels.<label>` to equal `value`.
    #[must_use]
    pub fn label_eq(mut self, label: &str, value: &str) -> Self {
        self.equals.push((label.to_owned(), value.to_owned()));
        self
    }

    /// Require `resource.labels.<label>` to contain `needle` (the `:` operator).
    #[must_use]
    pub fn label_has(mut self, label: &str, needle: &str) -> Self {
        self.has.push((label.to_owned(), needle.to_owned()));
        self
    }

    /// Require severity at or above `severity`.
    #[must_use]
    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Filter for consensus commit lines of the given network.
    pub fn commits(config: &FilterConfig, network: &str) -> Self {
        Self::new()
            .label_eq("container_name", &config.commit_container)
            .label_eq("cluster_name", &config.cluster)
            .label_has(&config.source_label, &pod_needle(config, network))
    }

    /// Filter for error-severity application records of the given network.
    pub fn errors(config: &FilterConfig, network: &str) -> Self {
        Self::new()
            .label_eq("container_name", &config.error_container)
            .label_eq("cluster_name", &config.cluster)
            .label_has(&config.source_label, &pod_needle(config, network))
            .min_severity(config.min_severity)
    }

    /// Render the server-side query expression.
    pub fn to_query(&self) -> String {
        let mut clauses: Vec<String> = Vec::new();
        for (label, value) in &self.equals {
            clauses.push(format!("resource.labels.{label}=\"{value}\""));
        }
        for (label, needle) in &self.has {
            clauses.push(format!("resource.labels.{label}:\"{needle}\""));
        }
        if let Some(severity) = self.min_severity {
            clauses.push(format!("severity>={severity}"));
        }
        clauses.join(" AND ")
    }

    /// Evaluate the filter against a record locally.
    pub fn matches(&self, record: &RawRecord) -> bool {
        let equals_ok = self
            .equals
            .iter()
            .all(|(label, value)| record.label(label) == Some(value.as_str()));
        let has_ok = self.has.iter().all(|(label, needle)| {
            record
                .label(label)
                .is_some_and(|v| v.contains(needle.as_str()))
        });
        let severity_ok = self
            .min_severity
            .is_none_or(|floor| record.severity >= floor);

        equals_ok && has_ok && severity_ok
    }
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

fn pod_needle(config: &FilterConfig, network: &str) -> String {
    format!("{}{network}", config.pod_prefix)
}
