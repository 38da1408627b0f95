//! apphash-relay: fleet state root watchdog.
//!
//! Tails consensus logs from every validator and full node of a network,
//! checks that all of them commit the same application state root at each
//! height, and alerts an operator channel on the first divergence. Error
//! logs from the application container are relayed to the same channel.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Environment settings and TOML tunables.
pub mod config;
/// Commit-line extraction.
pub mod extractor;
/// Liveness endpoint.
pub mod health;
/// Raw log records, subscription filters, and log sources.
pub mod ingest;
/// Structured logging setup.
pub mod logging;
/// Operator notification sinks and message formats.
pub mod notifier;
/// Producer and consumer loops.
pub mod pipeline;
/// Per-height root reconciliation engine.
pub mod reconcile;
/// Error log relay.
pub mod relay;
/// Pipeline orchestration.
pub mod supervisor;
