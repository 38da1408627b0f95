//! Commit-line extraction.
//!
//! Turns one raw consensus log payload into a [`CommitEvent`]. Pure and
//! stateless: the compiled pattern is shared, so any number of callers may
//! extract concurrently.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Marker text and field grammar of a CometBFT "block committed" line.
const COMMIT_PATTERN: &str = r"finalizing commit of block\s+module=consensus height=(\d+) hash=([0-9a-fA-F]+) root=([0-9a-fA-F]+) num_txs=(\d+)";

#[allow(clippy::expect_used)]
static COMMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(COMMIT_PATTERN).expect("commit pattern is a valid regex"));

/// One node's report of a committed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitEvent {
    /// Block height.
    pub height: u64,
    /// Block hash, kept for diagnostics only.
    pub hash: String,
    /// Hex-encoded application state root.
    pub root: String,
    /// Number of transactions in the block.
    pub tx_count: u64,
    /// Identifier of the reporting node (pod name).
    pub source_id: String,
}

/// Why a line did not yield a [`CommitEvent`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The marker or one of the fields is absent.
    #[error("line is not a commit line")]
    NoMatch,

    /// A numeric field matched the grammar but does not fit an integer.
    #[error("invalid integer in field {field}: {value}")]
    InvalidInteger {
        /// Name of the offending field.
        field: &'static str,
        /// Raw text captured for it.
        value: String,
    },
}

/// Extract a commit event from `line`, attributing it to `source_id`.
///
/// # Errors
///
/// Returns [`ParseError::NoMatch`] when the line does not follow the commit
/// grammar and [`ParseError::InvalidInteger`] when `height` or `num_txs`
/// overflows. No partial event is ever produced.
pub fn extract(source_id: &str, line: &str) -> Result<CommitEvent, ParseError> {
    let caps = COMMIT_RE.captures(line).ok_or(ParseError::NoMatch)?;

    let height = parse_uint("height", &caps[1])?;
    let tx_count = parse_uint("num_txs", &caps[4])?;

    Ok(CommitEvent {
        height,
        hash: caps[2].to_owned(),
        root: caps[3].to_owned(),
        tx_count,
        source_id: source_id.to_owned(),
    })
}

fn parse_uint(field: &'static str, value: &str) -> Result<u64, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidInteger {
        field,
        value: value.to_owned(),
    })
}
