//! Per-height state root reconciliation.
//!
//! The engine consumes commit events in arrival order and enforces that
//! every node reports the same root at each height. The first conflicting
//! report halts the engine for good.
//!
//! Delivery order across independent nodes is not guaranteed, and a chain
//! restart that reuses height numbers looks exactly like a divergence. The
//! engine does not try to tell the two apart: any differing root at a
//! repeated height is fatal.

use serde::Serialize;

use crate::config::ReconcileConfig;
use crate::extractor::CommitEvent;

mod cache;

pub use cache::{HeightRecord, RootReport};

use cache::HeightCache;

/// Engine lifecycle. There is no way back from [`EngineState::Halted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Accepting events.
    Running,
    /// A divergence was detected; every further event is rejected.
    Halted,
}

/// Engine behavior switches.
///
/// The defaults keep every height forever and record repeat reports from
/// the same node as separate entries. Both `retain_heights` and
/// `dedupe_sources` change observable behavior when enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Progress notices fire at heights divisible by this.
    pub progress_interval: u64,
    /// Sliding window size in heights; `None` is unbounded.
    pub retain_heights: Option<u64>,
    /// Skip appending an exact `(source, root)` repeat.
    pub dedupe_sources: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

impl From<&ReconcileConfig> for EngineOptions {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            progress_interval: config.progress_interval,
            retain_heights: config.retain_heights,
            dedupe_sources: config.dedupe_sources,
        }
    }
}

/// Result of offering one event to a running engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The event agrees with everything known at its height.
    Accepted {
        /// Entries recorded at this height after acceptance.
        reports_at_height: usize,
        /// The event repeated a recorded pair and was not appended.
        duplicate: bool,
        /// The height falls on the progress interval.
        progress: bool,
    },
    /// The height has slid out of the retention window and cannot be checked.
    Unverifiable {
        /// Lowest height still retained.
        floor: u64,
    },
}

/// Two or more nodes reported different roots for one height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("root mismatch at height {height} across {} reports", .reports.len())]
pub struct Divergence {
    /// Divergent height.
    pub height: u64,
    /// Every known report at that height, the conflicting one last.
    pub reports: Vec<RootReport>,
}

/// Why the engine refused an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// This event conflicts with an earlier report. The engine is now halted.
    #[error(transparent)]
    Divergence(Divergence),

    /// The engine already halted on an earlier divergence.
    #[error("engine halted after divergence at height {height}")]
    Halted {
        /// Height of the divergence that halted the engine.
        height: u64,
    },
}

/// Single-owner reconciliation state machine.
#[derive(Debug)]
pub struct ReconciliationEngine {
    cache: HeightCache,
    options: EngineOptions,
    halted_at: Option<u64>,
}

impl ReconciliationEngine {
    /// Create a running engine with an empty cache.
    pub fn new(options: EngineOptions) -> Self {
        Self {
            cache: HeightCache::new(options.retain_heights),
            options,
            halted_at: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        if self.halted_at.is_some() {
            EngineState::Halted
        } else {
            EngineState::Running
        }
    }

    /// Offer one event.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Divergence`] for the first event whose root
    /// differs from any recorded root at its height; the engine halts and
    /// discards its cache. Afterwards every call returns
    /// [`ReconcileError::Halted`].
    pub fn observe(&mut self, event: &CommitEvent) -> Result<Observation, ReconcileError> {
        if let Some(height) = self.halted_at {
            return Err(ReconcileError::Halted { height });
        }

        if self.cache.is_below_window(event.height) {
            let floor = self.cache.floor().unwrap_or(event.height);
            return Ok(Observation::Unverifiable { floor });
        }

        let report = RootReport::new(event.source_id.as_str(), event.root.as_str());
        let progress = self.is_progress_height(event.height);

        let Some(record) = self.cache.get_mut(event.height) else {
            self.cache.insert(HeightRecord::new(event.height, report));
            return Ok(Observation::Accepted {
                reports_at_height: 1,
                duplicate: false,
                progress,
            });
        };

        if record.conflicts_with(&report.root) {
            let mut reports = record.reports().to_vec();
            reports.push(report);
            let divergence = Divergence {
                height: event.height,
                reports,
            };
            self.halt(event.height);
            return Err(ReconcileError::Divergence(divergence));
        }

        let duplicate = self.options.dedupe_sources && record.contains(&report);
        if !duplicate {
            record.push(report);
        }

        Ok(Observation::Accepted {
            reports_at_height: record.len(),
            duplicate,
            progress,
        })
    }

    /// Reports recorded at `height`, if any.
    pub fn reports_at(&self, height: u64) -> Option<&[RootReport]> {
        self.cache.get(height).map(HeightRecord::reports)
    }

    /// Number of heights currently cached.
    pub fn height_count(&self) -> usize {
        self.cache.len()
    }

    /// Copy of the cache contents in ascending height order.
    pub fn snapshot(&self) -> Vec<(u64, Vec<RootReport>)> {
        self.cache
            .iter()
            .map(|r| (r.height(), r.reports().to_vec()))
            .collect()
    }

    /// Options this engine runs with.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn is_progress_height(&self, height: u64) -> bool {
        height.checked_rem(self.options.progress_interval) == Some(0)
    }

    fn halt(&mut self, height: u64) {
        self.halted_at = Some(height);
        self.cache.clear();
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}
