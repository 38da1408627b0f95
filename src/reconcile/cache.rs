//! Per-height report storage.

use std::collections::BTreeMap;

use serde::Serialize;

/// One node's claimed root at some height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootReport {
    /// Reporting node.
    pub source_id: String,
    /// Hex-encoded state root.
    pub root: String,
}

impl RootReport {
    /// Build a report.
    pub fn new(source_id: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            root: root.into(),
        }
    }
}

/// Every accepted report for one height, in arrival order.
///
/// All roots in a record are byte-for-byte equal; the engine refuses any
/// insertion that would break this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeightRecord {
    height: u64,
    reports: Vec<RootReport>,
}

impl HeightRecord {
    pub(crate) fn new(height: u64, first: RootReport) -> Self {
        Self {
            height,
            reports: vec![first],
        }
    }

    /// Block height this record covers.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Accepted reports, oldest first.
    pub fn reports(&self) -> &[RootReport] {
        &self.reports
    }

    /// Whether any recorded root differs from `root`.
    ///
    /// Checks every entry rather than only the first.
    pub fn conflicts_with(&self, root: &str) -> bool {
        self.reports.iter().any(|r| r.root != root)
    }

    /// Whether this exact `(source, root)` pair is already recorded.
    pub fn contains(&self, report: &RootReport) -> bool {
        self.reports.iter().any(|r| r == report)
    }

    pub(crate) fn push(&mut self, report: RootReport) {
        self.reports.push(report);
    }

    pub(crate) fn len(&self) -> usize {
        self.reports.len()
    }
}

/// Height-keyed record map with an optional sliding retention window.
#[derive(Debug, Default)]
pub(crate) struct HeightCache {
    records: BTreeMap<u64, HeightRecord>,
    retain: Option<u64>,
    highest: Option<u64>,
}

impl HeightCache {
    pub(crate) fn new(retain: Option<u64>) -> Self {
        Self {
            records: BTreeMap::new(),
            retain,
            highest: None,
        }
    }

    /// Lowest height still verifiable, when a window is configured.
    pub(crate) fn floor(&self) -> Option<u64> {
        let (retain, highest) = self.retain.zip(self.highest)?;
        Some(highest.saturating_sub(retain.saturating_sub(1)))
    }

    pub(crate) fn is_below_window(&self, height: u64) -> bool {
        self.floor().is_some_and(|floor| height < floor)
    }

    pub(crate) fn get(&self, height: u64) -> Option<&HeightRecord> {
        self.records.get(&height)
    }

    pub(crate) fn get_mut(&mut self, height: u64) -> Option<&mut HeightRecord> {
        self.records.get_mut(&height)
    }

    pub(crate) fn insert(&mut self, record: HeightRecord) {
        let height = record.height();
        self.records.insert(height, record);
        if self.highest.is_none_or(|h| height > h) {
            self.highest = Some(height);
            self.evict();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &HeightRecord> {
        self.records.values()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    fn evict(&mut self) {
        if let Some(floor) = self.floor() {
            self.records = self.records.split_off(&floor);
        }
    }
}
