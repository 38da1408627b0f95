//! Tests for the opt-in retention window and source deduplication.

use apphash_relay::config::ReconcileConfig;
use apphash_relay::reconcile::{
    EngineOptions, Observation, ReconcileError, ReconciliationEngine, RootReport,
};

use crate::event;

fn windowed(k: u64) -> ReconciliationEngine {
    ReconciliationEngine::new(EngineOptions {
        retain_heights: Some(k),
        ..EngineOptions::default()
    })
}

fn deduping() -> ReconciliationEngine {
    ReconciliationEngine::new(EngineOptions {
        dedupe_sources: true,
        ..EngineOptions::default()
    })
}

// ---------------------------------------------------------------------------
// Retention window
// ---------------------------------------------------------------------------

#[test]
fn window_bounds_cached_heights() {
    let mut engine = windowed(5);
    for h in 1..=100 {
        engine.observe(&event(h, "aa", "a")).expect("accept");
    }
    assert_eq!(engine.height_count(), 5);
    assert!(engine.reports_at(95).is_none());
    assert!(engine.reports_at(96).is_some());
}

#[test]
fn heights_below_window_are_unverifiable() {
    let mut engine = windowed(10);
    engine.observe(&event(100, "aa", "a")).expect("accept tip");

    assert_eq!(
        engine.observe(&event(90, "zz", "b")),
        Ok(Observation::Unverifiable { floor: 91 })
    );
    assert!(engine.reports_at(90).is_none());
}

#[test]
fn conflicts_inside_window_still_diverge() {
    let mut engine = windowed(10);
    engine.observe(&event(100, "aa", "a")).expect("accept tip");
    engine.observe(&event(95, "bb", "a")).expect("accept in window");

    assert!(matches!(
        engine.observe(&event(95, "cc", "b")),
        Err(ReconcileError::Divergence(_))
    ));
}

#[test]
fn evicted_height_cannot_diverge() {
    let mut engine = windowed(2);
    engine.observe(&event(1, "aa", "a")).expect("h1");
    engine.observe(&event(2, "aa", "a")).expect("h2");
    engine.observe(&event(3, "aa", "a")).expect("h3 evicts h1");

    assert!(matches!(
        engine.observe(&event(1, "ff", "b")),
        Ok(Observation::Unverifiable { .. })
    ));
}

// ---------------------------------------------------------------------------
// Source deduplication
// ---------------------------------------------------------------------------

#[test]
fn dedupe_collapses_exact_repeats() {
    let mut engine = deduping();
    engine.observe(&event(200, "cc", "nodeA")).expect("first");
    let obs = engine.observe(&event(200, "cc", "nodeA")).expect("repeat");

    assert_eq!(
        obs,
        Observation::Accepted {
            reports_at_height: 1,
            duplicate: true,
            progress: false,
        }
    );
    assert_eq!(
        engine.reports_at(200),
        Some(&[RootReport::new("nodeA", "cc")][..])
    );
}

#[test]
fn dedupe_still_detects_same_source_changing_root() {
    let mut engine = deduping();
    engine.observe(&event(8, "aa", "nodeA")).expect("first");
    assert!(matches!(
        engine.observe(&event(8, "bb", "nodeA")),
        Err(ReconcileError::Divergence(_))
    ));
}

#[test]
fn dedupe_keeps_distinct_sources() {
    let mut engine = deduping();
    for src in ["a", "b", "a", "c", "b"] {
        engine.observe(&event(8, "aa", src)).expect("accept");
    }
    assert_eq!(engine.reports_at(8).map(<[RootReport]>::len), Some(3));
}

#[test]
fn options_follow_reconcile_config() {
    let config = ReconcileConfig {
        progress_interval: 50,
        retain_heights: Some(1000),
        dedupe_sources: true,
    };
    let options = EngineOptions::from(&config);
    assert_eq!(options.progress_interval, 50);
    assert_eq!(options.retain_heights, Some(1000));
    assert!(options.dedupe_sources);
}
