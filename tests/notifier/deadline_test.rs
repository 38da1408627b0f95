//! Tests for bounded notification delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use apphash_relay::notifier::{notify_within, LogNotifier, Notifier};
use async_trait::async_trait;

#[derive(Default)]
struct Recording {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for Recording {
    async fn notify(&self, message: &str) {
        self.sent.lock().expect("lock").push(message.to_owned());
    }
}

#[derive(Default)]
struct Stalled {
    finished: AtomicBool,
}

#[async_trait]
impl Notifier for Stalled {
    async fn notify(&self, _message: &str) {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        self.finished.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn fast_sink_receives_message() {
    let sink = Recording::default();
    notify_within(&sink, "hello", Duration::from_secs(1)).await;
    assert_eq!(*sink.sent.lock().expect("lock"), vec!["hello".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn stalled_sink_is_abandoned_at_deadline() {
    let sink = Stalled::default();
    let started = tokio::time::Instant::now();

    notify_within(&sink, "hello", Duration::from_secs(10)).await;

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(3600));
    assert!(!sink.finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn log_notifier_never_blocks() {
    notify_within(&LogNotifier, "logged only", Duration::from_millis(50)).await;
}
