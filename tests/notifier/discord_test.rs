//! Tests for webhook delivery against a local HTTP listener.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use apphash_relay::notifier::messages::divergence_alert;
use apphash_relay::notifier::{DiscordNotifier, Notifier};
use apphash_relay::reconcile::{Divergence, RootReport};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use url::Url;

#[derive(Clone)]
struct Hook {
    bodies: Arc<Mutex<Vec<Value>>>,
    status: StatusCode,
    delay: Duration,
}

async fn capture(State(hook): State<Hook>, Json(body): Json<Value>) -> StatusCode {
    tokio::time::sleep(hook.delay).await;
    hook.bodies.lock().expect("lock").push(body);
    hook.status
}

async fn spawn_hook(status: StatusCode, delay: Duration) -> (Url, Arc<Mutex<Vec<Value>>>) {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let hook = Hook {
        bodies: Arc::clone(&bodies),
        status,
        delay,
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = Router::new().route("/hook", post(capture)).with_state(hook);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let url = Url::parse(&format!("http://{addr}/hook")).expect("hook url");
    (url, bodies)
}

fn contents(bodies: &Arc<Mutex<Vec<Value>>>) -> Vec<String> {
    bodies
        .lock()
        .expect("lock")
        .iter()
        .map(|b| b["content"].as_str().expect("content string").to_owned())
        .collect()
}

fn notifier(url: Url, timeout: Duration) -> DiscordNotifier {
    DiscordNotifier::new(url, timeout, 2000).expect("client")
}

#[tokio::test]
async fn posts_content_json() {
    let (url, bodies) = spawn_hook(StatusCode::NO_CONTENT, Duration::ZERO).await;

    notifier(url, Duration::from_secs(5)).notify("hello fleet").await;

    let bodies = bodies.lock().expect("lock").clone();
    assert_eq!(bodies, vec![serde_json::json!({ "content": "hello fleet" })]);
}

#[tokio::test]
async fn long_divergence_alert_arrives_whole() {
    let (url, bodies) = spawn_hook(StatusCode::NO_CONTENT, Duration::ZERO).await;

    let agreeing = "a".repeat(64);
    let mut reports: Vec<RootReport> = (0..24)
        .map(|i| RootReport::new(format!("penumbra-testnet-fullnode-{i:02}"), agreeing.as_str()))
        .collect();
    reports.push(RootReport::new("penumbra-testnet-validator-07", "b".repeat(64)));
    let alert = divergence_alert("@here", &Divergence {
        height: 4242,
        reports,
    });
    assert!(alert.len() > 2000);

    notifier(url, Duration::from_secs(5)).notify(&alert).await;

    let parts = contents(&bodies);
    assert!(parts.len() >= 2);
    assert!(parts.iter().all(|p| p.len() <= 2000));
    assert!(parts[0].starts_with("@here : ROOT MISMATCH DETECTED AT BLOCK 4242\n"));
    assert_eq!(parts.concat(), alert);
    assert!(parts
        .last()
        .is_some_and(|p| p.contains("penumbra-testnet-validator-07")));
}

#[tokio::test]
async fn server_error_is_swallowed() {
    let (url, bodies) = spawn_hook(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;

    notifier(url, Duration::from_secs(5)).notify("still returns").await;

    assert_eq!(contents(&bodies), vec!["still returns".to_owned()]);
}

#[tokio::test]
async fn refused_connection_is_swallowed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let url = Url::parse(&format!("http://{addr}/hook")).expect("hook url");

    tokio::time::timeout(
        Duration::from_secs(5),
        notifier(url, Duration::from_secs(2)).notify("nobody home"),
    )
    .await
    .expect("refused delivery returns promptly");
}

#[tokio::test]
async fn slow_webhook_hits_client_timeout() {
    let (url, _bodies) = spawn_hook(StatusCode::NO_CONTENT, Duration::from_secs(3)).await;
    let started = Instant::now();

    notifier(url, Duration::from_millis(200)).notify("too slow").await;

    assert!(started.elapsed() < Duration::from_secs(2));
}
