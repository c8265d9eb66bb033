//! Diagnostic collector over real HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{CheckoutPage, TestHarness};
use payguard::collector::{CollectorHandle, DiagnosticStore, FileStore, MemoryStore, StoredDiagnostic};
use payguard::config::{CollectorConfig, DetectorConfig, DiagnosticEndpointConfig};
use payguard::diagnostic::HttpReporter;
use payguard::event::CollectorEventsChannel;
use payguard::traps::NoNetworkHooks;
use payguard::{CollectorBuilder, CollectorEvent, Phase};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const TOKEN: &str = "s3cret-token";

/// A collector running on an ephemeral port.
struct Collector {
    addr: SocketAddr,
    handle: CollectorHandle,
    events: CollectorEventsChannel,
    task: JoinHandle<payguard::Result<()>>,
}

impl Collector {
    fn start(data_dir: &Path, store: Option<Arc<dyn DiagnosticStore>>, max_body_bytes: usize) -> Self {
        let config = CollectorConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            token: TOKEN.to_string(),
            data_dir: data_dir.to_path_buf(),
            max_body_bytes,
            ..CollectorConfig::default()
        };
        let mut builder = CollectorBuilder::new(config);
        if let Some(store) = store {
            builder = builder.with_store(store);
        }
        let mut collector = builder.build().unwrap();
        let addr = collector.local_addr();
        let handle = collector.handle();
        let events = collector.subscribe_events();
        let task = tokio::spawn(async move { collector.run().await });
        Self {
            addr,
            handle,
            events,
            task,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn post(&self, path: &str, body: String) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn stop(self) {
        self.handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("collector did not stop")
            .unwrap()
            .unwrap();
    }
}

fn blocked(reason: &str) -> Value {
    json!({
        "status": "blocked",
        "provider": "stripe",
        "reason": reason,
        "details": "widget_missing",
        "url": "https://shop.example/en/order",
    })
}

/// Wait until the store holds a diagnostic.
async fn wait_for_record(store: &dyn DiagnosticStore) -> Option<StoredDiagnostic> {
    for _ in 0..100 {
        if let Some(record) = store.load().unwrap() {
            return Some(record);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}

/// A blocked diagnostic with the right token is stored and announced.
#[tokio::test]
async fn test_blocked_diagnostic_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut collector = Collector::start(dir.path(), Some(store.clone()), 64 * 1024);

    let body = json!({"token": TOKEN, "diag": blocked("stripe_timeout")}).to_string();
    let (status, reply) = collector.post("/diagnostic", body).await;
    assert_eq!(status, 200);
    assert_eq!(reply, json!({"ok": true}));

    let record = store.load().unwrap().unwrap();
    assert_eq!(record.field("reason"), Some("stripe_timeout"));
    assert_eq!(record.field("provider"), Some("stripe"));

    let mut stored = false;
    while let Ok(event) = collector.events.try_recv() {
        if event
            == (CollectorEvent::DiagnosticStored {
                reason: Some("stripe_timeout".to_string()),
            })
        {
            stored = true;
        }
    }
    assert!(stored);
    collector.stop().await;
}

/// Every refusal maps to its status code and leaves the store untouched.
#[tokio::test]
async fn test_refusals_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let collector = Collector::start(dir.path(), Some(store.clone()), 1024);
    let client = reqwest::Client::new();

    let response = client.get(collector.url("/diagnostic")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 405);
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["error"], "method_not_allowed");

    let cases = [
        ("/elsewhere", json!({"token": TOKEN, "diag": blocked("x")}).to_string(), 404, "not_found"),
        ("/diagnostic", "{not json".to_string(), 400, "invalid_json"),
        ("/diagnostic", json!({"token": "nope", "diag": blocked("x")}).to_string(), 403, "forbidden"),
        ("/diagnostic", json!({"token": TOKEN}).to_string(), 400, "missing_diag"),
        (
            "/diagnostic",
            json!({"token": TOKEN, "diag": {"status": "blocked", "details": "x".repeat(4096)}}).to_string(),
            413,
            "payload_too_large",
        ),
    ];
    for (path, body, status, code) in cases {
        let (got, reply) = collector.post(path, body).await;
        assert_eq!(got, status, "{path} -> {reply}");
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"], code);
    }

    let (status, reply) = collector
        .post("/diagnostic", json!({"token": TOKEN, "diag": {"status": "ok"}}).to_string())
        .await;
    assert_eq!(status, 200);
    assert_eq!(reply, json!({"ok": true, "ignored": true}));

    assert!(store.load().unwrap().is_none());
    collector.stop().await;
}

/// Query strings do not change the route.
#[tokio::test]
async fn test_query_string_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let collector = Collector::start(dir.path(), Some(Arc::new(MemoryStore::new())), 64 * 1024);
    let body = json!({"token": TOKEN, "diag": blocked("paypal_timeout")}).to_string();
    let (status, _) = collector.post("/diagnostic?source=checkout", body).await;
    assert_eq!(status, 200);
    collector.stop().await;
}

/// The file store keeps the last diagnostic across collector restarts.
#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let collector = Collector::start(dir.path(), None, 64 * 1024);
    for reason in ["stripe_timeout", "stripe_resource_blocked"] {
        let body = json!({"token": TOKEN, "diag": blocked(reason)}).to_string();
        assert_eq!(collector.post("/diagnostic", body).await.0, 200);
    }
    collector.stop().await;

    let config = CollectorConfig {
        data_dir: dir.path().to_path_buf(),
        ..CollectorConfig::default()
    };
    assert!(config.store_path().exists());
    let restarted = Collector::start(dir.path(), None, 64 * 1024);
    let store = FileStore::new(config.store_path());
    let record = store.load().unwrap().unwrap();
    assert_eq!(record.field("reason"), Some("stripe_resource_blocked"));
    restarted.stop().await;
}

/// A detector blocked on a checkout page reports to a live collector.
#[tokio::test]
async fn test_detector_reports_to_collector() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let collector = Collector::start(dir.path(), Some(store.clone()), 64 * 1024);
    let endpoint = collector.url("/diagnostic");

    let config = DetectorConfig {
        debug: true,
        diagnostic: DiagnosticEndpointConfig {
            endpoint_url: Some(endpoint.clone()),
            token: Some(TOKEN.to_string()),
        },
        ..DetectorConfig::default()
    };
    let mut page = CheckoutPage::new();
    let stripe = page.add_option("stripe_official", "Pay by card");
    let mut harness = TestHarness::attach_custom(page, config, &mut NoNetworkHooks, |detector| {
        detector.with_reporter(Box::new(HttpReporter::new(endpoint, TOKEN).unwrap()))
    });
    harness.select(stripe);
    harness.advance(5_000);
    assert_eq!(harness.detector.phase(), Phase::Blocked);
    assert!(harness.detector.report_sent());

    let record = wait_for_record(store.as_ref()).await.expect("no diagnostic stored");
    assert_eq!(record.field("status"), Some("blocked"));
    assert_eq!(record.field("reason"), Some("stripe_timeout"));
    assert_eq!(record.field("paymentOptionId"), Some("payment-option-1"));
    assert_eq!(record.field("moduleName"), Some("stripe_official"));
    assert!(record.summary().contains("stripe_timeout"));
    collector.stop().await;
}
