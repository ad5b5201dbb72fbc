//! End-to-end tests of the worker's HTTP surface against a scripted remote.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use inspekt_core::HttpResponse;
use inspekt_db::{Database, DbConfig};
use inspekt_sync::network::{MockFetcher, MockReply};
use inspekt_sync::SyncConfig;
use inspekt_worker::{router, WorkerRuntime};

const ORIGIN: &str = "https://app.test";

struct Harness {
    addr: SocketAddr,
    mock: Arc<MockFetcher>,
    client: reqwest::Client,
    _runtime: WorkerRuntime,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn remote(path: &str) -> String {
        format!("{ORIGIN}{path}")
    }
}

async fn start() -> Harness {
    let mock = Arc::new(MockFetcher::new());
    for asset in ["/", "/index.html", "/manifest.json"] {
        mock.on("GET", &Harness::remote(asset), MockReply::ok("<html>shell</html>"));
    }
    mock.on(
        "GET",
        &Harness::remote("/offline.html"),
        MockReply::Respond(
            HttpResponse::new(200, "<html>offline</html>")
                .with_header("content-type", "text/html"),
        ),
    );

    let mut config = SyncConfig::default();
    config.remote.origin = ORIGIN.into();
    config.cache.navigation_timeout_ms = 200;

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let runtime = WorkerRuntime::start(config, db, mock.clone()).unwrap();
    runtime.install().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(runtime.state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Harness {
        addr,
        mock,
        client: reqwest::Client::new(),
        _runtime: runtime,
    }
}

#[tokio::test]
async fn test_health_and_status() {
    let h = start().await;

    let body = h.client.get(h.url("/__worker/health")).send().await.unwrap();
    assert_eq!(body.text().await.unwrap(), "OK");

    let status: Value = h
        .client
        .get(h.url("/__worker/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["isOnline"], true);
    assert_eq!(status["pendingActionsCount"], 0);
}

#[tokio::test]
async fn test_api_read_is_served_from_cache_on_repeat() {
    let h = start().await;
    h.mock.on(
        "GET",
        &Harness::remote("/api/inspections"),
        MockReply::ok(r#"[{"id":"i-1"}]"#),
    );

    let first = h.client.get(h.url("/api/inspections")).send().await.unwrap();
    assert_eq!(first.headers()["x-inspekt-source"], "network");
    assert_eq!(first.text().await.unwrap(), r#"[{"id":"i-1"}]"#);

    h.mock.set_offline(true);
    let second = h.client.get(h.url("/api/inspections")).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers()["x-inspekt-source"], "cache");
}

#[tokio::test]
async fn test_offline_navigation_gets_offline_page() {
    let h = start().await;
    h.mock.set_offline(true);

    let response = h
        .client
        .get(h.url("/reports/weekly"))
        .header("accept", "text/html")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-inspekt-source"], "offline-page");
    assert_eq!(response.text().await.unwrap(), "<html>offline</html>");
}

#[tokio::test]
async fn test_enqueued_action_is_replayed() {
    let h = start().await;
    let target = Harness::remote("/api/inspections");
    h.mock.on("POST", &target, MockReply::status(201));

    let response = h
        .client
        .post(h.url("/__worker/actions"))
        .json(&json!({
            "type": "submitInspection",
            "data": { "formId": "f1", "answers": { "q1": "ok" } }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let body: Value = response.json().await.unwrap();
    assert!(body["id"].as_i64().is_some());

    for _ in 0..100 {
        if h.mock.calls_to("POST", &target) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.mock.calls_to("POST", &target), 1);
}

#[tokio::test]
async fn test_malformed_known_action_is_rejected() {
    let h = start().await;

    let response = h
        .client
        .post(h.url("/__worker/actions"))
        .json(&json!({ "type": "deleteInspection", "data": { "wrong": true } }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_dot_segment_ids_are_rejected() {
    let h = start().await;

    for body in [
        json!({ "type": "deleteInspection", "data": { "inspectionId": ".." } }),
        json!({ "type": "..", "data": {} }),
    ] {
        let response = h
            .client
            .post(h.url("/__worker/actions"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    let status: Value = h
        .client
        .get(h.url("/__worker/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["pendingActionsCount"], 0);
}

#[tokio::test]
async fn test_control_check_version() {
    let h = start().await;

    let reply: Value = h
        .client
        .post(h.url("/__worker/control"))
        .json(&json!({ "type": "CHECK_VERSION" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(reply, json!({ "type": "VERSION", "payload": { "version": "v1" } }));
}

#[tokio::test]
async fn test_resubmit_unknown_action_is_not_found() {
    let h = start().await;

    let response = h
        .client
        .post(h.url("/__worker/actions/999/resubmit"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_blob_upload_and_delete() {
    let h = start().await;

    let put = h
        .client
        .put(h.url("/__worker/blobs/photo-1"))
        .header("content-type", "image/jpeg")
        .body(b"jpegbytes".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), 204);

    let first = h.client.delete(h.url("/__worker/blobs/photo-1")).send().await.unwrap();
    assert_eq!(first.status(), 204);
    let second = h.client.delete(h.url("/__worker/blobs/photo-1")).send().await.unwrap();
    assert_eq!(second.status(), 404);
}
