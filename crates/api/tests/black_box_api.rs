use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::{Value, json};

use stocklink_api::app::{AppState, build_app};
use stocklink_api::config::ServerConfig;
use stocklink_api::signature::SignatureValidator;
use stocklink_core::TenantId;
use stocklink_infra::platform::InMemoryPlatform;
use stocklink_infra::{SyncConfig, SyncServices};

const SECRET: &str = "black-box-secret";
const ADMIN_TOKEN: &str = "black-box-admin";

struct TestServer {
    base_url: String,
    platform: Arc<InMemoryPlatform>,
    tenant: TenantId,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(admin_token: Option<&str>) -> Self {
        let platform = Arc::new(InMemoryPlatform::new());
        let tenant = TenantId::new();
        platform.link(tenant, &"m".into(), &[("c1", None), ("c2", Some(2))]);
        for (node, qty) in [("m", 4), ("c1", 4), ("c2", 2)] {
            platform.set_level(tenant, &node.into(), &"l".into(), qty);
        }

        let config = SyncConfig::default().with_window(Duration::from_millis(100));
        let services = SyncServices::in_memory(config, platform.clone());
        let server = ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            webhook_secret: SecretString::from(SECRET),
            admin_token: admin_token.map(SecretString::from),
        };
        let app = build_app(AppState::new(services, &server));

        // Same router as prod, bound to an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            platform,
            tenant,
            handle,
        }
    }

    fn qty(&self, node: &str) -> Option<i64> {
        self.platform.level(self.tenant, &node.into(), &"l".into())
    }

    async fn post_webhook(&self, client: &reqwest::Client, body: &Value) -> reqwest::Response {
        let raw = serde_json::to_vec(body).unwrap();
        client
            .post(format!("{}/webhooks/inventory", self.base_url))
            .header("X-Stocklink-Tenant", self.tenant.to_string())
            .header("X-Stocklink-Signature", sign(&raw))
            .header("Content-Type", "application/json")
            .body(raw)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn sign(payload: &[u8]) -> String {
    SignatureValidator::new(SecretString::from(SECRET))
        .sign(payload)
        .unwrap()
}

async fn wait_for_qty(server: &TestServer, node: &str, expected: i64) {
    for _ in 0..50 {
        if server.qty(node) == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{node} never reached {expected}; last seen {:?}", server.qty(node));
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn(None).await;
    let res = reqwest::get(format!("{}/health", server.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn bad_signature_is_rejected_without_side_effects() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let raw = serde_json::to_vec(&json!({"node_id":"m","location_id":"l","quantity":10})).unwrap();

    let res = client
        .post(format!("{}/webhooks/inventory", server.base_url))
        .header("X-Stocklink-Tenant", server.tenant.to_string())
        .header("X-Stocklink-Signature", "sha256=00")
        .body(raw.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(format!("{}/webhooks/inventory", server.base_url))
        .header("X-Stocklink-Tenant", server.tenant.to_string())
        .body(raw)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(server.platform.writes().is_empty());
}

#[tokio::test]
async fn missing_tenant_and_malformed_body_are_bad_requests() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();

    let raw = serde_json::to_vec(&json!({"node_id":"m","location_id":"l","quantity":10})).unwrap();
    let res = client
        .post(format!("{}/webhooks/inventory", server.base_url))
        .header("X-Stocklink-Signature", sign(&raw))
        .body(raw)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .post_webhook(&client, &json!({"node_id":"m","quantity":"ten"}))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "malformed_payload");

    let res = server
        .post_webhook(&client, &json!({"node_id":"","location_id":"l","quantity":1}))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn master_webhook_converges_children() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    server.platform.set_level(server.tenant, &"m".into(), &"l".into(), 10);
    let mut writes = server.platform.subscribe_writes();

    let res = server
        .post_webhook(
            &client,
            &json!({"node_id":"m","location_id":"l","quantity":10,"observed_at":"2026-01-01T00:00:00Z"}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["outcome"], "buffered");

    let mut written = Vec::new();
    for _ in 0..2 {
        let write = tokio::time::timeout(Duration::from_secs(3), writes.recv())
            .await
            .expect("window never flushed")
            .unwrap();
        written.push(write.write.node_id.to_string());
    }
    written.sort();
    assert_eq!(written, vec!["c1", "c2"]);

    wait_for_qty(&server, "c1", 10).await;
    wait_for_qty(&server, "c2", 5).await;
}

#[tokio::test]
async fn identical_redelivery_is_acknowledged_as_duplicate() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let body = json!({"node_id":"m","location_id":"l","quantity":10,"observed_at":"2026-01-01T00:00:00Z"});

    let first: Value = server.post_webhook(&client, &body).await.json().await.unwrap();
    let second: Value = server.post_webhook(&client, &body).await.json().await.unwrap();
    assert_eq!(first["outcome"], "buffered");
    assert_eq!(second["outcome"], "duplicate");
}

#[tokio::test]
async fn redelivery_without_timestamp_is_deduplicated_by_delivery_id() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let body = json!({"node_id":"m","location_id":"l","quantity":10,"delivery_id":"evt-42"});

    let first: Value = server.post_webhook(&client, &body).await.json().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second: Value = server.post_webhook(&client, &body).await.json().await.unwrap();
    assert_eq!(first["outcome"], "buffered");
    assert_eq!(second["outcome"], "duplicate");
}

#[tokio::test]
async fn admin_reconcile_requires_token() {
    let server = TestServer::spawn(Some(ADMIN_TOKEN)).await;
    let client = reqwest::Client::new();
    let url = format!("{}/admin/reconcile", server.base_url);
    let body = json!({"master_id":"m","location_id":"l"});

    let res = client
        .post(&url)
        .header("X-Stocklink-Tenant", server.tenant.to_string())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(&url)
        .bearer_auth("wrong")
        .header("X-Stocklink-Tenant", server.tenant.to_string())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    server.platform.set_level(server.tenant, &"m".into(), &"l".into(), 8);
    let res = client
        .post(&url)
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Stocklink-Tenant", server.tenant.to_string())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let out: Value = res.json().await.unwrap();
    assert_eq!(out["outcome"], "ran");

    assert_eq!(server.qty("c1"), Some(8));
    assert_eq!(server.qty("c2"), Some(4));
}

#[tokio::test]
async fn admin_routes_are_closed_without_configured_token() {
    let server = TestServer::spawn(None).await;
    let res = reqwest::Client::new()
        .post(format!("{}/admin/reconcile", server.base_url))
        .bearer_auth("anything")
        .header("X-Stocklink-Tenant", server.tenant.to_string())
        .json(&json!({"master_id":"m","location_id":"l"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
