use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use fitbit_client::retry::RetryPolicy;
use fitbit_note_sync::gcp_secrets::{GcpSecretManager, GoogleAuth};
use fitbit_note_sync::secret_store::{SecretBackend, SecretStore};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "/v1/projects/fibit2obsidian/secrets/fitbit-refresh-token";

fn manager(server: &MockServer) -> GcpSecretManager {
    GcpSecretManager::new(
        &server.uri(),
        "fibit2obsidian",
        GoogleAuth::Static(SecretString::new("gcp-token".into())),
    )
}

#[tokio::test]
async fn access_latest_decodes_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SECRET}/versions/latest:access")))
        .and(header("authorization", "Bearer gcp-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/1/secrets/fitbit-refresh-token/versions/4",
            "payload": {"data": STANDARD.encode("rt-4")}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let value = manager(&server)
        .access_latest("fitbit-refresh-token")
        .await
        .expect("access");
    assert_eq!(value.as_deref(), Some("rt-4"));
}

#[tokio::test]
async fn missing_secret_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": {"code": 404}})))
        .mount(&server)
        .await;

    assert_eq!(
        manager(&server)
            .access_latest("fitbit-refresh-token")
            .await
            .expect("access"),
        None
    );
}

#[tokio::test]
async fn create_tolerates_existing_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/fibit2obsidian/secrets"))
        .and(query_param("secretId", "fitbit-refresh-token"))
        .and(body_string_contains("automatic"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    manager(&server)
        .create("fitbit-refresh-token")
        .await
        .expect("409 is not an error");
}

#[tokio::test]
async fn add_version_sends_base64_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{SECRET}:addVersion")))
        .and(body_string_contains(STANDARD.encode("rt-5")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "v5"})))
        .expect(1)
        .mount(&server)
        .await;

    manager(&server)
        .add_version("fitbit-refresh-token", "rt-5")
        .await
        .expect("add version");
}

#[tokio::test]
async fn metadata_token_is_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/computeMetadata/v1/instance/service-accounts/default/token",
        ))
        .and(header("metadata-flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "meta-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SECRET}/versions/latest:access")))
        .and(header("authorization", "Bearer meta-token"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let manager = GcpSecretManager::new(
        &server.uri(),
        "fibit2obsidian",
        GoogleAuth::MetadataServer {
            base_url: server.uri(),
        },
    );
    for _ in 0..2 {
        manager
            .access_latest("fitbit-refresh-token")
            .await
            .expect("access");
    }
}

#[tokio::test]
async fn store_falls_back_when_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = SecretStore::new(
        Arc::new(manager(&server)),
        "fitbit-refresh-token",
        Some(SecretString::new("rt-env".into())),
    )
    .with_retry(RetryPolicy::none());
    assert_eq!(store.get().await.expect("fallback").expose_secret(), "rt-env");
}

#[tokio::test]
async fn store_set_creates_then_adds_version() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/fibit2obsidian/secrets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{SECRET}:addVersion")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = SecretStore::new(Arc::new(manager(&server)), "fitbit-refresh-token", None)
        .with_retry(RetryPolicy::none());
    store
        .set(&SecretString::new("rt-6".into()))
        .await
        .expect("set");
}
