//! Secret lookup against a fake API server

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::net::SocketAddr;
use vmfm_directives::{LookupError, SecretLookup};
use vmfm_webhook::KubeSecretLookup;

async fn secret(Path((namespace, name)): Path<(String, String)>, headers: HeaderMap) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer sa-token");

    match (namespace.as_str(), name.as_str()) {
        (_, "private") if !authorized => StatusCode::FORBIDDEN.into_response(),
        ("tenant", "cloud-init") | (_, "private") => Json(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "data": {"userdata": STANDARD.encode("#cloud-config\nnested_virt:\n  enabled: true\n")}
        }))
        .into_response(),
        ("tenant", "broken") => Json(json!({"data": {"userdata": "%%%not-base64"}})).into_response(),
        ("tenant", "empty") => Json(json!({"kind": "Secret"})).into_response(),
        ("tenant", "flaky") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn fake_api_server() -> SocketAddr {
    let app = Router::new().route("/api/v1/namespaces/:namespace/secrets/:name", get(secret));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn lookup() -> KubeSecretLookup {
    let addr = fake_api_server().await;
    KubeSecretLookup::new(reqwest::Client::new(), format!("http://{addr}/"))
}

#[tokio::test]
async fn decodes_secret_data() {
    let data = lookup().await.get("tenant", "cloud-init").await.unwrap().unwrap();
    assert_eq!(
        data.get("userdata").map(|v| String::from_utf8_lossy(v).into_owned()),
        Some("#cloud-config\nnested_virt:\n  enabled: true\n".to_string())
    );
}

#[tokio::test]
async fn missing_secret_is_none() {
    assert!(lookup().await.get("tenant", "nope").await.unwrap().is_none());
}

#[tokio::test]
async fn secret_without_data_is_empty() {
    let data = lookup().await.get("tenant", "empty").await.unwrap().unwrap();
    assert!(data.is_empty());
}

#[tokio::test]
async fn invalid_base64_is_malformed() {
    let err = lookup().await.get("tenant", "broken").await.unwrap_err();
    assert!(matches!(err, LookupError::Malformed { .. }), "{err}");
}

#[tokio::test]
async fn server_error_is_backend_error() {
    let err = lookup().await.get("tenant", "flaky").await.unwrap_err();
    assert!(matches!(err, LookupError::Backend { .. }), "{err}");
}

#[tokio::test]
async fn forbidden_without_token() {
    let err = lookup().await.get("tenant", "private").await.unwrap_err();
    assert!(matches!(err, LookupError::Forbidden { .. }), "{err}");
}

#[tokio::test]
async fn token_file_is_sent_as_bearer() {
    let mut token = tempfile::NamedTempFile::new().unwrap();
    token.write_all(b"sa-token\n").unwrap();

    let lookup = lookup().await.with_token_file(token.path());
    assert!(lookup.get("tenant", "private").await.unwrap().is_some());
}

#[tokio::test]
async fn unreadable_token_file_is_backend_error() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = lookup().await.with_token_file(dir.path().join("token"));
    let err = lookup.get("tenant", "cloud-init").await.unwrap_err();
    assert!(matches!(err, LookupError::Backend { .. }), "{err}");
}

#[tokio::test]
async fn unreachable_server_is_backend_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let lookup = KubeSecretLookup::new(reqwest::Client::new(), format!("http://{addr}"));
    let err = lookup.get("tenant", "cloud-init").await.unwrap_err();
    assert!(matches!(err, LookupError::Backend { .. }), "{err}");
}

#[tokio::test]
async fn path_traversal_in_name_stays_in_namespace() {
    let lookup = lookup().await;
    let err = lookup
        .get("attacker", "../../tenant/secrets/cloud-init")
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::InvalidReference { .. }), "{err}");

    let err = lookup.get("attacker", "cloud-init%2F..").await.unwrap_err();
    assert!(matches!(err, LookupError::InvalidReference { .. }), "{err}");
}

#[tokio::test]
async fn invalid_namespace_is_refused() {
    let err = lookup().await.get("../tenant", "cloud-init").await.unwrap_err();
    assert!(matches!(err, LookupError::InvalidReference { .. }), "{err}");
}

#[tokio::test]
async fn same_name_in_other_namespace_is_not_found() {
    assert!(lookup().await.get("attacker", "cloud-init").await.unwrap().is_none());
}
