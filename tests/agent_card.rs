//! Card resolver tests over a live loopback server: direct fetch, registry
//! lookup, and error surfacing.

mod common;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use agentvault::card::CardResolver;
use agentvault::error::AgentVaultError;

use common::spawn_server;

fn sample_card_json(url: &str) -> serde_json::Value {
    json!({
        "schemaVersion": "1.0",
        "humanReadableId": "example-org/sample",
        "agentVersion": "1.2.3",
        "name": "Sample Agent",
        "description": "For resolver tests.",
        "url": url,
        "provider": {"name": "Example Org"},
        "capabilities": {"a2aVersion": "1.0"},
        "authSchemes": [{"scheme": "none"}]
    })
}

async fn registry_lookup(Path(id): Path<String>) -> impl IntoResponse {
    if id == "example-org/sample" {
        Json(json!({"card_data": sample_card_json("https://agents.example.com/a2a")}))
            .into_response()
    } else {
        (StatusCode::NOT_FOUND, "no such agent").into_response()
    }
}

async fn resolver_fixture() -> (std::net::SocketAddr, CardResolver) {
    let router = Router::new()
        .route(
            "/card.json",
            get(|| async { Json(sample_card_json("https://agents.example.com/a2a")) }),
        )
        .route(
            "/invalid-card.json",
            get(|| async { Json(json!({"schemaVersion": "1.0"})) }),
        )
        .route(
            "/broken.json",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
        )
        .route("/api/v1/agent-cards/id/{*id}", get(registry_lookup));

    (spawn_server(router).await, CardResolver::new())
}

#[tokio::test]
async fn fetches_card_from_url() {
    let (addr, resolver) = resolver_fixture().await;
    let card = resolver
        .fetch_from_url(&format!("http://{addr}/card.json"))
        .await
        .unwrap();
    assert_eq!(card.human_readable_id, "example-org/sample");
    assert_eq!(card.agent_version, "1.2.3");
}

#[tokio::test]
async fn non_2xx_fetch_carries_status_and_body() {
    let (addr, resolver) = resolver_fixture().await;
    let err = resolver
        .fetch_from_url(&format!("http://{addr}/broken.json"))
        .await
        .unwrap_err();
    match err {
        AgentVaultError::AgentCardFetch { status, body, .. } => {
            assert_eq!(status, Some(502));
            assert!(body.unwrap().contains("upstream exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn schema_violation_is_validation_error() {
    let (addr, resolver) = resolver_fixture().await;
    let err = resolver
        .fetch_from_url(&format!("http://{addr}/invalid-card.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentVaultError::AgentCardValidation(_)));
}

#[tokio::test]
async fn connection_refused_is_fetch_error() {
    let resolver = CardResolver::new();
    // Port 1 is essentially never listening.
    let err = resolver
        .fetch_from_url("http://127.0.0.1:1/card.json")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentVaultError::AgentCardFetch { .. }));
}

#[tokio::test]
async fn registry_lookup_extracts_card_data() {
    let (addr, resolver) = resolver_fixture().await;
    let card = resolver
        .fetch_from_registry(&format!("http://{addr}"), "example-org/sample")
        .await
        .unwrap();
    assert_eq!(card.name, "Sample Agent");
}

#[tokio::test]
async fn registry_404_is_not_found_variant() {
    let (addr, resolver) = resolver_fixture().await;
    let err = resolver
        .fetch_from_registry(&format!("http://{addr}"), "example-org/ghost")
        .await
        .unwrap_err();
    match err {
        AgentVaultError::AgentCardNotFound(id) => assert_eq!(id, "example-org/ghost"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn injected_client_is_used() {
    let (addr, _) = resolver_fixture().await;
    let resolver = CardResolver::with_client(reqwest::Client::new());
    let card = resolver
        .fetch_from_url(&format!("http://{addr}/card.json"))
        .await
        .unwrap();
    assert_eq!(card.provider.name, "Example Org");
}
