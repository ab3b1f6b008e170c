//! JSON-RPC dispatch tests against the axum router: envelope validation,
//! core method routing, error-code mapping, and custom handlers.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use agentvault::card::AgentCardBuilder;
use agentvault::error::AgentVaultError;
use agentvault::server::{A2aRouterBuilder, InMemoryTaskStore, TaskStore};

use common::{EchoAgent, FailingAgent};

fn echo_router() -> (Router, Arc<InMemoryTaskStore>) {
    let store = Arc::new(InMemoryTaskStore::new());
    let agent = Arc::new(EchoAgent::new(Arc::clone(&store)));
    let router = A2aRouterBuilder::new(agent, Arc::clone(&store) as Arc<dyn TaskStore>).build();
    (router, store)
}

async fn post_raw(router: &Router, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn post_rpc(router: &Router, body: Value) -> (StatusCode, Value) {
    post_raw(router, &body.to_string()).await
}

// ---- envelope validation ---------------------------------------------------

#[tokio::test]
async fn invalid_json_maps_to_parse_error() {
    let (router, _) = echo_router();
    let (status, body) = post_raw(&router, "{not json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn non_object_payload_is_invalid_request() {
    let (router, _) = echo_router();
    let (status, body) = post_raw(&router, "[1, 2, 3]").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn missing_id_is_invalid_request_with_null_id() {
    let (router, _) = echo_router();
    let (status, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "tasks/get", "params": {"id": "t1"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn ill_typed_id_is_invalid_request() {
    let (router, _) = echo_router();
    let (_, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "tasks/get", "params": {}, "id": {"k": 1}}),
    )
    .await;
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn wrong_jsonrpc_version_is_invalid_request() {
    let (router, _) = echo_router();
    let (_, body) = post_rpc(
        &router,
        json!({"jsonrpc": "1.0", "method": "tasks/get", "params": {}, "id": "r1"}),
    )
    .await;
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], "r1");
}

#[tokio::test]
async fn missing_method_is_invalid_request() {
    let (router, _) = echo_router();
    let (_, body) = post_rpc(&router, json!({"jsonrpc": "2.0", "params": {}, "id": "r1"})).await;
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let (router, _) = echo_router();
    let (status, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "tasks/unknown", "params": {}, "id": "r1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["id"], "r1");
}

#[tokio::test]
async fn integer_request_id_round_trips() {
    let (router, _) = echo_router();
    let (_, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "tasks/unknown", "params": {}, "id": 42}),
    )
    .await;
    assert_eq!(body["id"], 42);
}

// ---- core methods ----------------------------------------------------------

#[tokio::test]
async fn send_returns_task_id_retrievable_by_get() {
    let (router, _) = echo_router();

    let (status, body) = post_rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tasks/send",
            "params": {"message": {"role": "user", "parts": [{"type": "text", "content": "hi"}]}},
            "id": "r1"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["id"], "r1");
    let task_id = body["result"]["id"].as_str().unwrap().to_string();
    assert!(!task_id.is_empty());

    let (status, body) = post_rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tasks/get",
            "params": {"id": task_id},
            "id": "r2"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let task = &body["result"];
    assert_eq!(task["id"], task_id);
    // The user message appears in the history with its parts intact.
    let messages = task["messages"].as_array().unwrap();
    assert!(messages.iter().any(|m| {
        m["role"] == "user" && m["parts"][0] == json!({"type": "text", "content": "hi"})
    }));
}

#[tokio::test]
async fn send_with_missing_message_is_invalid_params() {
    let (router, _) = echo_router();
    let (status, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "tasks/send", "params": {}, "id": "r1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn get_unknown_task_is_domain_error() {
    let (router, _) = echo_router();
    let (status, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "tasks/get", "params": {"id": "missing"}, "id": "r1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32000);
}

#[tokio::test]
async fn domain_error_from_handler_maps_to_app_error() {
    let store = Arc::new(InMemoryTaskStore::new());
    let router =
        A2aRouterBuilder::new(Arc::new(FailingAgent), store as Arc<dyn TaskStore>).build();

    let (status, body) = post_rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tasks/send",
            "params": {"message": {"role": "user", "parts": [{"type": "text", "content": "hi"}]}},
            "id": "r1"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32000);
    assert_eq!(body["error"]["message"], "Agent processing error: quota exceeded");
    assert_eq!(body["id"], "r1");
}

#[tokio::test]
async fn handler_failure_on_existing_task_marks_it_failed() {
    // A send to an existing task whose handler raises must leave the task
    // in FAILED, not dangling in a non-terminal state.
    let store = Arc::new(InMemoryTaskStore::new());
    store.create_task("t1").await.unwrap();
    store
        .update_task_state("t1", agentvault::types::TaskState::Working, None)
        .await
        .unwrap();

    let router = A2aRouterBuilder::new(
        Arc::new(FailingAgent),
        Arc::clone(&store) as Arc<dyn TaskStore>,
    )
    .build();

    let (_, body) = post_rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tasks/send",
            "params": {
                "id": "t1",
                "message": {"role": "user", "parts": [{"type": "text", "content": "hi"}]}
            },
            "id": "r1"
        }),
    )
    .await;
    assert_eq!(body["error"]["code"], -32000);

    let context = store.get_task("t1").await.unwrap().unwrap();
    assert_eq!(context.state, agentvault::types::TaskState::Failed);
}

#[tokio::test]
async fn cancel_reports_success_flag() {
    let (router, store) = echo_router();
    store.create_task("t1").await.unwrap();

    let (status, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "tasks/cancel", "params": {"id": "t1"}, "id": "r1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["success"], true);

    let context = store.get_task("t1").await.unwrap().unwrap();
    assert_eq!(context.state, agentvault::types::TaskState::Canceled);
}

// ---- custom handlers -------------------------------------------------------

#[derive(serde::Deserialize)]
struct DeleteParams {
    id: String,
}

#[derive(serde::Serialize)]
struct DeleteResult {
    deleted: bool,
}

fn router_with_custom_methods() -> (Router, Arc<InMemoryTaskStore>) {
    let store = Arc::new(InMemoryTaskStore::new());
    let agent = Arc::new(EchoAgent::new(Arc::clone(&store)));
    let router = A2aRouterBuilder::new(agent, Arc::clone(&store) as Arc<dyn TaskStore>)
        .method("admin/deleteTask", |params: DeleteParams, store| async move {
            let deleted = store.delete_task(&params.id).await?;
            Ok(DeleteResult { deleted })
        })
        .method("admin/boom", |_params: Value, _store| async move {
            Err::<DeleteResult, _>(AgentVaultError::Internal("exploded".to_string()))
        })
        .build();
    (router, store)
}

#[tokio::test]
async fn custom_method_receives_store_and_typed_params() {
    let (router, store) = router_with_custom_methods();
    store.create_task("t1").await.unwrap();

    let (status, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "admin/deleteTask", "params": {"id": "t1"}, "id": "r1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["deleted"], true);
    assert!(store.get_task("t1").await.unwrap().is_none());
}

#[tokio::test]
async fn custom_method_bad_params_is_invalid_params() {
    let (router, _) = router_with_custom_methods();
    let (_, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "admin/deleteTask", "params": {"id": 7}, "id": "r1"}),
    )
    .await;
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn internal_error_is_served_with_http_500() {
    let (router, _) = router_with_custom_methods();
    let (status, body) = post_rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "admin/boom", "params": {}, "id": "r1"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], -32603);
}

// ---- agent card endpoint ---------------------------------------------------

#[tokio::test]
async fn agent_card_served_when_configured() {
    let store = Arc::new(InMemoryTaskStore::new());
    let agent = Arc::new(EchoAgent::new(Arc::clone(&store)));
    let card = AgentCardBuilder::new("Echo", "test-org/echo", "http://localhost:8000/")
        .description("echoes")
        .build()
        .unwrap();
    let router = A2aRouterBuilder::new(agent, store as Arc<dyn TaskStore>)
        .agent_card(card)
        .build();

    let request = Request::builder()
        .method("GET")
        .uri("/agent-card.json")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let card: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(card["humanReadableId"], "test-org/echo");
}
