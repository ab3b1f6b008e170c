//! Axum integration — the HTTP face of an A2A agent.
//!
//! [`A2aRouterBuilder`] assembles an `axum::Router` exposing:
//! - `POST /` — JSON-RPC 2.0 dispatch for the core methods plus any
//!   registered custom methods, including `tasks/sendSubscribe` streaming;
//! - `GET /agent-card.json` — the agent's card, when one is configured.
//!
//! Every JSON-RPC failure is answered with HTTP 200 and an error envelope,
//! except internal errors (`-32603`) which are served with HTTP 500.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, warn};

use crate::card::AgentCard;
use crate::error::{self, AgentVaultError};
use crate::types::{
    JsonRpcId, JsonRpcResponse, TaskCancelParams, TaskCancelResult, TaskGetParams, TaskSendParams,
    TaskSendResult, TaskState,
};

use super::agent::{A2aAgent, EventStream};
use super::handlers::{classify_handler_error, DispatchError, HandlerRegistry};
use super::state::TaskStore;

/// Shared state behind the axum routes.
struct AppState {
    agent: Arc<dyn A2aAgent>,
    store: Arc<dyn TaskStore>,
    registry: HandlerRegistry,
    agent_card: Option<AgentCard>,
}

/// Builder assembling the A2A router: agent, store, optional card, custom
/// method handlers.
///
/// # Example
///
/// ```rust,ignore
/// let app = A2aRouterBuilder::new(agent, store)
///     .agent_card(card)
///     .method("custom/echo", |params: EchoParams, _store| async move {
///         Ok(EchoResult { text: params.text })
///     })
///     .build();
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
/// axum::serve(listener, app).await?;
/// ```
pub struct A2aRouterBuilder {
    agent: Arc<dyn A2aAgent>,
    store: Arc<dyn TaskStore>,
    registry: HandlerRegistry,
    agent_card: Option<AgentCard>,
    cors: bool,
}

impl A2aRouterBuilder {
    /// Start a builder from the agent and its task store.
    pub fn new(agent: Arc<dyn A2aAgent>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            agent,
            store,
            registry: HandlerRegistry::new(),
            agent_card: None,
            cors: false,
        }
    }

    /// Serve this card at `GET /agent-card.json`.
    pub fn agent_card(mut self, card: AgentCard) -> Self {
        self.agent_card = Some(card);
        self
    }

    /// Register a custom JSON-RPC method (see
    /// [`HandlerRegistry::register`]).
    pub fn method<P, R, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        P: serde::de::DeserializeOwned + Send + 'static,
        R: serde::Serialize + Send + 'static,
        F: Fn(P, Arc<dyn TaskStore>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = crate::error::Result<R>> + Send + 'static,
    {
        self.registry.register(name, handler);
        self
    }

    /// Allow cross-origin requests (permissive CORS), for agents serving
    /// browser-based clients.
    pub fn with_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    /// Assemble the router.
    pub fn build(self) -> Router {
        let state = Arc::new(AppState {
            agent: self.agent,
            store: self.store,
            registry: self.registry,
            agent_card: self.agent_card,
        });

        let mut router = Router::new()
            .route("/", post(handle_jsonrpc))
            .route("/agent-card.json", get(handle_agent_card))
            .with_state(state);

        if self.cors {
            router = router.layer(CorsLayer::permissive());
        }
        router
    }
}

/// Convenience: a router with no card and no custom methods.
pub fn a2a_router(agent: Arc<dyn A2aAgent>, store: Arc<dyn TaskStore>) -> Router {
    A2aRouterBuilder::new(agent, store).build()
}

/// Serve the configured agent card.
async fn handle_agent_card(State(state): State<Arc<AppState>>) -> Response {
    match &state.agent_card {
        Some(card) => Json(card).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serialise a JSON-RPC response with the given HTTP status.
fn rpc_response(status: StatusCode, response: JsonRpcResponse) -> Response {
    (status, Json(response)).into_response()
}

fn rpc_error(id: Option<JsonRpcId>, code: i64, message: impl Into<String>) -> Response {
    let status = if code == error::INTERNAL_ERROR {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    rpc_response(status, JsonRpcResponse::error(id, code, message))
}

fn dispatch_failure(id: Option<JsonRpcId>, err: DispatchError) -> Response {
    let status = if err.is_internal() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    rpc_response(status, JsonRpcResponse::error(id, err.code(), err.message()))
}

/// Main JSON-RPC dispatch: parse the envelope, validate it, route the
/// method, serialise the outcome.
///
/// The body is taken raw so malformed JSON can be answered with a proper
/// `-32700` envelope instead of a framework rejection.
async fn handle_jsonrpc(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "failed to parse request body as JSON");
            return rpc_error(None, error::PARSE_ERROR, "Parse error");
        }
    };

    let Some(object) = payload.as_object() else {
        return rpc_error(
            None,
            error::INVALID_REQUEST,
            "Invalid Request: payload must be a JSON object",
        );
    };

    // The response `id` mirrors the request's, when one can be extracted.
    let id = match object.get("id") {
        None => {
            return rpc_error(
                None,
                error::INVALID_REQUEST,
                "Invalid Request: 'id' is missing",
            );
        }
        Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<JsonRpcId>(value.clone()) {
            Ok(id) => Some(id),
            Err(_) => {
                return rpc_error(
                    None,
                    error::INVALID_REQUEST,
                    "Invalid Request: 'id' must be a string or integer",
                );
            }
        },
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return rpc_error(
            id,
            error::INVALID_REQUEST,
            "Invalid Request: 'jsonrpc' must be '2.0'",
        );
    }

    let method = match object.get("method").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => {
            return rpc_error(
                id,
                error::INVALID_REQUEST,
                "Invalid Request: 'method' is required and must be a non-empty string",
            );
        }
    };

    let params = object.get("params").cloned().unwrap_or(Value::Null);
    debug!(method = %method, "received JSON-RPC request");

    // Core method names are reserved; the registry only serves the rest.
    match method.as_str() {
        "tasks/send" => handle_task_send(state, id, params).await,
        "tasks/get" => handle_task_get(state, id, params).await,
        "tasks/cancel" => handle_task_cancel(state, id, params).await,
        "tasks/sendSubscribe" => handle_send_subscribe(state, id, params).await,
        other => match state.registry.get(other) {
            Some(handler) => {
                match handler.call(params, Arc::clone(&state.store)).await {
                    Ok(result) => rpc_response(StatusCode::OK, JsonRpcResponse::success(id, result)),
                    Err(err) => dispatch_failure(id, err),
                }
            }
            None => {
                warn!(method = %other, "unknown JSON-RPC method");
                rpc_error(id, error::METHOD_NOT_FOUND, "Method not found")
            }
        },
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, DispatchError> {
    serde_json::from_value(params).map_err(|e| DispatchError::InvalidParams(e.to_string()))
}

async fn handle_task_send(state: Arc<AppState>, id: Option<JsonRpcId>, params: Value) -> Response {
    let params: TaskSendParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return dispatch_failure(id, e),
    };

    let existing_id = params.id.clone();
    match state
        .agent
        .handle_task_send(params.id, params.message)
        .await
    {
        Ok(task_id) => match serde_json::to_value(TaskSendResult { id: task_id }) {
            Ok(result) => rpc_response(StatusCode::OK, JsonRpcResponse::success(id, result)),
            Err(e) => dispatch_failure(id, DispatchError::Internal(e.to_string())),
        },
        Err(e) => {
            // The handler failed mid-processing: an existing task must not
            // be left dangling in a non-terminal state.
            if let Some(task_id) = existing_id {
                fail_task_best_effort(&state, &task_id, &e).await;
            }
            error!(error = %e, "tasks/send handler failed");
            dispatch_failure(id, classify_handler_error(e))
        }
    }
}

/// Move a task to FAILED after its handler raised, carrying the error
/// string as the status message. Invalid transitions (task already
/// terminal) are ignored.
async fn fail_task_best_effort(state: &AppState, task_id: &str, err: &AgentVaultError) {
    match state
        .store
        .update_task_state(task_id, TaskState::Failed, Some(err.to_string()))
        .await
    {
        Ok(_) => debug!(task_id = %task_id, "marked task FAILED after handler error"),
        Err(update_err) => {
            debug!(task_id = %task_id, error = %update_err, "could not mark task FAILED")
        }
    }
}

async fn handle_task_get(state: Arc<AppState>, id: Option<JsonRpcId>, params: Value) -> Response {
    let params: TaskGetParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return dispatch_failure(id, e),
    };

    match state.agent.handle_task_get(&params.id).await {
        Ok(task) => match serde_json::to_value(&task) {
            Ok(value) => rpc_response(StatusCode::OK, JsonRpcResponse::success(id, value)),
            Err(e) => {
                error!(error = %e, "failed to serialize task");
                dispatch_failure(id, DispatchError::Internal(e.to_string()))
            }
        },
        Err(e) => dispatch_failure(id, classify_handler_error(e)),
    }
}

async fn handle_task_cancel(
    state: Arc<AppState>,
    id: Option<JsonRpcId>,
    params: Value,
) -> Response {
    let params: TaskCancelParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return dispatch_failure(id, e),
    };

    match state.agent.handle_task_cancel(&params.id).await {
        Ok(success) => match serde_json::to_value(TaskCancelResult {
            success,
            message: None,
        }) {
            Ok(result) => rpc_response(StatusCode::OK, JsonRpcResponse::success(id, result)),
            Err(e) => dispatch_failure(id, DispatchError::Internal(e.to_string())),
        },
        Err(e) => dispatch_failure(id, classify_handler_error(e)),
    }
}

async fn handle_send_subscribe(
    state: Arc<AppState>,
    id: Option<JsonRpcId>,
    params: Value,
) -> Response {
    let params: TaskGetParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return dispatch_failure(id, e),
    };

    match state.agent.handle_subscribe_request(&params.id).await {
        Ok(events) => sse_response(events),
        Err(e) => dispatch_failure(id, classify_handler_error(e)),
    }
}

/// Format an agent's event stream as an SSE response.
///
/// Frames are `event: <type>\ndata: <json>\n\n` with types `task_status`,
/// `task_message`, and `task_artifact`. A failure of the source stream is
/// reported as a final `error` frame; a terminal status update ends the
/// stream. Keepalive comments are sent while the task is quiescent.
fn sse_response(mut events: EventStream) -> Response {
    let stream = async_stream::stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            yield Ok::<_, Infallible>(
                                Event::default().event(event.event_type()).data(json),
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "failed to serialize SSE event");
                            let data = serde_json::json!({
                                "error": "serialization_error",
                                "message": format!("failed to format event: {e}"),
                            });
                            yield Ok(Event::default().event("error").data(data.to_string()));
                        }
                    }
                    if terminal {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "error in source event stream");
                    let data = serde_json::json!({
                        "error": "stream_error",
                        "message": format!("error generating events: {e}"),
                    });
                    yield Ok(Event::default().event("error").data(data.to_string()));
                    break;
                }
            }
        }
        debug!("SSE event stream finished");
    };

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}
