//! High-level client session for talking to A2A agents.
//!
//! [`AgentVaultClient`] owns (or borrows) an HTTP connection pool, resolves
//! authentication per agent card, and exposes the task operations:
//! initiate, send, get, cancel, and the SSE subscription stream.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::card::{AgentCard, AuthScheme};
use crate::error::{AgentVaultError, Result};
use crate::keys::KeyManager;
use crate::types::{
    JsonRpcId, JsonRpcRequest, JsonRpcResponse, Message, Task, TaskCancelParams, TaskCancelResult,
    TaskGetParams, TaskSendParams, TaskSendResult,
};
use crate::utils::message::with_mcp_context;

use super::auth::{resolve_auth, ResolvedAuth, TokenCache};
use super::sse::A2AEventStream;

/// Tuning knobs for a client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for non-streaming requests. Default 30 s.
    pub timeout: Duration,
    /// Per-read idle timeout on SSE streams. Default 60 s.
    pub sse_idle_timeout: Duration,
    /// Auth scheme to prefer when the card advertises several.
    pub preferred_auth_scheme: Option<AuthScheme>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            sse_idle_timeout: Duration::from_secs(60),
            preferred_auth_scheme: None,
        }
    }
}

/// Options for [`AgentVaultClient::initiate_task`].
#[derive(Debug, Clone, Default)]
pub struct InitiateOptions {
    /// MCP context to merge into the message metadata under `mcp_context`.
    pub mcp_context: Option<serde_json::Value>,
    /// Webhook for push notifications; sent only when the card advertises
    /// `supportsPushNotifications`.
    pub webhook_url: Option<String>,
}

/// A reusable client for A2A operations against any number of agents.
///
/// Holds the HTTP client (injected or owned), and per-agent OAuth token
/// caches. Safe to share across tasks; all methods take `&self`.
///
/// # Example
///
/// ```no_run
/// use agentvault::client::AgentVaultClient;
/// use agentvault::keys::{KeyManager, KeyManagerConfig};
/// use agentvault::types::Role;
/// use agentvault::utils::new_text_message;
///
/// # async fn example(card: agentvault::card::AgentCard) -> agentvault::error::Result<()> {
/// let client = AgentVaultClient::new();
/// let keys = KeyManager::new(KeyManagerConfig::default());
///
/// let task_id = client
///     .initiate_task(&card, &keys, new_text_message(Role::User, "hi"), Default::default())
///     .await?;
///
/// let mut events = client.receive_messages(&card, &keys, &task_id).await?;
/// while let Some(event) = events.next().await {
///     println!("{:?}", event?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct AgentVaultClient {
    http: reqwest::Client,
    config: ClientConfig,
    token_cache: TokenCache,
}

impl Default for AgentVaultClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentVaultClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AgentVaultClient {
    /// Create a client with an internally-owned HTTP pool and defaults.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with custom configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token_cache: TokenCache::new(),
        }
    }

    /// Create a client over an existing `reqwest::Client` (shared pool,
    /// custom TLS, or a test transport).
    pub fn with_http_client(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            http,
            config,
            token_cache: TokenCache::new(),
        }
    }

    // ---- operations --------------------------------------------------------

    /// Start a new task (`tasks/send` without an `id`). Returns the
    /// agent-assigned task ID.
    pub async fn initiate_task(
        &self,
        card: &AgentCard,
        key_manager: &KeyManager,
        message: Message,
        options: InitiateOptions,
    ) -> Result<String> {
        info!(agent = %card.human_readable_id, "initiating task");

        let message = match options.mcp_context {
            Some(context) => with_mcp_context(&message, context),
            None => message,
        };

        let webhook_url = match options.webhook_url {
            Some(url) => {
                if card
                    .capabilities
                    .supports_push_notifications
                    .unwrap_or(false)
                {
                    Some(url)
                } else {
                    warn!(
                        agent = %card.human_readable_id,
                        "webhook requested but agent does not support push notifications, omitting"
                    );
                    None
                }
            }
            None => None,
        };

        let params = TaskSendParams {
            id: None,
            message,
            webhook_url,
        };
        let result = self
            .send_rpc(card, key_manager, "tasks/send", json!(params), "init")
            .await?;

        let result: TaskSendResult = serde_json::from_value(result)
            .map_err(|e| AgentVaultError::Message(format!("invalid tasks/send result: {e}")))?;
        if result.id.is_empty() {
            return Err(AgentVaultError::Message(
                "tasks/send result has an empty task id".to_string(),
            ));
        }

        info!(agent = %card.human_readable_id, task_id = %result.id, "task initiated");
        Ok(result.id)
    }

    /// Send a follow-up message to an existing task (`tasks/send` with an
    /// `id`).
    pub async fn send_message(
        &self,
        card: &AgentCard,
        key_manager: &KeyManager,
        task_id: &str,
        message: Message,
        mcp_context: Option<serde_json::Value>,
    ) -> Result<()> {
        info!(agent = %card.human_readable_id, task_id = %task_id, "sending message");

        let message = match mcp_context {
            Some(context) => with_mcp_context(&message, context),
            None => message,
        };
        let params = TaskSendParams {
            id: Some(task_id.to_string()),
            message,
            webhook_url: None,
        };

        let result = self
            .send_rpc(card, key_manager, "tasks/send", json!(params), "send")
            .await?;
        let result: TaskSendResult = serde_json::from_value(result)
            .map_err(|e| AgentVaultError::Message(format!("invalid tasks/send result: {e}")))?;
        if result.id != task_id {
            warn!(
                expected = %task_id,
                got = %result.id,
                "tasks/send acknowledged a different task id"
            );
        }
        Ok(())
    }

    /// Fetch the current state, history, and artifacts of a task
    /// (`tasks/get`).
    pub async fn get_task_status(
        &self,
        card: &AgentCard,
        key_manager: &KeyManager,
        task_id: &str,
    ) -> Result<Task> {
        debug!(agent = %card.human_readable_id, task_id = %task_id, "getting task status");
        let params = TaskGetParams {
            id: task_id.to_string(),
        };
        let result = self
            .send_rpc(card, key_manager, "tasks/get", json!(params), "get")
            .await?;
        serde_json::from_value(result)
            .map_err(|e| AgentVaultError::Message(format!("invalid tasks/get result: {e}")))
    }

    /// Request cancellation of a task (`tasks/cancel`). Returns the agent's
    /// `success` flag — acknowledgement, not a guarantee of immediate stop.
    pub async fn terminate_task(
        &self,
        card: &AgentCard,
        key_manager: &KeyManager,
        task_id: &str,
    ) -> Result<bool> {
        info!(agent = %card.human_readable_id, task_id = %task_id, "requesting task termination");
        let params = TaskCancelParams {
            id: task_id.to_string(),
        };
        let result = self
            .send_rpc(card, key_manager, "tasks/cancel", json!(params), "cancel")
            .await?;
        let result: TaskCancelResult = serde_json::from_value(result)
            .map_err(|e| AgentVaultError::Message(format!("invalid tasks/cancel result: {e}")))?;
        Ok(result.success)
    }

    /// Subscribe to a task's event stream (`tasks/sendSubscribe`).
    ///
    /// The returned stream is lazy and cancellable: events arrive as the
    /// agent emits them, the stream ends on a terminal status or
    /// server-sent `error` frame, and dropping it closes the connection.
    pub async fn receive_messages(
        &self,
        card: &AgentCard,
        key_manager: &KeyManager,
        task_id: &str,
    ) -> Result<A2AEventStream> {
        info!(agent = %card.human_readable_id, task_id = %task_id, "subscribing to task events");

        let request_id = format!("req-sub-{}", Uuid::new_v4());
        let envelope = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "tasks/sendSubscribe".to_string(),
            params: json!({"id": task_id}),
            id: Some(JsonRpcId::String(request_id)),
        };

        let response = self
            .post_with_auth(card, key_manager, &envelope, true)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.error_from_failed_response(status.as_u16(), body));
        }

        Ok(A2AEventStream::from_response(
            response,
            self.config.sse_idle_timeout,
        ))
    }

    // ---- plumbing ----------------------------------------------------------

    /// POST a JSON-RPC envelope with auth headers, retrying once after a
    /// token invalidation when an OAuth-authenticated request gets a 401.
    async fn post_with_auth(
        &self,
        card: &AgentCard,
        key_manager: &KeyManager,
        envelope: &JsonRpcRequest,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let auth = self.resolve(card, key_manager).await?;
        let response = self.post_once(card, envelope, &auth, stream).await?;

        if response.status().as_u16() == 401 {
            if let Some((service_id, token_url)) = &auth.oauth_identity {
                // The cached token may have been revoked; refresh and retry
                // exactly once.
                warn!(agent = %card.human_readable_id, "agent returned 401, refreshing OAuth token");
                self.token_cache.invalidate(service_id, token_url).await;
                let auth = self.resolve(card, key_manager).await?;
                return self.post_once(card, envelope, &auth, stream).await;
            }
        }

        Ok(response)
    }

    async fn resolve(&self, card: &AgentCard, key_manager: &KeyManager) -> Result<ResolvedAuth> {
        resolve_auth(
            &self.http,
            card,
            key_manager,
            &self.token_cache,
            self.config.preferred_auth_scheme,
        )
        .await
    }

    async fn post_once(
        &self,
        card: &AgentCard,
        envelope: &JsonRpcRequest,
        auth: &ResolvedAuth,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .post(&card.url)
            .headers(auth.headers.clone())
            .header("Content-Type", "application/json")
            .json(envelope);

        if stream {
            request = request.header("Accept", "text/event-stream");
        } else {
            request = request.timeout(self.config.timeout);
        }

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentVaultError::Timeout(format!(
                    "request to agent '{}' timed out: {e}",
                    card.human_readable_id
                ))
            } else {
                AgentVaultError::Connection(format!(
                    "request to agent '{}' failed: {e}",
                    card.human_readable_id
                ))
            }
        })
    }

    /// POST a JSON-RPC request and extract the `result` payload.
    async fn send_rpc(
        &self,
        card: &AgentCard,
        key_manager: &KeyManager,
        method: &str,
        params: serde_json::Value,
        op: &str,
    ) -> Result<serde_json::Value> {
        let request_id = format!("req-{op}-{}", Uuid::new_v4());
        let envelope = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Some(JsonRpcId::String(request_id.clone())),
        };
        debug!(method = %method, request_id = %request_id, "sending JSON-RPC request");

        let response = self
            .post_with_auth(card, key_manager, &envelope, false)
            .await?;

        let status = response.status().as_u16();
        if status == 401 {
            return Err(AgentVaultError::Authentication(format!(
                "agent '{}' rejected the provided credentials (HTTP 401)",
                card.human_readable_id
            )));
        }
        let body = response.bytes().await.map_err(|e| {
            AgentVaultError::Connection(format!("error reading response body: {e}"))
        })?;

        // JSON-RPC errors arrive with HTTP 200 (or 500 for -32603), always
        // with an envelope; parse the body before judging the HTTP status.
        match serde_json::from_slice::<JsonRpcResponse>(&body) {
            Ok(parsed) => {
                if let Some(error) = parsed.error {
                    return Err(AgentVaultError::RemoteAgent {
                        code: error.code,
                        message: error.message,
                        data: error.data,
                    });
                }
                parsed.result.ok_or_else(|| {
                    AgentVaultError::Message(
                        "JSON-RPC response has neither 'result' nor 'error'".to_string(),
                    )
                })
            }
            Err(parse_err) => {
                let text = String::from_utf8_lossy(&body).into_owned();
                Err(self.error_from_unparseable(status, text, parse_err))
            }
        }
    }

    fn error_from_failed_response(&self, status: u16, body: String) -> AgentVaultError {
        if status == 401 {
            return AgentVaultError::Authentication(
                "agent rejected the provided credentials (HTTP 401)".to_string(),
            );
        }
        if let Ok(parsed) = serde_json::from_str::<JsonRpcResponse>(&body) {
            if let Some(error) = parsed.error {
                return AgentVaultError::RemoteAgent {
                    code: error.code,
                    message: error.message,
                    data: error.data,
                };
            }
        }
        AgentVaultError::Connection(format!("agent returned HTTP {status}: {body}"))
    }

    fn error_from_unparseable(
        &self,
        status: u16,
        body: String,
        parse_err: serde_json::Error,
    ) -> AgentVaultError {
        if (200..300).contains(&status) {
            AgentVaultError::Message(format!("failed to parse JSON-RPC response: {parse_err}"))
        } else {
            AgentVaultError::Connection(format!("agent returned HTTP {status}: {body}"))
        }
    }
}
