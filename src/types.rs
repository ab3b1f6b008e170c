//! A2A protocol wire types.
//!
//! Everything that crosses the wire lives here: the task state machine's
//! states, message parts, artifacts, the SSE event payloads, and the JSON-RPC
//! envelope shared by the client and server halves.
//!
//! Wire form is camelCase JSON (`taskId`, `createdAt`); task states serialize
//! as SCREAMING_SNAKE_CASE strings (`"INPUT_REQUIRED"`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Enums
// ============================================================================

/// The lifecycle state of a task.
///
/// Transitions between states are validated by the server task store; see
/// [`crate::server::state`] for the transition table. The terminal states
/// are `COMPLETED`, `FAILED`, and `CANCELED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Task received by the agent, awaiting execution.
    Submitted,
    /// Task is actively being processed.
    Working,
    /// Task is paused, awaiting further input from the client.
    InputRequired,
    /// Task finished successfully.
    Completed,
    /// Task terminated due to an error during execution.
    Failed,
    /// Task was canceled before completion.
    Canceled,
}

impl TaskState {
    /// Whether this state is absorbing: no transitions out of it are valid
    /// except self-transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Submitted => "SUBMITTED",
            TaskState::Working => "WORKING",
            TaskState::InputRequired => "INPUT_REQUIRED",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
            TaskState::Canceled => "CANCELED",
        };
        write!(f, "{s}")
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user / client.
    User,
    /// Message from the agent.
    Assistant,
    /// Instruction-level message.
    System,
    /// Output of a tool invocation.
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

// ============================================================================
// Message & Parts
// ============================================================================

/// A content part within a message.
///
/// Discriminated by the `type` field:
/// - Text: `{"type": "text", "content": "hello"}`
/// - File: `{"type": "file", "url": "https://...", "mediaType": "image/png", "filename": "x.png"}`
/// - Data: `{"type": "data", "content": {"k": "v"}, "mediaType": "application/json"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Part {
    /// Plain UTF-8 text. Discriminator: `"text"`.
    #[serde(rename = "text")]
    Text {
        /// The text content.
        content: String,
    },
    /// A reference to a file by URL. Discriminator: `"file"`.
    #[serde(rename = "file")]
    File {
        /// URL pointing to the file content.
        url: String,
        /// MIME type of the file, if known.
        #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
        /// Original filename, if known.
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    /// Structured JSON data. Discriminator: `"data"`.
    #[serde(rename = "data")]
    Data {
        /// The structured data content (a JSON object).
        content: serde_json::Value,
        /// MIME type of the data; `application/json` unless overridden.
        #[serde(rename = "mediaType", default = "default_data_media_type")]
        media_type: String,
    },
}

fn default_data_media_type() -> String {
    "application/json".to_string()
}

impl Part {
    /// Construct a text part.
    pub fn text(content: impl Into<String>) -> Self {
        Part::Text {
            content: content.into(),
        }
    }

    /// Construct a file part from a URL.
    pub fn file(url: impl Into<String>) -> Self {
        Part::File {
            url: url.into(),
            media_type: None,
            filename: None,
        }
    }

    /// Construct a data part with the default `application/json` media type.
    pub fn data(content: serde_json::Value) -> Self {
        Part::Data {
            content,
            media_type: default_data_media_type(),
        }
    }

    /// The text content, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { content } => Some(content),
            _ => None,
        }
    }
}

/// A single message in a task conversation.
///
/// Messages are semantically immutable: helpers that "modify" a message (for
/// example [`crate::utils::message::with_mcp_context`]) construct a fresh one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message.
    pub role: Role,

    /// Content parts; the protocol requires at least one.
    pub parts: Vec<Part>,

    /// Optional metadata (timestamps, tool call info, MCP context under
    /// the `mcp_context` key).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    /// Create a message from a role and parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            metadata: None,
        }
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// An output produced by a task.
///
/// Exactly one of `content` (inline) or `url` (external) is expected to be
/// set; the `id` is unique within the owning task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Identifier unique within the task.
    pub id: String,

    /// Type tag: `"file"`, `"log"`, `"intermediate_result"`, etc.
    #[serde(rename = "type")]
    pub kind: String,

    /// Inline content, if small/simple.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,

    /// URL to the content, if large/external.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// MIME type of the content.
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Additional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// Task
// ============================================================================

/// The state and history of a task as returned by `tasks/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Agent-assigned, opaque task identifier.
    pub id: String,

    /// Current execution state.
    pub state: TaskState,

    /// When the task was created.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// When the task was last updated.
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,

    /// Chronological message history.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Artifacts associated with the task.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    /// Optional task-level metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// SSE event payloads
// ============================================================================

/// Payload of a `task_status` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusUpdateEvent {
    /// The task whose state changed.
    #[serde(rename = "taskId")]
    pub task_id: String,

    /// The new state.
    pub state: TaskState,

    /// When the state changed.
    pub timestamp: DateTime<Utc>,

    /// Optional human-readable note (e.g. failure detail).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of a `task_message` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessageEvent {
    /// The task the message belongs to.
    #[serde(rename = "taskId")]
    pub task_id: String,

    /// The message appended to the conversation.
    pub message: Message,

    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
}

/// Payload of a `task_artifact` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskArtifactUpdateEvent {
    /// The task that produced the artifact.
    #[serde(rename = "taskId")]
    pub task_id: String,

    /// The artifact added or revised.
    pub artifact: Artifact,

    /// When the artifact changed.
    pub timestamp: DateTime<Utc>,
}

/// Any event delivered on a task's SSE stream.
///
/// The variant is carried out-of-band by the SSE `event:` field
/// (`task_status` / `task_message` / `task_artifact`), so the payload itself
/// has no discriminator; deserialization is untagged and relies on the
/// variants' disjoint required fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum A2AEvent {
    /// A state change.
    StatusUpdate(TaskStatusUpdateEvent),
    /// An artifact added or revised.
    ArtifactUpdate(TaskArtifactUpdateEvent),
    /// A new conversation message.
    Message(TaskMessageEvent),
}

impl A2AEvent {
    /// The SSE `event:` field value for this variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            A2AEvent::StatusUpdate(_) => "task_status",
            A2AEvent::Message(_) => "task_message",
            A2AEvent::ArtifactUpdate(_) => "task_artifact",
        }
    }

    /// The task this event belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            A2AEvent::StatusUpdate(e) => &e.task_id,
            A2AEvent::Message(e) => &e.task_id,
            A2AEvent::ArtifactUpdate(e) => &e.task_id,
        }
    }

    /// Whether this event carries a terminal status, ending the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, A2AEvent::StatusUpdate(e) if e.state.is_terminal())
    }
}

// ============================================================================
// JSON-RPC envelope
// ============================================================================

/// A JSON-RPC request ID — string or integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    /// String ID.
    String(String),
    /// Integer ID.
    Number(i64),
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonRpcId::String(s) => write!(f, "{s}"),
            JsonRpcId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A JSON-RPC 2.0 request envelope. One request per POST; no batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,

    /// Method name, e.g. `tasks/send`.
    pub method: String,

    /// Method parameters (an object for all core methods).
    #[serde(default)]
    pub params: serde_json::Value,

    /// Client-chosen request ID. Required by this protocol; absent only in
    /// malformed requests (which the server rejects with -32600).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,

    /// Success payload. Mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error payload. Mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Mirrors the request ID; `null` when the request could not be parsed
    /// far enough to extract one.
    pub id: Option<JsonRpcId>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: Option<JsonRpcId>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Build an error response.
    pub fn error(id: Option<JsonRpcId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (see [`crate::error`] constants).
    pub code: i64,

    /// Human-readable error message.
    pub message: String,

    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ============================================================================
// Method params & results
// ============================================================================

/// Parameters of `tasks/send`: no `id` initiates, an `id` appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSendParams {
    /// Existing task ID, absent when initiating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The message to deliver to the agent.
    pub message: Message,

    /// Webhook URL for push notifications, honoured when the agent card
    /// advertises `supportsPushNotifications`.
    #[serde(rename = "webhookUrl", skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Result of `tasks/send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSendResult {
    /// The task ID (newly assigned or the existing one).
    pub id: String,
}

/// Parameters of `tasks/get` and `tasks/sendSubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGetParams {
    /// The task to query or subscribe to.
    pub id: String,
}

/// Parameters of `tasks/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCancelParams {
    /// The task to cancel.
    pub id: String,
}

/// Result of `tasks/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCancelResult {
    /// Whether the cancellation request was accepted.
    pub success: bool,

    /// Optional note on the cancellation outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
