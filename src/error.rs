//! AgentVault error taxonomy — JSON-RPC error codes + typed failure kinds.
//!
//! Every failure in the crate maps to exactly one [`AgentVaultError`] variant:
//! agent-card resolution errors, credential-store errors, client transport
//! errors, and the server-side dispatch errors that become JSON-RPC error
//! envelopes.

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 error codes
// ---------------------------------------------------------------------------

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;

/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;

/// Internal JSON-RPC error. The only code served with HTTP 500.
pub const INTERNAL_ERROR: i64 = -32603;

/// Generic application error raised by an agent handler.
pub const APP_ERROR: i64 = -32000;

// ---------------------------------------------------------------------------
// AgentVaultError
// ---------------------------------------------------------------------------

/// Unified error type for all AgentVault operations.
///
/// Variants follow the protocol's failure taxonomy: callers can match on the
/// kind to decide whether a failure is a configuration problem
/// ([`Authentication`](Self::Authentication)), a transport problem
/// ([`Connection`](Self::Connection) / [`Timeout`](Self::Timeout)), or an
/// error reported by the remote agent itself
/// ([`RemoteAgent`](Self::RemoteAgent)).
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentVaultError {
    /// Agent Card JSON did not match the schema or violated an invariant.
    #[error("agent card validation failed: {0}")]
    AgentCardValidation(String),

    /// Network or HTTP failure while retrieving an Agent Card.
    #[error("agent card fetch failed: {message}")]
    AgentCardFetch {
        /// Human-readable description of the failure.
        message: String,
        /// HTTP status code, when the server answered at all.
        status: Option<u16>,
        /// Response body (truncated), when available.
        body: Option<String>,
    },

    /// The registry reported no card for the requested human-readable ID.
    #[error("agent card not found: {0}")]
    AgentCardNotFound(String),

    /// Transport-level failure: DNS, TLS, connection refused, SSE read error.
    #[error("connection error: {0}")]
    Connection(String),

    /// A request or stream read exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Credentials missing, rejected, or the scheme is unsupported.
    /// Not recoverable without user intervention.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The remote agent returned a JSON-RPC error envelope.
    #[error("remote agent error {code}: {message}")]
    RemoteAgent {
        /// JSON-RPC error code from the envelope.
        code: i64,
        /// Error message from the envelope.
        message: String,
        /// Optional structured `data` payload from the envelope.
        data: Option<serde_json::Value>,
    },

    /// A request could not be formed, a response could not be parsed, or a
    /// handler reported a plain domain failure.
    #[error("{0}")]
    Message(String),

    /// Credential store failure (keyring unavailable, write error).
    #[error("key management error: {0}")]
    KeyManagement(String),

    /// A handler was asked about a task the store does not know.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A task state transition violated the lifecycle table.
    #[error("invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// The task whose transition was rejected.
        task_id: String,
        /// State the task was in.
        from: String,
        /// State the caller attempted to reach.
        to: String,
    },

    /// Unexpected server-side failure. Maps to JSON-RPC -32603 and HTTP 500.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience result type for AgentVault operations.
pub type Result<T> = std::result::Result<T, AgentVaultError>;

impl AgentVaultError {
    /// The JSON-RPC error code the server dispatch uses for this error when
    /// it escapes an agent handler.
    ///
    /// Everything except [`Internal`](Self::Internal) is treated as a domain
    /// error (`-32000`); a [`RemoteAgent`](Self::RemoteAgent) error keeps its
    /// original code so proxied failures round-trip unchanged.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            AgentVaultError::Internal(_) => INTERNAL_ERROR,
            AgentVaultError::RemoteAgent { code, .. } => *code,
            _ => APP_ERROR,
        }
    }

    /// Shorthand for a fetch error without status/body context.
    pub fn card_fetch(message: impl Into<String>) -> Self {
        AgentVaultError::AgentCardFetch {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// Fetch error carrying the HTTP status and (truncated) response body.
    pub fn card_fetch_status(message: impl Into<String>, status: u16, body: String) -> Self {
        AgentVaultError::AgentCardFetch {
            message: message.into(),
            status: Some(status),
            body: Some(truncate_body(body)),
        }
    }
}

/// Truncate a response body for inclusion in error messages.
fn truncate_body(body: String) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body
    }
}

/// Exit-code convention for CLI front-ends built on this crate:
/// 0 for a task that completed, 1 for failures, 2 for canceled or
/// awaiting-input outcomes.
pub fn exit_code_for_state(state: &crate::types::TaskState) -> i32 {
    use crate::types::TaskState;
    match state {
        TaskState::Completed => 0,
        TaskState::Failed => 1,
        TaskState::Canceled | TaskState::InputRequired => 2,
        TaskState::Submitted | TaskState::Working => 1,
    }
}

impl From<serde_json::Error> for AgentVaultError {
    fn from(err: serde_json::Error) -> Self {
        AgentVaultError::Message(format!("JSON error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskState;

    #[test]
    fn error_codes_match_json_rpc() {
        assert_eq!(PARSE_ERROR, -32700);
        assert_eq!(INVALID_REQUEST, -32600);
        assert_eq!(METHOD_NOT_FOUND, -32601);
        assert_eq!(INVALID_PARAMS, -32602);
        assert_eq!(INTERNAL_ERROR, -32603);
        assert_eq!(APP_ERROR, -32000);
    }

    #[test]
    fn domain_errors_map_to_app_error() {
        let err = AgentVaultError::InvalidStateTransition {
            task_id: "t1".into(),
            from: "COMPLETED".into(),
            to: "WORKING".into(),
        };
        assert_eq!(err.json_rpc_code(), APP_ERROR);
    }

    #[test]
    fn internal_maps_to_internal_error() {
        assert_eq!(
            AgentVaultError::Internal("boom".into()).json_rpc_code(),
            INTERNAL_ERROR
        );
    }

    #[test]
    fn remote_agent_keeps_code() {
        let err = AgentVaultError::RemoteAgent {
            code: -32601,
            message: "nope".into(),
            data: None,
        };
        assert_eq!(err.json_rpc_code(), -32601);
    }

    #[test]
    fn fetch_error_truncates_body() {
        let long = "x".repeat(500);
        match AgentVaultError::card_fetch_status("failed", 502, long) {
            AgentVaultError::AgentCardFetch { body: Some(b), .. } => {
                assert!(b.len() <= 203);
                assert!(b.ends_with("..."));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn exit_codes_follow_convention() {
        assert_eq!(exit_code_for_state(&TaskState::Completed), 0);
        assert_eq!(exit_code_for_state(&TaskState::Failed), 1);
        assert_eq!(exit_code_for_state(&TaskState::Canceled), 2);
        assert_eq!(exit_code_for_state(&TaskState::InputRequired), 2);
    }
}
