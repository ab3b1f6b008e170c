//! Custom JSON-RPC method registry.
//!
//! Agents can expose methods beyond the four core ones. A handler declares
//! its parameter and return types statically; the registry deserialises the
//! incoming `params` into the declared type (invalid input becomes a
//! `-32602` response), injects the shared task store, and serialises the
//! declared return type into the `result` envelope.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AgentVaultError;

use super::state::TaskStore;

/// How a dispatched call failed, deciding the JSON-RPC error code and HTTP
/// status of the response.
#[derive(Debug)]
pub enum DispatchError {
    /// `params` did not match the handler's declared parameter type
    /// (`-32602`, HTTP 200).
    InvalidParams(String),
    /// The handler returned a domain error (`-32000`, HTTP 200).
    Domain(AgentVaultError),
    /// Unexpected failure: serialisation, invalid return value
    /// (`-32603`, HTTP 500).
    Internal(String),
}

impl DispatchError {
    /// The JSON-RPC error code for this failure.
    pub fn code(&self) -> i64 {
        match self {
            DispatchError::InvalidParams(_) => crate::error::INVALID_PARAMS,
            DispatchError::Domain(e) => e.json_rpc_code(),
            DispatchError::Internal(_) => crate::error::INTERNAL_ERROR,
        }
    }

    /// The error message placed in the JSON-RPC envelope.
    pub fn message(&self) -> String {
        match self {
            DispatchError::InvalidParams(msg) => format!("Invalid params: {msg}"),
            DispatchError::Domain(e) => format!("Agent processing error: {e}"),
            DispatchError::Internal(msg) => format!("Internal agent error: {msg}"),
        }
    }

    /// Whether the HTTP response carries status 500 instead of 200.
    pub fn is_internal(&self) -> bool {
        matches!(self, DispatchError::Internal(_))
            || matches!(self, DispatchError::Domain(AgentVaultError::Internal(_)))
    }
}

/// Classify an error escaping an agent handler: internals stay internal,
/// everything else is a domain error.
pub(crate) fn classify_handler_error(err: AgentVaultError) -> DispatchError {
    match err {
        AgentVaultError::Internal(msg) => DispatchError::Internal(msg),
        other => DispatchError::Domain(other),
    }
}

/// Object-safe face of a registered method handler.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Validate `params`, run the handler, serialise the result.
    async fn call(
        &self,
        params: serde_json::Value,
        store: Arc<dyn TaskStore>,
    ) -> Result<serde_json::Value, DispatchError>;
}

/// Adapter turning a typed async closure into an [`RpcHandler`].
struct TypedHandler<P, R, F> {
    func: F,
    _marker: std::marker::PhantomData<fn(P) -> R>,
}

#[async_trait]
impl<P, R, F, Fut> RpcHandler for TypedHandler<P, R, F>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(P, Arc<dyn TaskStore>) -> Fut + Send + Sync,
    Fut: Future<Output = crate::error::Result<R>> + Send,
{
    async fn call(
        &self,
        params: serde_json::Value,
        store: Arc<dyn TaskStore>,
    ) -> Result<serde_json::Value, DispatchError> {
        let typed: P = serde_json::from_value(params)
            .map_err(|e| DispatchError::InvalidParams(e.to_string()))?;

        let result = (self.func)(typed, store)
            .await
            .map_err(classify_handler_error)?;

        serde_json::to_value(result)
            .map_err(|e| DispatchError::Internal(format!("invalid return value from handler: {e}")))
    }
}

/// Registry of `(method name, handler)` pairs collected at router
/// construction.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RpcHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for a method name. Registering the same
    /// name twice replaces the previous handler with a warning.
    ///
    /// # Example
    ///
    /// ```
    /// use agentvault::server::HandlerRegistry;
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Deserialize)]
    /// struct EchoParams { text: String }
    ///
    /// #[derive(Serialize)]
    /// struct EchoResult { text: String }
    ///
    /// let mut registry = HandlerRegistry::new();
    /// registry.register("custom/echo", |params: EchoParams, _store| async move {
    ///     Ok(EchoResult { text: params.text })
    /// });
    /// ```
    pub fn register<P, R, F, Fut>(&mut self, method: &str, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, Arc<dyn TaskStore>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<R>> + Send + 'static,
    {
        if self.handlers.contains_key(method) {
            warn!(method = %method, "duplicate handler registration, overwriting previous handler");
        } else {
            debug!(method = %method, "registered custom method handler");
        }
        self.handlers.insert(
            method.to_string(),
            Arc::new(TypedHandler {
                func: handler,
                _marker: std::marker::PhantomData,
            }),
        );
    }

    /// Look up the handler for a method.
    pub fn get(&self, method: &str) -> Option<Arc<dyn RpcHandler>> {
        self.handlers.get(method).cloned()
    }

    /// Whether any custom handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
