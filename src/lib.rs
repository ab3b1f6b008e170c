//! # agentvault — Rust SDK for the AgentVault Agent-to-Agent (A2A) protocol
//!
//! AgentVault lets autonomous software agents discover, authenticate to, and
//! talk to each other over a uniform JSON-RPC 2.0 + Server-Sent Events
//! protocol. This crate implements the protocol core: both halves of the
//! wire contract (client SDK and agent-server SDK), the task state machine
//! underneath them, the agent-card model, and the local credential store.
//!
//! ## Feature flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `client` | yes     | HTTP client for calling A2A agents (reqwest + SSE) |
//! | `server` | yes     | Agent traits + axum integration for building agents |
//! | `full`   | no      | Enable all features |
//!
//! ## Quick start: client
//!
//! ```no_run
//! use agentvault::card::CardResolver;
//! use agentvault::client::AgentVaultClient;
//! use agentvault::keys::{KeyManager, KeyManagerConfig};
//! use agentvault::types::{A2AEvent, Role};
//! use agentvault::utils::new_text_message;
//!
//! #[tokio::main]
//! async fn main() -> agentvault::error::Result<()> {
//!     // Resolve the agent's card (URL, file, or registry lookup).
//!     let card = CardResolver::new()
//!         .fetch_from_url("https://agents.example.com/agent-card.json")
//!         .await?;
//!
//!     // Credentials come from key files, env vars, and the OS keyring.
//!     let keys = KeyManager::new(KeyManagerConfig::default());
//!
//!     let client = AgentVaultClient::new();
//!     let task_id = client
//!         .initiate_task(&card, &keys, new_text_message(Role::User, "hi"), Default::default())
//!         .await?;
//!
//!     // Stream events until the task reaches a terminal state.
//!     let mut events = client.receive_messages(&card, &keys, &task_id).await?;
//!     while let Some(event) = events.next().await {
//!         match event? {
//!             A2AEvent::StatusUpdate(update) => println!("state: {}", update.state),
//!             A2AEvent::Message(msg) => println!("message: {:?}", msg.message.parts),
//!             A2AEvent::ArtifactUpdate(update) => println!("artifact: {}", update.artifact.id),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Quick start: server
//!
//! Implement [`server::A2aAgent`] for your agent and hand it to the router:
//!
//! ```rust,ignore
//! use agentvault::server::{a2a_router, subscribe_via_store, A2aAgent, InMemoryTaskStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryTaskStore::new());
//! let agent = Arc::new(MyAgent { store: store.clone() });
//! let app = a2a_router(agent, store);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! The router exposes `POST /` for the JSON-RPC methods (`tasks/send`,
//! `tasks/get`, `tasks/cancel`, `tasks/sendSubscribe`) and, when configured,
//! `GET /agent-card.json` for discovery. Custom methods register through
//! [`server::HandlerRegistry`] with statically-typed parameters.
//!
//! ## Architecture
//!
//! - [`types`] — wire types: states, parts, messages, artifacts, events,
//!   the JSON-RPC envelope;
//! - [`card`] — the Agent Card model and its resolver (URL / file /
//!   registry lookup);
//! - [`keys`] — the credential store: key files, `AGENTVAULT_*` env vars,
//!   OS keyring (file > env > keyring);
//! - [`client`] — [`client::AgentVaultClient`] plus auth resolution and the
//!   SSE consumer;
//! - [`server`] — the [`server::A2aAgent`] contract, the task store with
//!   listener fan-out, and the axum integration;
//! - [`error`] — the failure taxonomy shared by all of the above.

pub mod card;
pub mod error;
pub mod keys;
pub mod types;
pub mod utils;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;

/// Commonly used types and traits, importable in one line.
///
/// ```
/// use agentvault::prelude::*;
/// ```
pub mod prelude {
    pub use crate::card::{AgentAuthentication, AgentCard, AgentCardBuilder, AuthScheme};
    pub use crate::error::{AgentVaultError, Result};
    pub use crate::keys::{KeyManager, KeyManagerConfig, KeySource};
    pub use crate::types::{
        A2AEvent, Artifact, Message, Part, Role, Task, TaskArtifactUpdateEvent, TaskMessageEvent,
        TaskState, TaskStatusUpdateEvent,
    };

    #[cfg(feature = "client")]
    pub use crate::card::CardResolver;

    #[cfg(feature = "client")]
    pub use crate::client::{A2AEventStream, AgentVaultClient, ClientConfig, InitiateOptions};

    #[cfg(feature = "server")]
    pub use crate::server::{
        a2a_router, subscribe_via_store, A2aAgent, A2aRouterBuilder, EventQueue, EventStream,
        HandlerRegistry, InMemoryTaskStore, TaskContext, TaskStore,
    };
}

pub use error::{AgentVaultError, Result};
