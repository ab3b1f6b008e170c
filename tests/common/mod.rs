//! Shared test fixtures: simple agents over the in-memory store and a
//! helper to serve a router on an ephemeral port.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use uuid::Uuid;

use agentvault::card::{AgentAuthentication, AgentCard, AgentCardBuilder};
use agentvault::error::{AgentVaultError, Result};
use agentvault::server::{subscribe_via_store, A2aAgent, EventStream, InMemoryTaskStore, TaskStore};
use agentvault::types::{Message, Role, Task, TaskState};
use agentvault::utils::{first_text, new_text_message};

/// Echo agent: replies `Echo: {text}` and completes.
///
/// With `wait_for_subscriber` set, the background work holds off until a
/// listener is registered, so subscription tests observe the full event
/// sequence without racing task completion.
pub struct EchoAgent {
    pub store: Arc<InMemoryTaskStore>,
    pub wait_for_subscriber: bool,
}

impl EchoAgent {
    pub fn new(store: Arc<InMemoryTaskStore>) -> Self {
        Self {
            store,
            wait_for_subscriber: false,
        }
    }

    pub fn waiting(store: Arc<InMemoryTaskStore>) -> Self {
        Self {
            store,
            wait_for_subscriber: true,
        }
    }
}

async fn wait_for_listener(store: &InMemoryTaskStore, task_id: &str) {
    for _ in 0..200 {
        if !store.get_listeners(task_id).await.unwrap().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[async_trait]
impl A2aAgent for EchoAgent {
    async fn handle_task_send(&self, task_id: Option<String>, message: Message) -> Result<String> {
        let task_id = match task_id {
            Some(id) => {
                self.store
                    .get_task(&id)
                    .await?
                    .ok_or_else(|| AgentVaultError::TaskNotFound(id.clone()))?;
                id
            }
            None => format!("task-{}", Uuid::new_v4()),
        };

        self.store.create_task(&task_id).await?;
        self.store
            .notify_message_event(&task_id, message.clone())
            .await?;

        let store = Arc::clone(&self.store);
        let wait = self.wait_for_subscriber;
        let id = task_id.clone();
        tokio::spawn(async move {
            if wait {
                wait_for_listener(&store, &id).await;
            }
            let _ = store.update_task_state(&id, TaskState::Working, None).await;
            let text = first_text(&message).unwrap_or_default().to_string();
            let reply = new_text_message(Role::Assistant, format!("Echo: {text}"));
            let _ = store.notify_message_event(&id, reply).await;
            let _ = store
                .update_task_state(&id, TaskState::Completed, None)
                .await;
        });

        Ok(task_id)
    }

    async fn handle_task_get(&self, task_id: &str) -> Result<Task> {
        self.store
            .task_snapshot(task_id)
            .await?
            .ok_or_else(|| AgentVaultError::TaskNotFound(task_id.to_string()))
    }

    async fn handle_task_cancel(&self, task_id: &str) -> Result<bool> {
        self.store
            .update_task_state(task_id, TaskState::Canceled, None)
            .await?;
        Ok(true)
    }

    async fn handle_subscribe_request(&self, task_id: &str) -> Result<EventStream> {
        subscribe_via_store(self.store.clone() as Arc<dyn TaskStore>, task_id).await
    }
}

/// Agent that enters WORKING and then idles until canceled.
pub struct PendingAgent {
    pub store: Arc<InMemoryTaskStore>,
}

#[async_trait]
impl A2aAgent for PendingAgent {
    async fn handle_task_send(&self, task_id: Option<String>, _message: Message) -> Result<String> {
        let task_id = task_id.unwrap_or_else(|| format!("task-{}", Uuid::new_v4()));
        let context = self.store.create_task(&task_id).await?;

        let store = Arc::clone(&self.store);
        let id = task_id.clone();
        tokio::spawn(async move {
            wait_for_listener(&store, &id).await;
            let _ = store.update_task_state(&id, TaskState::Working, None).await;
            context.cancel.cancelled().await;
        });

        Ok(task_id)
    }

    async fn handle_task_get(&self, task_id: &str) -> Result<Task> {
        self.store
            .task_snapshot(task_id)
            .await?
            .ok_or_else(|| AgentVaultError::TaskNotFound(task_id.to_string()))
    }

    async fn handle_task_cancel(&self, task_id: &str) -> Result<bool> {
        self.store
            .update_task_state(task_id, TaskState::Canceled, None)
            .await?;
        Ok(true)
    }

    async fn handle_subscribe_request(&self, task_id: &str) -> Result<EventStream> {
        subscribe_via_store(self.store.clone() as Arc<dyn TaskStore>, task_id).await
    }
}

/// Agent whose send handler always raises a domain error.
pub struct FailingAgent;

#[async_trait]
impl A2aAgent for FailingAgent {
    async fn handle_task_send(&self, _task_id: Option<String>, _message: Message) -> Result<String> {
        Err(AgentVaultError::Message("quota exceeded".to_string()))
    }

    async fn handle_task_get(&self, task_id: &str) -> Result<Task> {
        Err(AgentVaultError::TaskNotFound(task_id.to_string()))
    }

    async fn handle_task_cancel(&self, _task_id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn handle_subscribe_request(&self, task_id: &str) -> Result<EventStream> {
        Err(AgentVaultError::TaskNotFound(task_id.to_string()))
    }
}

/// Serve a router on 127.0.0.1 with an OS-assigned port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A card pointing at a local test server with the given auth schemes.
pub fn card_for(addr: SocketAddr, schemes: Vec<AgentAuthentication>) -> AgentCard {
    let mut builder = AgentCardBuilder::new(
        "Test Agent",
        "test-org/agent",
        format!("http://127.0.0.1:{}/", addr.port()),
    )
    .description("integration test agent");
    for scheme in schemes {
        builder = builder.auth_scheme(scheme);
    }
    builder.build().expect("test card must validate")
}
