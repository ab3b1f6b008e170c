//! Minimal A2A agent: echoes the user's text back and completes.
//!
//! Run with `cargo run --example echo_agent`, then talk to it with the
//! `hello_client` example.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use agentvault::card::AgentCardBuilder;
use agentvault::error::{AgentVaultError, Result};
use agentvault::server::{
    subscribe_via_store, A2aAgent, A2aRouterBuilder, EventStream, InMemoryTaskStore, TaskStore,
};
use agentvault::types::{Message, Role, Task, TaskState};
use agentvault::utils::{first_text, new_text_message};

struct EchoAgent {
    store: Arc<InMemoryTaskStore>,
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
        let id = task_id.clone();
        tokio::spawn(async move {
            let _ = store.update_task_state(&id, TaskState::Working, None).await;
            let text = first_text(&message).unwrap_or_default();
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
        subscribe_via_store(Arc::clone(&self.store) as Arc<dyn TaskStore>, task_id).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let card = AgentCardBuilder::new("Echo Agent", "examples/echo", "http://localhost:8155/")
        .description("Echoes back whatever you send it.")
        .provider("AgentVault Examples")
        .build()?;

    let store = Arc::new(InMemoryTaskStore::new());
    let agent = Arc::new(EchoAgent {
        store: Arc::clone(&store),
    });
    let app = A2aRouterBuilder::new(agent, store as Arc<dyn TaskStore>)
        .agent_card(card)
        .build();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8155").await?;
    println!("echo agent listening on http://127.0.0.1:8155/");
    axum::serve(listener, app).await?;
    Ok(())
}
