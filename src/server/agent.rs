//! The agent contract — what a value must implement to be served over A2A.
//!
//! An agent is anything implementing [`A2aAgent`]; the router takes it as a
//! dependency and routes the four core JSON-RPC methods to it. Additional
//! custom methods are registered through
//! [`crate::server::handlers::HandlerRegistry`].

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tracing::debug;

use crate::error::{AgentVaultError, Result};
use crate::types::{A2AEvent, Message, Task};

use super::state::{EventQueue, TaskStore};

/// A stream of task events, as produced by `handle_subscribe_request`.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<A2AEvent>> + Send>>;

/// Behavior of an A2A agent in response to the four core protocol methods.
///
/// Implementations typically hold an `Arc<dyn TaskStore>` and drive it from
/// `handle_task_send`; [`subscribe_via_store`] then gives them
/// `handle_subscribe_request` almost for free.
#[async_trait]
pub trait A2aAgent: Send + Sync {
    /// Handle `tasks/send`: `task_id` is `None` when initiating, `Some` when
    /// appending to an existing task. Returns the task ID.
    async fn handle_task_send(&self, task_id: Option<String>, message: Message) -> Result<String>;

    /// Handle `tasks/get`: return the full task snapshot.
    async fn handle_task_get(&self, task_id: &str) -> Result<Task>;

    /// Handle `tasks/cancel`: attempt to stop processing and move the task
    /// to `CANCELED`. Returns whether the request was accepted.
    async fn handle_task_cancel(&self, task_id: &str) -> Result<bool>;

    /// Handle `tasks/sendSubscribe`: return the task's event stream. The
    /// runtime formats the events as SSE; the stream should end after a
    /// terminal status update.
    async fn handle_subscribe_request(&self, task_id: &str) -> Result<EventStream>;
}

/// Build an [`EventStream`] for a task by registering a listener queue on
/// the store.
///
/// The stream yields every event fanned out for the task from this point on
/// (no replay of earlier events), ends after a terminal status update, and
/// unregisters its listener when it finishes or is dropped mid-iteration.
pub async fn subscribe_via_store(store: Arc<dyn TaskStore>, task_id: &str) -> Result<EventStream> {
    if store.get_task(task_id).await?.is_none() {
        return Err(AgentVaultError::TaskNotFound(task_id.to_string()));
    }

    let queue = EventQueue::with_default_capacity();
    let queue_id = queue.id();
    let mut receiver = queue.subscribe();
    store.add_listener(task_id, queue).await?;

    let task_id = task_id.to_string();
    // The guard unregisters the listener even when the consumer drops the
    // stream before a terminal event arrives.
    let guard = ListenerGuard {
        store,
        task_id: task_id.clone(),
        queue_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(event) = receiver.recv().await {
            let terminal = event.is_terminal();
            yield Ok::<_, AgentVaultError>(event);
            if terminal {
                debug!(task_id = %task_id, "terminal status reached, ending subscription stream");
                break;
            }
        }
    };

    Ok(Box::pin(stream))
}

/// Removes a listener from the store when dropped.
struct ListenerGuard {
    store: Arc<dyn TaskStore>,
    task_id: String,
    queue_id: uuid::Uuid,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let store = Arc::clone(&self.store);
        let task_id = self.task_id.clone();
        let queue_id = self.queue_id;
        // Removal is best-effort; if no runtime is available the listener
        // stays registered until the task is deleted.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = store.remove_listener(&task_id, queue_id).await;
            });
        }
    }
}
