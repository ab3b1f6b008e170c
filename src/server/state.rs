//! Task state machine and store — lifecycle records, transition validation,
//! and listener fan-out for streaming events.
//!
//! The store is the only mutable shared resource in the protocol core. Every
//! state change goes through [`TaskStore::update_task_state`], which
//! validates the transition against the lifecycle table and fans a
//! [`TaskStatusUpdateEvent`] out to the task's listeners. Fan-out is
//! non-blocking: each listener is a bounded broadcast ring, and a consumer
//! that falls behind loses its oldest events (logged) rather than stalling
//! the producer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Notify, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AgentVaultError, Result};
use crate::types::{
    A2AEvent, Artifact, Message, Task, TaskArtifactUpdateEvent, TaskMessageEvent, TaskState,
    TaskStatusUpdateEvent,
};

/// Default per-listener event buffer capacity.
pub const DEFAULT_LISTENER_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// The states reachable from `from`, excluding the always-allowed
/// self-transition.
pub fn allowed_transitions(from: TaskState) -> &'static [TaskState] {
    match from {
        TaskState::Submitted => &[TaskState::Working, TaskState::Canceled],
        TaskState::Working => &[
            TaskState::InputRequired,
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
        ],
        TaskState::InputRequired => &[TaskState::Working, TaskState::Canceled],
        TaskState::Completed | TaskState::Failed | TaskState::Canceled => &[],
    }
}

/// Whether `from -> to` is a legal transition (self-transitions included).
pub fn transition_allowed(from: TaskState, to: TaskState) -> bool {
    from == to || allowed_transitions(from).contains(&to)
}

// ---------------------------------------------------------------------------
// Cancellation signal
// ---------------------------------------------------------------------------

/// Per-task cancellation primitive.
///
/// Tripped when the task transitions to `CANCELED` or is deleted. Handlers
/// running background work poll [`is_tripped`](Self::is_tripped) or await
/// [`cancelled`](Self::cancelled); cancellation is advisory — in-flight work
/// may complete, but no further state transitions occur except to
/// `CANCELED`.
#[derive(Default)]
pub struct CancelSignal {
    tripped: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// Create an untripped signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal, waking all waiters. Idempotent.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether cancellation has been requested.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        while !self.is_tripped() {
            self.notify.notified().await;
        }
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("tripped", &self.is_tripped())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Task context
// ---------------------------------------------------------------------------

/// Per-task lifecycle record held by the store.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Agent-assigned, opaque task identifier.
    pub task_id: String,
    /// Current state.
    pub state: TaskState,
    /// Creation time.
    pub created_at: chrono::DateTime<Utc>,
    /// Last state or timestamp refresh.
    pub updated_at: chrono::DateTime<Utc>,
    /// Cancellation signal shared with background processing tasks.
    pub cancel: Arc<CancelSignal>,
}

impl TaskContext {
    fn new(task_id: &str) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.to_string(),
            state: TaskState::Submitted,
            created_at: now,
            updated_at: now,
            cancel: Arc::new(CancelSignal::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Listener queues
// ---------------------------------------------------------------------------

/// A listener registered on a task: a bounded broadcast ring written by the
/// store and drained by one SSE writer.
///
/// Publishing never blocks. When the consumer falls behind by more than the
/// ring capacity, its oldest events are dropped; the drop is reported on the
/// consumer side via a diagnostic log in [`EventReceiver::recv`].
#[derive(Clone)]
pub struct EventQueue {
    id: Uuid,
    tx: broadcast::Sender<A2AEvent>,
}

impl EventQueue {
    /// Create a queue with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Create a queue with [`DEFAULT_LISTENER_CAPACITY`].
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_LISTENER_CAPACITY)
    }

    /// Identity used for idempotent add / tolerant remove.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Subscribe a consumer to this queue.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish an event to the consumer. Never blocks; a queue with no
    /// active consumer drops the event with a debug log.
    pub(crate) fn publish(&self, event: A2AEvent) {
        if self.tx.send(event).is_err() {
            debug!(queue_id = %self.id, "no consumer on listener queue, event dropped");
        }
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue").field("id", &self.id).finish()
    }
}

/// Consumer half of an [`EventQueue`].
pub struct EventReceiver {
    rx: broadcast::Receiver<A2AEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` when the queue's producer side is gone. A lagging
    /// consumer has its oldest events dropped; the drop count is logged and
    /// reception continues with the next retained event.
    pub async fn recv(&mut self) -> Option<A2AEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "listener queue overflowed, dropped oldest events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive, for tests and polling consumers.
    pub fn try_recv(&mut self) -> Option<A2AEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(dropped = n, "listener queue overflowed, dropped oldest events");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TaskStore trait
// ---------------------------------------------------------------------------

/// Storage and event fan-out for task lifecycle state.
///
/// The in-memory implementation is [`InMemoryTaskStore`]; agents needing
/// persistence implement this trait over their own backing store.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a task in `SUBMITTED` with an empty listener list. Idempotent:
    /// an existing task is returned unchanged.
    async fn create_task(&self, task_id: &str) -> Result<TaskContext>;

    /// Retrieve a task's context.
    async fn get_task(&self, task_id: &str) -> Result<Option<TaskContext>>;

    /// Validate and apply a state transition, then emit a status update to
    /// every listener.
    ///
    /// Self-transitions refresh `updated_at` without emitting. Invalid
    /// transitions fail with
    /// [`InvalidStateTransition`](AgentVaultError::InvalidStateTransition)
    /// and emit nothing. Transitioning to `CANCELED` trips the task's
    /// [`CancelSignal`].
    async fn update_task_state(
        &self,
        task_id: &str,
        new_state: TaskState,
        message: Option<String>,
    ) -> Result<TaskContext>;

    /// Remove a task and its listener list. Pending events on queues the
    /// consumer still holds are lost; delete is an admin operation, not a
    /// lifecycle step. Returns whether the task existed.
    async fn delete_task(&self, task_id: &str) -> Result<bool>;

    /// Register a listener queue. Idempotent per queue identity.
    async fn add_listener(&self, task_id: &str, queue: EventQueue) -> Result<()>;

    /// Remove a listener queue; unknown queues are tolerated.
    async fn remove_listener(&self, task_id: &str, queue_id: Uuid) -> Result<()>;

    /// A snapshot of the task's current listeners.
    async fn get_listeners(&self, task_id: &str) -> Result<Vec<EventQueue>>;

    /// Append a message to the task conversation and fan it out.
    async fn notify_message_event(&self, task_id: &str, message: Message) -> Result<()>;

    /// Add or revise an artifact (matched by `id`) and fan it out.
    async fn notify_artifact_event(&self, task_id: &str, artifact: Artifact) -> Result<()>;

    /// A full [`Task`] snapshot (context + histories) for `tasks/get`.
    async fn task_snapshot(&self, task_id: &str) -> Result<Option<Task>>;
}

// ---------------------------------------------------------------------------
// InMemoryTaskStore
// ---------------------------------------------------------------------------

struct TaskEntry {
    context: TaskContext,
    messages: Vec<Message>,
    artifacts: Vec<Artifact>,
}

/// In-memory [`TaskStore`] for single-process agents and tests.
///
/// Events for a task are published in the order the store observes them:
/// fan-out happens under the same write lock that applies the mutation, and
/// publishing to a listener ring never blocks.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, TaskEntry>>,
    listeners: RwLock<HashMap<String, Vec<EventQueue>>>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan an event out to every listener of a task. Failure (a queue with
    /// no consumer) never prevents delivery to the remaining listeners.
    async fn fan_out(&self, task_id: &str, event: A2AEvent) {
        let listeners = self.listeners.read().await;
        let Some(queues) = listeners.get(task_id) else {
            debug!(task_id = %task_id, "no listener list for task, event not delivered");
            return;
        };
        debug!(
            task_id = %task_id,
            listeners = queues.len(),
            event = event.event_type(),
            "notifying listeners"
        );
        for queue in queues {
            queue.publish(event.clone());
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, task_id: &str) -> Result<TaskContext> {
        let mut tasks = self.tasks.write().await;
        if let Some(entry) = tasks.get(task_id) {
            warn!(task_id = %task_id, "task already exists, returning existing context");
            return Ok(entry.context.clone());
        }

        info!(task_id = %task_id, "creating task");
        let context = TaskContext::new(task_id);
        tasks.insert(
            task_id.to_string(),
            TaskEntry {
                context: context.clone(),
                messages: Vec::new(),
                artifacts: Vec::new(),
            },
        );
        drop(tasks);

        self.listeners
            .write()
            .await
            .entry(task_id.to_string())
            .or_default();
        Ok(context)
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskContext>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).map(|e| e.context.clone()))
    }

    async fn update_task_state(
        &self,
        task_id: &str,
        new_state: TaskState,
        message: Option<String>,
    ) -> Result<TaskContext> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| AgentVaultError::TaskNotFound(task_id.to_string()))?;

        let current = entry.context.state;
        if current == new_state {
            debug!(task_id = %task_id, state = %new_state, "self-transition, refreshing timestamp only");
            entry.context.updated_at = Utc::now();
            return Ok(entry.context.clone());
        }

        if !transition_allowed(current, new_state) {
            warn!(
                task_id = %task_id,
                from = %current,
                to = %new_state,
                "rejecting invalid state transition"
            );
            return Err(AgentVaultError::InvalidStateTransition {
                task_id: task_id.to_string(),
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }

        debug!(task_id = %task_id, from = %current, to = %new_state, "applying state transition");
        entry.context.state = new_state;
        entry.context.updated_at = Utc::now();
        let context = entry.context.clone();

        if new_state == TaskState::Canceled {
            context.cancel.trip();
        }

        // Fan out under the tasks write lock so concurrent updates cannot
        // reorder events for the same task. Publishing never blocks.
        let event = A2AEvent::StatusUpdate(TaskStatusUpdateEvent {
            task_id: task_id.to_string(),
            state: new_state,
            timestamp: context.updated_at,
            message,
        });
        self.fan_out(task_id, event).await;

        Ok(context)
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool> {
        let removed = self.tasks.write().await.remove(task_id);
        self.listeners.write().await.remove(task_id);
        match removed {
            Some(entry) => {
                info!(task_id = %task_id, "deleted task");
                entry.context.cancel.trip();
                Ok(true)
            }
            None => {
                warn!(task_id = %task_id, "task not found for deletion");
                Ok(false)
            }
        }
    }

    async fn add_listener(&self, task_id: &str, queue: EventQueue) -> Result<()> {
        let mut listeners = self.listeners.write().await;
        let list = listeners.entry(task_id.to_string()).or_default();
        if list.iter().any(|q| q.id() == queue.id()) {
            debug!(task_id = %task_id, queue_id = %queue.id(), "listener already registered");
            return Ok(());
        }
        list.push(queue);
        debug!(task_id = %task_id, total = list.len(), "added listener");
        Ok(())
    }

    async fn remove_listener(&self, task_id: &str, queue_id: Uuid) -> Result<()> {
        let mut listeners = self.listeners.write().await;
        match listeners.get_mut(task_id) {
            Some(list) => {
                let before = list.len();
                list.retain(|q| q.id() != queue_id);
                if list.len() == before {
                    warn!(task_id = %task_id, queue_id = %queue_id, "listener not registered, remove ignored");
                } else {
                    debug!(task_id = %task_id, remaining = list.len(), "removed listener");
                }
            }
            None => {
                warn!(task_id = %task_id, "no listener list for task, remove ignored");
            }
        }
        Ok(())
    }

    async fn get_listeners(&self, task_id: &str) -> Result<Vec<EventQueue>> {
        let listeners = self.listeners.read().await;
        Ok(listeners.get(task_id).cloned().unwrap_or_default())
    }

    async fn notify_message_event(&self, task_id: &str, message: Message) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| AgentVaultError::TaskNotFound(task_id.to_string()))?;
        entry.messages.push(message.clone());

        let event = A2AEvent::Message(TaskMessageEvent {
            task_id: task_id.to_string(),
            message,
            timestamp: Utc::now(),
        });
        self.fan_out(task_id, event).await;
        Ok(())
    }

    async fn notify_artifact_event(&self, task_id: &str, artifact: Artifact) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| AgentVaultError::TaskNotFound(task_id.to_string()))?;

        match entry.artifacts.iter_mut().find(|a| a.id == artifact.id) {
            Some(existing) => *existing = artifact.clone(),
            None => entry.artifacts.push(artifact.clone()),
        }

        let event = A2AEvent::ArtifactUpdate(TaskArtifactUpdateEvent {
            task_id: task_id.to_string(),
            artifact,
            timestamp: Utc::now(),
        });
        self.fan_out(task_id, event).await;
        Ok(())
    }

    async fn task_snapshot(&self, task_id: &str) -> Result<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).map(|entry| Task {
            id: entry.context.task_id.clone(),
            state: entry.context.state,
            created_at: entry.context.created_at,
            updated_at: entry.context.updated_at,
            messages: entry.messages.clone(),
            artifacts: entry.artifacts.clone(),
            metadata: None,
        }))
    }
}
