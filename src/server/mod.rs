//! Server half of the A2A runtime: the agent contract, the task state
//! machine and store, the custom-method registry, and the axum HTTP
//! integration.

pub mod agent;
pub mod axum_integration;
pub mod handlers;
pub mod state;

pub use agent::{subscribe_via_store, A2aAgent, EventStream};
pub use axum_integration::{a2a_router, A2aRouterBuilder};
pub use handlers::{DispatchError, HandlerRegistry, RpcHandler};
pub use state::{
    allowed_transitions, transition_allowed, CancelSignal, EventQueue, EventReceiver,
    InMemoryTaskStore, TaskContext, TaskStore, DEFAULT_LISTENER_CAPACITY,
};
