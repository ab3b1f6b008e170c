//! Client half of the A2A runtime: the session object, authentication
//! resolution, and the SSE event stream consumer.

pub(crate) mod auth;
pub mod session;
pub mod sse;

pub use session::{AgentVaultClient, ClientConfig, InitiateOptions};
pub use sse::A2AEventStream;
