//! Helper utilities for constructing and inspecting protocol types.

pub mod message;
pub mod parts;

pub use message::{new_text_message, with_mcp_context};
pub use parts::{collect_text, first_text};
