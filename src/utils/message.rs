//! Message construction helpers.
//!
//! Messages are value types and semantically immutable; the helpers here
//! build fresh messages rather than mutating, which is how MCP context gets
//! injected without touching the caller's copy.

use crate::types::{Message, Part, Role};

/// Build a message with a single text part.
pub fn new_text_message(role: Role, content: impl Into<String>) -> Message {
    Message::new(role, vec![Part::text(content)])
}

/// Return a copy of `message` with `mcp_context` merged into its metadata.
///
/// Existing metadata keys are preserved; an existing `mcp_context` key is
/// replaced. The input message is left untouched.
pub fn with_mcp_context(message: &Message, mcp_context: serde_json::Value) -> Message {
    let mut metadata = match &message.metadata {
        Some(serde_json::Value::Object(map)) => map.clone(),
        // Non-object metadata is replaced wholesale; the protocol treats
        // metadata as an object.
        _ => serde_json::Map::new(),
    };
    metadata.insert("mcp_context".to_string(), mcp_context);

    Message {
        role: message.role,
        parts: message.parts.clone(),
        metadata: Some(serde_json::Value::Object(metadata)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mcp_context_merge_does_not_mutate_original() {
        let original = new_text_message(Role::User, "hi");
        let injected = with_mcp_context(&original, json!({"session": "s1"}));

        assert!(original.metadata.is_none());
        assert_eq!(
            injected.metadata.unwrap()["mcp_context"],
            json!({"session": "s1"})
        );
    }

    #[test]
    fn mcp_context_merge_preserves_existing_keys() {
        let mut base = new_text_message(Role::User, "hi");
        base.metadata = Some(json!({"trace": "t-9"}));

        let injected = with_mcp_context(&base, json!({"k": 1}));
        let metadata = injected.metadata.unwrap();
        assert_eq!(metadata["trace"], "t-9");
        assert_eq!(metadata["mcp_context"], json!({"k": 1}));
    }
}
