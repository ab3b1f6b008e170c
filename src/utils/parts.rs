//! Part inspection helpers.

use crate::types::{Message, Part};

/// The first text part's content in a message, if any.
pub fn first_text(message: &Message) -> Option<&str> {
    message.parts.iter().find_map(Part::as_text)
}

/// All text parts of a message joined with a delimiter.
pub fn collect_text(message: &Message, delimiter: &str) -> String {
    message
        .parts
        .iter()
        .filter_map(Part::as_text)
        .collect::<Vec<_>>()
        .join(delimiter)
}
