//! Agent card resolution — from a URL, a local file, or a registry lookup.
//!
//! The resolver accepts an injected `reqwest::Client` for testability; when
//! none is injected, each call constructs a transient client that is dropped
//! (and its connections closed) when the call returns.

use std::path::Path;

use tracing::debug;

use crate::card::AgentCard;
use crate::error::{AgentVaultError, Result};

/// Registry lookup path, relative to the registry base URL.
const REGISTRY_LOOKUP_PATH: &str = "/api/v1/agent-cards/id";

/// Resolves [`AgentCard`]s from URLs, files, and registry lookups.
///
/// # Example
///
/// ```no_run
/// use agentvault::card::CardResolver;
///
/// # async fn example() -> agentvault::error::Result<()> {
/// let resolver = CardResolver::new();
/// let card = resolver
///     .fetch_from_url("https://agents.example.com/agent-card.json")
///     .await?;
/// println!("{} v{}", card.name, card.agent_version);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CardResolver {
    client: Option<reqwest::Client>,
}

impl CardResolver {
    /// Create a resolver that builds a transient HTTP client per call.
    pub fn new() -> Self {
        Self { client: None }
    }

    /// Create a resolver using an existing `reqwest::Client` (shared
    /// connection pool, or a mocked transport in tests).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Some(client),
        }
    }

    fn client(&self) -> reqwest::Client {
        self.client.clone().unwrap_or_default()
    }

    /// Fetch and validate a card from a direct URL.
    ///
    /// Non-2xx responses surface as
    /// [`AgentCardFetch`](AgentVaultError::AgentCardFetch) carrying the
    /// status code and (truncated) body.
    pub async fn fetch_from_url(&self, url: &str) -> Result<AgentCard> {
        debug!(url = %url, "fetching agent card");
        let response = self.client().get(url).send().await.map_err(|e| {
            AgentVaultError::card_fetch(format!("network error fetching agent card from {url}: {e}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AgentVaultError::card_fetch(format!("error reading agent card response from {url}: {e}"))
        })?;

        if !status.is_success() {
            return Err(AgentVaultError::card_fetch_status(
                format!("failed to fetch agent card from {url}"),
                status.as_u16(),
                body,
            ));
        }

        AgentCard::parse(&body)
    }

    /// Load and validate a card from a local JSON file.
    ///
    /// A missing path and a path that is not a regular file produce distinct
    /// error messages; both are fetch-category failures.
    pub fn load_from_file(&self, path: &Path) -> Result<AgentCard> {
        if !path.exists() {
            return Err(AgentVaultError::card_fetch(format!(
                "agent card file not found: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(AgentVaultError::card_fetch(format!(
                "agent card path exists but is not a file: {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentVaultError::card_fetch(format!(
                "could not read agent card file {}: {e}",
                path.display()
            ))
        })?;

        AgentCard::parse(&raw)
    }

    /// Look up a card in a registry by its human-readable ID.
    ///
    /// Performs `GET {registry_url}/api/v1/agent-cards/id/{id}`. A 200
    /// response carries `{"card_data": <AgentCard>}`; a 404 maps to
    /// [`AgentCardNotFound`](AgentVaultError::AgentCardNotFound); any other
    /// status is a fetch error with status and body.
    pub async fn fetch_from_registry(
        &self,
        registry_url: &str,
        human_readable_id: &str,
    ) -> Result<AgentCard> {
        let base = registry_url.trim_end_matches('/');
        let encoded = percent_encode_path_segment(human_readable_id);
        let url = format!("{base}{REGISTRY_LOOKUP_PATH}/{encoded}");
        debug!(url = %url, id = %human_readable_id, "looking up agent card in registry");

        let response = self.client().get(&url).send().await.map_err(|e| {
            AgentVaultError::card_fetch(format!("network error querying registry at {url}: {e}"))
        })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AgentVaultError::AgentCardNotFound(
                human_readable_id.to_string(),
            ));
        }

        let body = response.text().await.map_err(|e| {
            AgentVaultError::card_fetch(format!("error reading registry response from {url}: {e}"))
        })?;

        if !status.is_success() {
            return Err(AgentVaultError::card_fetch_status(
                format!("registry lookup failed for '{human_readable_id}'"),
                status.as_u16(),
                body,
            ));
        }

        let envelope: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            AgentVaultError::card_fetch(format!("invalid JSON from registry at {url}: {e}"))
        })?;

        let card_data = envelope.get("card_data").cloned().ok_or_else(|| {
            AgentVaultError::card_fetch(format!(
                "registry response for '{human_readable_id}' is missing 'card_data'"
            ))
        })?;

        AgentCard::from_value(card_data)
    }
}

/// Percent-encode a human-readable ID for use as a single path segment,
/// keeping its interior `/` intact (the registry route expects `org/agent`).
fn percent_encode_path_segment(id: &str) -> String {
    // IDs matching the card shape only contain [a-z0-9._/-], which are URL
    // path safe; anything else is percent-encoded byte-by-byte.
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' | b'/' => {
                out.push(b as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_and_directory_are_distinct() {
        let resolver = CardResolver::new();

        let err = resolver
            .load_from_file(Path::new("/nonexistent/agent-card.json"))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        let dir = tempfile::tempdir().unwrap();
        let err = resolver.load_from_file(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a file"));
    }

    #[test]
    fn id_encoding_keeps_slash() {
        assert_eq!(percent_encode_path_segment("org/agent"), "org/agent");
        assert_eq!(percent_encode_path_segment("org/ag ent"), "org/ag%20ent");
    }
}
