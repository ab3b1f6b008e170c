//! Agent Card model — the public descriptor of an agent.
//!
//! A card tells a client where an agent lives (`url`), how to authenticate
//! (`authSchemes`), and what it can do (`capabilities`, `skills`). Cards are
//! immutable once published; parsing always validates the schema invariants.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{AgentVaultError, Result};

#[cfg(feature = "client")]
pub mod resolver;

#[cfg(feature = "client")]
pub use resolver::CardResolver;

/// Pattern for `humanReadableId`: `org/agent`, lowercase alphanumerics plus
/// `.`, `_`, `-`, neither segment starting with punctuation.
const HUMAN_READABLE_ID_PATTERN: &str = r"^[a-z0-9][a-z0-9._-]*/[a-z0-9][a-z0-9._-]*$";

fn human_readable_id_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(HUMAN_READABLE_ID_PATTERN).unwrap())
}

/// Authentication scheme names accepted in `authSchemes[].scheme`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthScheme {
    /// API key in the `X-Api-Key` header.
    #[serde(rename = "apiKey")]
    ApiKey,
    /// Static bearer token in the `Authorization` header.
    #[serde(rename = "bearer")]
    Bearer,
    /// OAuth2 client-credentials flow against `tokenUrl`.
    #[serde(rename = "oauth2")]
    OAuth2,
    /// No authentication.
    #[serde(rename = "none")]
    None,
}

/// One entry of a card's `authSchemes` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAuthentication {
    /// The scheme kind.
    pub scheme: AuthScheme,

    /// How to obtain and use credentials for this scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// OAuth2 token endpoint; required when `scheme` is `oauth2`.
    #[serde(rename = "tokenUrl", skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,

    /// OAuth2 scopes requested by the agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,

    /// Identifier the client's key manager uses to locate the right secret.
    /// Falls back to the card's `humanReadableId` when absent.
    #[serde(rename = "serviceIdentifier", skip_serializing_if = "Option::is_none")]
    pub service_identifier: Option<String>,
}

impl AgentAuthentication {
    /// A `none` scheme entry.
    pub fn none() -> Self {
        Self {
            scheme: AuthScheme::None,
            description: None,
            token_url: None,
            scopes: None,
            service_identifier: None,
        }
    }

    /// An `apiKey` scheme entry for the given service identifier.
    pub fn api_key(service_identifier: impl Into<String>) -> Self {
        Self {
            scheme: AuthScheme::ApiKey,
            description: None,
            token_url: None,
            scopes: None,
            service_identifier: Some(service_identifier.into()),
        }
    }

    /// An `oauth2` scheme entry for the given service and token endpoint.
    pub fn oauth2(service_identifier: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            scheme: AuthScheme::OAuth2,
            description: None,
            token_url: Some(token_url.into()),
            scopes: None,
            service_identifier: Some(service_identifier.into()),
        }
    }
}

/// Information about the agent's provider or developer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProvider {
    /// Provider name.
    pub name: String,

    /// Provider homepage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Support contact (email or URL).
    #[serde(rename = "supportContact", skip_serializing_if = "Option::is_none")]
    pub support_contact: Option<String>,
}

/// Details about a Trusted Execution Environment the agent runs in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeeDetails {
    /// TEE technology identifier (e.g. "AWS Nitro Enclaves").
    #[serde(rename = "type")]
    pub kind: String,

    /// Where attestation documents can be obtained or verified.
    #[serde(rename = "attestationEndpoint", skip_serializing_if = "Option::is_none")]
    pub attestation_endpoint: Option<String>,

    /// Public key associated with the TEE instance.
    #[serde(rename = "publicKey", skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Human-readable description of the TEE guarantees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Protocol capabilities of the agent endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// A2A protocol version spoken by the endpoint.
    #[serde(rename = "a2aVersion")]
    pub a2a_version: String,

    /// Model Context Protocol version supported, if any.
    #[serde(rename = "mcpVersion", skip_serializing_if = "Option::is_none")]
    pub mcp_version: Option<String>,

    /// Message part types supported (`text`, `file`, `data`). Clients may
    /// assume the basic types when omitted.
    #[serde(
        rename = "supportedMessageParts",
        skip_serializing_if = "Option::is_none"
    )]
    pub supported_message_parts: Option<Vec<String>>,

    /// TEE details, when the agent runs in one.
    #[serde(rename = "teeDetails", skip_serializing_if = "Option::is_none")]
    pub tee_details: Option<TeeDetails>,

    /// Whether the agent can push notifications to a client webhook.
    #[serde(
        rename = "supportsPushNotifications",
        skip_serializing_if = "Option::is_none"
    )]
    pub supports_push_notifications: Option<bool>,
}

/// A skill the agent advertises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    /// Identifier unique within the agent.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// What the skill does.
    pub description: String,

    /// JSON Schema of the expected input, if declared.
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,

    /// JSON Schema of the produced output, if declared.
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

/// The A2A Agent Card: metadata a client needs to locate, authenticate to,
/// and understand a remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    /// Version of the Agent Card schema itself.
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,

    /// User-friendly unique identifier, shaped `org/agent`.
    #[serde(rename = "humanReadableId")]
    pub human_readable_id: String,

    /// Version of the agent software.
    #[serde(rename = "agentVersion")]
    pub agent_version: String,

    /// Display name.
    pub name: String,

    /// Detailed description of purpose and functionality.
    pub description: String,

    /// The A2A JSON-RPC endpoint. HTTPS required except for loopback hosts.
    pub url: String,

    /// Provider information.
    pub provider: AgentProvider,

    /// Protocol capabilities.
    pub capabilities: AgentCapabilities,

    /// Supported authentication schemes; at least one entry.
    #[serde(rename = "authSchemes")]
    pub auth_schemes: Vec<AgentAuthentication>,

    /// Skills the agent possesses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<AgentSkill>>,

    /// Keywords for categorization and discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// Privacy policy URL.
    #[serde(rename = "privacyPolicyUrl", skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,

    /// Terms of service URL.
    #[serde(rename = "termsOfServiceUrl", skip_serializing_if = "Option::is_none")]
    pub terms_of_service_url: Option<String>,

    /// Icon URL.
    #[serde(rename = "iconUrl", skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    /// When the card was last updated (ISO 8601 recommended).
    #[serde(rename = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl AgentCard {
    /// Parse and validate a card from a JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let card: AgentCard = serde_json::from_value(value)
            .map_err(|e| AgentVaultError::AgentCardValidation(e.to_string()))?;
        card.validate()?;
        Ok(card)
    }

    /// Parse and validate a card from a JSON string.
    pub fn parse(json: &str) -> Result<Self> {
        let card: AgentCard = serde_json::from_str(json)
            .map_err(|e| AgentVaultError::AgentCardValidation(e.to_string()))?;
        card.validate()?;
        Ok(card)
    }

    /// Check the schema invariants serde cannot express.
    ///
    /// - `authSchemes` has at least one entry;
    /// - `oauth2` schemes carry a `tokenUrl`;
    /// - `humanReadableId` matches the `org/agent` shape;
    /// - `url` is well-formed and uses HTTPS unless the host is loopback.
    pub fn validate(&self) -> Result<()> {
        if self.auth_schemes.is_empty() {
            return Err(AgentVaultError::AgentCardValidation(
                "authSchemes must contain at least one entry".to_string(),
            ));
        }

        for scheme in &self.auth_schemes {
            if scheme.scheme == AuthScheme::OAuth2 && scheme.token_url.is_none() {
                return Err(AgentVaultError::AgentCardValidation(
                    "'tokenUrl' is required when scheme is 'oauth2'".to_string(),
                ));
            }
        }

        if !human_readable_id_regex().is_match(&self.human_readable_id) {
            return Err(AgentVaultError::AgentCardValidation(format!(
                "humanReadableId '{}' does not match the required 'org/agent' shape",
                self.human_readable_id
            )));
        }

        let parsed = url::Url::parse(&self.url).map_err(|e| {
            AgentVaultError::AgentCardValidation(format!("invalid agent url '{}': {e}", self.url))
        })?;
        if parsed.scheme() != "https" && !is_loopback_host(&parsed) {
            return Err(AgentVaultError::AgentCardValidation(format!(
                "agent url '{}' must use HTTPS unless the host is loopback",
                self.url
            )));
        }

        Ok(())
    }

    /// The auth scheme a client should use: the one matching `preferred`, or
    /// the first advertised scheme.
    pub fn select_auth_scheme(&self, preferred: Option<AuthScheme>) -> Option<&AgentAuthentication> {
        if let Some(kind) = preferred {
            if let Some(found) = self.auth_schemes.iter().find(|s| s.scheme == kind) {
                return Some(found);
            }
        }
        self.auth_schemes.first()
    }

    /// The service identifier for a scheme entry, falling back to the card's
    /// `humanReadableId`.
    pub fn service_identifier_for<'a>(&'a self, scheme: &'a AgentAuthentication) -> &'a str {
        scheme
            .service_identifier
            .as_deref()
            .unwrap_or(&self.human_readable_id)
    }
}

/// Whether the URL's host is a loopback address (`localhost`, `127.0.0.1`,
/// `::1`), where plain HTTP is tolerated.
fn is_loopback_host(url: &url::Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Builder for [`AgentCard`] — mainly for agents constructing their own card
/// and for tests.
///
/// `build()` runs the same validation as parsing.
#[derive(Debug, Clone)]
pub struct AgentCardBuilder {
    name: String,
    human_readable_id: String,
    url: String,
    description: String,
    agent_version: String,
    schema_version: String,
    a2a_version: String,
    provider_name: String,
    auth_schemes: Vec<AgentAuthentication>,
    skills: Vec<AgentSkill>,
    tags: Vec<String>,
    supports_push_notifications: Option<bool>,
}

impl AgentCardBuilder {
    /// Start a builder from the three fields with no sensible defaults.
    pub fn new(
        name: impl Into<String>,
        human_readable_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            human_readable_id: human_readable_id.into(),
            url: url.into(),
            description: String::new(),
            agent_version: "0.1.0".to_string(),
            schema_version: "1.0".to_string(),
            a2a_version: "1.0".to_string(),
            provider_name: "unknown".to_string(),
            auth_schemes: Vec::new(),
            skills: Vec::new(),
            tags: Vec::new(),
            supports_push_notifications: None,
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the agent software version.
    pub fn agent_version(mut self, version: impl Into<String>) -> Self {
        self.agent_version = version.into();
        self
    }

    /// Set the provider name.
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    /// Add an auth scheme entry.
    pub fn auth_scheme(mut self, scheme: AgentAuthentication) -> Self {
        self.auth_schemes.push(scheme);
        self
    }

    /// Add a skill entry.
    pub fn skill(mut self, skill: AgentSkill) -> Self {
        self.skills.push(skill);
        self
    }

    /// Add a discovery tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Advertise push notification support.
    pub fn supports_push_notifications(mut self, supported: bool) -> Self {
        self.supports_push_notifications = Some(supported);
        self
    }

    /// Assemble and validate the card. Defaults to the `none` auth scheme if
    /// no scheme was added.
    pub fn build(self) -> Result<AgentCard> {
        let auth_schemes = if self.auth_schemes.is_empty() {
            vec![AgentAuthentication::none()]
        } else {
            self.auth_schemes
        };

        let card = AgentCard {
            schema_version: self.schema_version,
            human_readable_id: self.human_readable_id,
            agent_version: self.agent_version,
            name: self.name,
            description: self.description,
            url: self.url,
            provider: AgentProvider {
                name: self.provider_name,
                url: None,
                support_contact: None,
            },
            capabilities: AgentCapabilities {
                a2a_version: self.a2a_version,
                mcp_version: None,
                supported_message_parts: None,
                tee_details: None,
                supports_push_notifications: self.supports_push_notifications,
            },
            auth_schemes,
            skills: if self.skills.is_empty() {
                None
            } else {
                Some(self.skills)
            },
            tags: if self.tags.is_empty() {
                None
            } else {
                Some(self.tags)
            },
            privacy_policy_url: None,
            terms_of_service_url: None,
            icon_url: None,
            last_updated: None,
        };
        card.validate()?;
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_card_json() -> serde_json::Value {
        serde_json::json!({
            "schemaVersion": "1.0",
            "humanReadableId": "example-org/echo",
            "agentVersion": "0.1.0",
            "name": "Echo Agent",
            "description": "Echoes messages back.",
            "url": "https://agents.example.com/a2a",
            "provider": {"name": "Example Org"},
            "capabilities": {"a2aVersion": "1.0"},
            "authSchemes": [{"scheme": "none"}]
        })
    }

    #[test]
    fn minimal_card_parses() {
        let card = AgentCard::from_value(minimal_card_json()).unwrap();
        assert_eq!(card.human_readable_id, "example-org/echo");
        assert_eq!(card.auth_schemes[0].scheme, AuthScheme::None);
    }

    #[test]
    fn empty_auth_schemes_rejected() {
        let mut json = minimal_card_json();
        json["authSchemes"] = serde_json::json!([]);
        let err = AgentCard::from_value(json).unwrap_err();
        assert!(matches!(err, AgentVaultError::AgentCardValidation(_)));
    }

    #[test]
    fn oauth2_without_token_url_rejected() {
        let mut json = minimal_card_json();
        json["authSchemes"] = serde_json::json!([{"scheme": "oauth2"}]);
        let err = AgentCard::from_value(json).unwrap_err();
        assert!(matches!(err, AgentVaultError::AgentCardValidation(_)));
    }

    #[test]
    fn malformed_human_readable_id_rejected() {
        for bad in ["NoSlash", "Upper/case", "-leading/agent", "org/"] {
            let mut json = minimal_card_json();
            json["humanReadableId"] = serde_json::json!(bad);
            assert!(
                AgentCard::from_value(json).is_err(),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn http_allowed_only_for_loopback() {
        let mut json = minimal_card_json();
        json["url"] = serde_json::json!("http://localhost:8000/a2a");
        assert!(AgentCard::from_value(json.clone()).is_ok());

        json["url"] = serde_json::json!("http://127.0.0.1:8000/a2a");
        assert!(AgentCard::from_value(json.clone()).is_ok());

        json["url"] = serde_json::json!("http://agents.example.com/a2a");
        assert!(AgentCard::from_value(json).is_err());
    }

    #[test]
    fn parse_then_serialize_is_identity_modulo_ordering() {
        let original = minimal_card_json();
        let card = AgentCard::from_value(original.clone()).unwrap();
        let back = serde_json::to_value(&card).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn scheme_selection_prefers_requested_kind() {
        let card = AgentCardBuilder::new("A", "org/a", "https://a.example.com")
            .auth_scheme(AgentAuthentication::api_key("svc"))
            .auth_scheme(AgentAuthentication::none())
            .build()
            .unwrap();

        let chosen = card.select_auth_scheme(Some(AuthScheme::None)).unwrap();
        assert_eq!(chosen.scheme, AuthScheme::None);

        let default = card.select_auth_scheme(None).unwrap();
        assert_eq!(default.scheme, AuthScheme::ApiKey);
    }

    #[test]
    fn service_identifier_falls_back_to_card_id() {
        let card = AgentCardBuilder::new("A", "org/a", "https://a.example.com")
            .auth_scheme(AgentAuthentication {
                scheme: AuthScheme::ApiKey,
                description: None,
                token_url: None,
                scopes: None,
                service_identifier: None,
            })
            .build()
            .unwrap();
        let scheme = &card.auth_schemes[0];
        assert_eq!(card.service_identifier_for(scheme), "org/a");
    }
}
