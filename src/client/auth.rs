//! Client-side authentication resolution.
//!
//! Turns an agent card's advertised auth schemes plus the key manager's
//! credentials into concrete HTTP headers:
//! - `none` — no headers;
//! - `apiKey` — `X-Api-Key: {key}`;
//! - `bearer` — `Authorization: Bearer {key}`;
//! - `oauth2` — client-credentials grant against the card's `tokenUrl`,
//!   with per-service token caching and a single invalidate-and-retry on a
//!   401 from the agent.
//!
//! Key-manager failures surface as [`Authentication`] errors so callers can
//! present configuration help rather than a transport diagnostic.
//!
//! [`Authentication`]: AgentVaultError::Authentication

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::card::{AgentAuthentication, AgentCard, AuthScheme};
use crate::error::{AgentVaultError, Result};
use crate::keys::KeyManager;

/// Header carrying API keys.
const API_KEY_HEADER: &str = "X-Api-Key";

/// Tokens are refreshed this long before their reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// `None` when the token endpoint reported no `expires_in`.
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

/// Per-session cache of OAuth2 access tokens, keyed by service identifier
/// and token endpoint.
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(service_id: &str, token_url: &str) -> String {
        format!("{service_id}|{token_url}")
    }

    async fn get(&self, service_id: &str, token_url: &str) -> Option<String> {
        let tokens = self.tokens.lock().await;
        tokens
            .get(&Self::key(service_id, token_url))
            .filter(|t| t.is_fresh())
            .map(|t| t.access_token.clone())
    }

    async fn put(&self, service_id: &str, token_url: &str, token: CachedToken) {
        self.tokens
            .lock()
            .await
            .insert(Self::key(service_id, token_url), token);
    }

    /// Drop the cached token for a service, forcing a refresh on next use.
    pub async fn invalidate(&self, service_id: &str, token_url: &str) {
        debug!(service = %service_id, "invalidating cached OAuth token");
        self.tokens
            .lock()
            .await
            .remove(&Self::key(service_id, token_url));
    }
}

/// The auth decision for one request: the headers to attach plus what would
/// need invalidating on a 401.
#[derive(Debug)]
pub(crate) struct ResolvedAuth {
    pub headers: HeaderMap,
    /// `(service_id, token_url)` when the request uses a cached OAuth token.
    pub oauth_identity: Option<(String, String)>,
}

/// Resolve authentication headers for a request to the carded agent.
pub(crate) async fn resolve_auth(
    http: &reqwest::Client,
    card: &AgentCard,
    key_manager: &KeyManager,
    cache: &TokenCache,
    preferred: Option<AuthScheme>,
) -> Result<ResolvedAuth> {
    let scheme = card.select_auth_scheme(preferred).ok_or_else(|| {
        AgentVaultError::Authentication(format!(
            "agent '{}' advertises no authentication schemes",
            card.human_readable_id
        ))
    })?;

    match scheme.scheme {
        AuthScheme::None => {
            debug!(agent = %card.human_readable_id, "using 'none' authentication scheme");
            Ok(ResolvedAuth {
                headers: HeaderMap::new(),
                oauth_identity: None,
            })
        }
        AuthScheme::ApiKey => {
            let key = require_key(card, key_manager, scheme, "apiKey")?;
            let mut headers = HeaderMap::new();
            headers.insert(
                API_KEY_HEADER,
                header_value(&key, "API key")?,
            );
            Ok(ResolvedAuth {
                headers,
                oauth_identity: None,
            })
        }
        AuthScheme::Bearer => {
            let key = require_key(card, key_manager, scheme, "bearer")?;
            let mut headers = HeaderMap::new();
            headers.insert(
                AUTHORIZATION,
                header_value(&format!("Bearer {key}"), "bearer token")?,
            );
            Ok(ResolvedAuth {
                headers,
                oauth_identity: None,
            })
        }
        AuthScheme::OAuth2 => {
            let service_id = card.service_identifier_for(scheme).to_string();
            let token_url = scheme.token_url.clone().ok_or_else(|| {
                AgentVaultError::Authentication(format!(
                    "oauth2 scheme for agent '{}' has no tokenUrl",
                    card.human_readable_id
                ))
            })?;

            let token = match cache.get(&service_id, &token_url).await {
                Some(token) => token,
                None => fetch_token(http, key_manager, cache, &service_id, &token_url).await?,
            };

            let mut headers = HeaderMap::new();
            headers.insert(
                AUTHORIZATION,
                header_value(&format!("Bearer {token}"), "access token")?,
            );
            Ok(ResolvedAuth {
                headers,
                oauth_identity: Some((service_id, token_url)),
            })
        }
    }
}

/// Look up the API key / bearer secret for a scheme, with a configuration
/// hint in the error when it is missing.
fn require_key(
    card: &AgentCard,
    key_manager: &KeyManager,
    scheme: &AgentAuthentication,
    scheme_name: &str,
) -> Result<String> {
    let service_id = card.service_identifier_for(scheme);
    let key = key_manager
        .get_key(service_id)
        .map_err(|e| AgentVaultError::Authentication(format!("authentication failed: {e}")))?;
    key.ok_or_else(|| {
        AgentVaultError::Authentication(format!(
            "missing key for service '{service_id}' required by agent '{}' (scheme: {scheme_name}); \
             configure it via AGENTVAULT_KEY_{} or a key file",
            card.human_readable_id,
            service_id.to_uppercase()
        ))
    })
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| AgentVaultError::Authentication(format!("{what} contains invalid header characters")))
}

/// Shape of the token endpoint's success response.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Run the client-credentials grant and cache the result.
async fn fetch_token(
    http: &reqwest::Client,
    key_manager: &KeyManager,
    cache: &TokenCache,
    service_id: &str,
    token_url: &str,
) -> Result<String> {
    let client_id = key_manager
        .get_oauth_client_id(service_id)
        .map_err(|e| AgentVaultError::Authentication(format!("authentication failed: {e}")))?
        .ok_or_else(|| missing_oauth_error(service_id, "client ID"))?;
    let client_secret = key_manager
        .get_oauth_client_secret(service_id)
        .map_err(|e| AgentVaultError::Authentication(format!("authentication failed: {e}")))?
        .ok_or_else(|| missing_oauth_error(service_id, "client secret"))?;

    debug!(service = %service_id, token_url = %token_url, "requesting OAuth access token");

    let response = http
        .post(token_url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ])
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                AgentVaultError::Timeout(format!("token request to {token_url} timed out: {e}"))
            } else {
                AgentVaultError::Connection(format!("token request to {token_url} failed: {e}"))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(service = %service_id, status = %status, "token endpoint rejected credentials");
        return Err(AgentVaultError::Authentication(format!(
            "token endpoint {token_url} rejected client credentials for '{service_id}' \
             (HTTP {status}): {body}"
        )));
    }

    let token: TokenResponse = response.json().await.map_err(|e| {
        AgentVaultError::Authentication(format!(
            "invalid token response from {token_url}: {e}"
        ))
    })?;

    let expires_at = token
        .expires_in
        .map(|secs| Instant::now() + Duration::from_secs(secs).saturating_sub(TOKEN_EXPIRY_MARGIN));
    cache
        .put(
            service_id,
            token_url,
            CachedToken {
                access_token: token.access_token.clone(),
                expires_at,
            },
        )
        .await;

    Ok(token.access_token)
}

fn missing_oauth_error(service_id: &str, half: &str) -> AgentVaultError {
    AgentVaultError::Authentication(format!(
        "missing OAuth {half} for service '{service_id}'; configure \
         AGENTVAULT_OAUTH_{}_CLIENT_ID and AGENTVAULT_OAUTH_{}_CLIENT_SECRET",
        service_id.to_uppercase(),
        service_id.to_uppercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::AgentCardBuilder;
    use crate::keys::{KeyManager, KeyManagerConfig, MemorySecretBackend};

    fn key_manager_with(service: &str, key: &str) -> KeyManager {
        let backend = MemorySecretBackend::new();
        backend.insert(&format!("agentvault:{service}"), service, key);
        KeyManager::with_backend(
            KeyManagerConfig {
                key_file_path: None,
                use_env: false,
                use_keyring: true,
            },
            Box::new(backend),
        )
    }

    fn empty_key_manager() -> KeyManager {
        KeyManager::new(KeyManagerConfig {
            key_file_path: None,
            use_env: false,
            use_keyring: false,
        })
    }

    #[tokio::test]
    async fn none_scheme_yields_no_headers() {
        let card = AgentCardBuilder::new("A", "org/a", "https://a.example.com")
            .build()
            .unwrap();
        let resolved = resolve_auth(
            &reqwest::Client::new(),
            &card,
            &empty_key_manager(),
            &TokenCache::new(),
            None,
        )
        .await
        .unwrap();
        assert!(resolved.headers.is_empty());
        assert!(resolved.oauth_identity.is_none());
    }

    #[tokio::test]
    async fn api_key_scheme_sets_x_api_key() {
        let card = AgentCardBuilder::new("A", "org/a", "https://a.example.com")
            .auth_scheme(crate::card::AgentAuthentication::api_key("foo"))
            .build()
            .unwrap();
        let km = key_manager_with("foo", "abc");
        let resolved = resolve_auth(
            &reqwest::Client::new(),
            &card,
            &km,
            &TokenCache::new(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(resolved.headers.get("X-Api-Key").unwrap(), "abc");
    }

    #[tokio::test]
    async fn bearer_scheme_sets_authorization() {
        let card = AgentCardBuilder::new("A", "org/a", "https://a.example.com")
            .auth_scheme(crate::card::AgentAuthentication {
                scheme: AuthScheme::Bearer,
                description: None,
                token_url: None,
                scopes: None,
                service_identifier: Some("foo".into()),
            })
            .build()
            .unwrap();
        let km = key_manager_with("foo", "tok123");
        let resolved = resolve_auth(
            &reqwest::Client::new(),
            &card,
            &km,
            &TokenCache::new(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(
            resolved.headers.get(AUTHORIZATION).unwrap(),
            "Bearer tok123"
        );
    }

    #[tokio::test]
    async fn missing_key_is_authentication_error() {
        let card = AgentCardBuilder::new("A", "org/a", "https://a.example.com")
            .auth_scheme(crate::card::AgentAuthentication::api_key("absent"))
            .build()
            .unwrap();
        let err = resolve_auth(
            &reqwest::Client::new(),
            &card,
            &empty_key_manager(),
            &TokenCache::new(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentVaultError::Authentication(_)));
        assert!(err.to_string().contains("AGENTVAULT_KEY_ABSENT"));
    }

    #[tokio::test]
    async fn token_cache_respects_expiry() {
        let cache = TokenCache::new();
        cache
            .put(
                "svc",
                "https://idp.test/token",
                CachedToken {
                    access_token: "stale".into(),
                    expires_at: Some(Instant::now() - Duration::from_secs(1)),
                },
            )
            .await;
        assert!(cache.get("svc", "https://idp.test/token").await.is_none());

        cache
            .put(
                "svc",
                "https://idp.test/token",
                CachedToken {
                    access_token: "fresh".into(),
                    expires_at: None,
                },
            )
            .await;
        assert_eq!(
            cache.get("svc", "https://idp.test/token").await.as_deref(),
            Some("fresh")
        );

        cache.invalidate("svc", "https://idp.test/token").await;
        assert!(cache.get("svc", "https://idp.test/token").await.is_none());
    }
}
