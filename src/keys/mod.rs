//! Key manager — resolves per-service API keys and OAuth client credentials
//! from key files, environment variables, and the OS secret store.
//!
//! Priority order for loading keys (highest to lowest):
//! 1. Key file (`.env` or `.json`)
//! 2. Environment variables
//! 3. OS keyring — queried lazily on the first `get_key` miss and cached
//!
//! Service identifiers are always compared lower-cased. Load failures are
//! logged and non-fatal: a store with a corrupt file still serves env and
//! keyring entries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, info, warn};

use crate::error::{AgentVaultError, Result};

pub mod backend;

pub use backend::{DisabledSecretBackend, MemorySecretBackend, OsKeyringBackend, SecretBackend};

/// Environment variable prefix for API keys: `AGENTVAULT_KEY_{SERVICE}`.
const ENV_KEY_PREFIX: &str = "AGENTVAULT_KEY_";

/// Environment variable prefix for OAuth credentials:
/// `AGENTVAULT_OAUTH_{SERVICE}_CLIENT_ID` / `_CLIENT_SECRET`.
const ENV_OAUTH_PREFIX: &str = "AGENTVAULT_OAUTH_";

const ENV_OAUTH_ID_SUFFIX: &str = "_CLIENT_ID";
const ENV_OAUTH_SECRET_SUFFIX: &str = "_CLIENT_SECRET";

/// Where a credential was loaded from, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Loaded from the configured key file.
    File,
    /// Loaded from an environment variable.
    Env,
    /// Loaded lazily from the OS keyring.
    Keyring,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::File => write!(f, "file"),
            KeySource::Env => write!(f, "env"),
            KeySource::Keyring => write!(f, "keyring"),
        }
    }
}

/// Configuration status of a service's OAuth client credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthStatus {
    /// Neither client ID nor secret is available.
    NotConfigured,
    /// Only one half of the pair is available.
    Partial,
    /// Both client ID and client secret are available.
    Complete,
}

/// Construction options for [`KeyManager`].
#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    /// Optional key file, `.env` or `.json` by extension.
    pub key_file_path: Option<PathBuf>,
    /// Whether to load `AGENTVAULT_*` environment variables.
    pub use_env: bool,
    /// Whether to consult the OS keyring on lookup misses.
    pub use_keyring: bool,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            key_file_path: None,
            use_env: true,
            use_keyring: false,
        }
    }
}

/// Loads and serves API keys and OAuth client credentials.
///
/// Caches are read-mostly; keyring hits are cached on first access. All
/// lookups normalise the service identifier to lowercase.
pub struct KeyManager {
    keys: RwLock<HashMap<String, String>>,
    key_sources: RwLock<HashMap<String, KeySource>>,
    oauth_ids: RwLock<HashMap<String, String>>,
    oauth_secrets: RwLock<HashMap<String, String>>,
    oauth_sources: RwLock<HashMap<String, KeySource>>,
    use_keyring: bool,
    backend: Box<dyn SecretBackend>,
}

impl KeyManager {
    /// Build a key manager from configuration, probing the OS keyring when
    /// requested. A failed probe disables keyring support with a warning
    /// instead of erroring; later `set_key_in_keyring` calls then fail.
    pub fn new(config: KeyManagerConfig) -> Self {
        let (use_keyring, backend): (bool, Box<dyn SecretBackend>) = if config.use_keyring {
            match OsKeyringBackend::probe() {
                Ok(()) => {
                    debug!("keyring backend check successful, keyring enabled");
                    (true, Box::new(OsKeyringBackend))
                }
                Err(e) => {
                    warn!(error = %e, "keyring requested but unavailable, disabling keyring support");
                    (false, Box::new(DisabledSecretBackend))
                }
            }
        } else {
            (false, Box::new(DisabledSecretBackend))
        };

        Self::build(config, use_keyring, backend)
    }

    /// Build a key manager over an explicit secret backend (tests use
    /// [`MemorySecretBackend`]). The keyring layer is considered enabled.
    pub fn with_backend(config: KeyManagerConfig, backend: Box<dyn SecretBackend>) -> Self {
        Self::build(config, true, backend)
    }

    fn build(config: KeyManagerConfig, use_keyring: bool, backend: Box<dyn SecretBackend>) -> Self {
        let manager = Self {
            keys: RwLock::new(HashMap::new()),
            key_sources: RwLock::new(HashMap::new()),
            oauth_ids: RwLock::new(HashMap::new()),
            oauth_secrets: RwLock::new(HashMap::new()),
            oauth_sources: RwLock::new(HashMap::new()),
            use_keyring,
            backend,
        };

        if let Some(ref path) = config.key_file_path {
            manager.load_from_file(path);
        }
        if config.use_env {
            manager.load_from_env();
        }
        manager
    }

    /// Whether the keyring layer is active.
    pub fn keyring_enabled(&self) -> bool {
        self.use_keyring
    }

    // ---- loading -----------------------------------------------------------

    fn load_from_file(&self, path: &PathBuf) {
        if !path.exists() {
            warn!(path = %path.display(), "key file specified but not found");
            return;
        }
        if !path.is_file() {
            warn!(path = %path.display(), "key file path is not a file");
            return;
        }

        match path.extension().and_then(|e| e.to_str()) {
            Some("env") => self.load_env_file(path),
            Some("json") => self.load_json_file(path),
            other => {
                warn!(
                    path = %path.display(),
                    extension = ?other,
                    "unsupported key file extension, only .env and .json are supported"
                );
            }
        }
    }

    fn load_env_file(&self, path: &PathBuf) {
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read .env key file");
                return;
            }
        };

        let mut loaded = 0usize;
        for item in iter {
            let (key, value) = match item {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed .env line");
                    continue;
                }
            };
            if value.is_empty() {
                warn!(key = %key, "skipping empty value in key file");
                continue;
            }
            self.store_key(&key.to_lowercase(), value, KeySource::File);
            loaded += 1;
        }
        debug!(path = %path.display(), loaded, "finished loading .env key file");
    }

    fn load_json_file(&self, path: &PathBuf) {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read JSON key file");
                return;
            }
        };
        let data: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse JSON key file");
                return;
            }
        };
        let object = match data.as_object() {
            Some(obj) => obj,
            None => {
                warn!(path = %path.display(), "JSON key file root must be an object");
                return;
            }
        };

        for (service, value) in object {
            let normalized = service.to_lowercase();
            match value {
                serde_json::Value::String(key) => {
                    if key.is_empty() {
                        warn!(service = %normalized, "skipping empty API key in key file");
                    } else {
                        self.store_key(&normalized, key.clone(), KeySource::File);
                    }
                }
                serde_json::Value::Object(entry) => {
                    if let Some(key) = entry.get("apiKey").and_then(|v| v.as_str()) {
                        if !key.is_empty() {
                            self.store_key(&normalized, key.to_string(), KeySource::File);
                        }
                    }
                    if let Some(oauth) = entry.get("oauth") {
                        let client_id = oauth.get("clientId").and_then(|v| v.as_str());
                        let client_secret = oauth.get("clientSecret").and_then(|v| v.as_str());
                        match (client_id, client_secret) {
                            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                                self.store_oauth(
                                    &normalized,
                                    id.to_string(),
                                    secret.to_string(),
                                    KeySource::File,
                                );
                            }
                            (None, None) => {}
                            _ => warn!(
                                service = %normalized,
                                "incomplete oauth entry in key file, both clientId and clientSecret are required"
                            ),
                        }
                    }
                }
                _ => warn!(
                    service = %normalized,
                    "skipping unsupported value type in JSON key file"
                ),
            }
        }
    }

    fn load_from_env(&self) {
        // Half-configured OAuth pairs are collected first so they can be
        // reported rather than silently dropped.
        let mut oauth_ids: HashMap<String, String> = HashMap::new();
        let mut oauth_secrets: HashMap<String, String> = HashMap::new();

        for (name, value) in std::env::vars() {
            if let Some(service_part) = name.strip_prefix(ENV_KEY_PREFIX) {
                if service_part.is_empty() {
                    warn!(variable = %name, "skipping env variable with empty service id");
                    continue;
                }
                if value.is_empty() {
                    warn!(variable = %name, "skipping env variable with empty value");
                    continue;
                }
                self.store_key_if_absent(&service_part.to_lowercase(), value, KeySource::Env);
            } else if let Some(rest) = name.strip_prefix(ENV_OAUTH_PREFIX) {
                if value.is_empty() {
                    warn!(variable = %name, "skipping env variable with empty value");
                    continue;
                }
                if let Some(service) = rest.strip_suffix(ENV_OAUTH_ID_SUFFIX) {
                    if !service.is_empty() {
                        oauth_ids.insert(service.to_lowercase(), value);
                    }
                } else if let Some(service) = rest.strip_suffix(ENV_OAUTH_SECRET_SUFFIX) {
                    if !service.is_empty() {
                        oauth_secrets.insert(service.to_lowercase(), value);
                    }
                }
            }
        }

        for (service, id) in oauth_ids {
            match oauth_secrets.remove(&service) {
                Some(secret) => self.store_oauth_if_absent(&service, id, secret, KeySource::Env),
                None => warn!(
                    service = %service,
                    "found OAuth client ID in environment without a matching client secret"
                ),
            }
        }
        for service in oauth_secrets.keys() {
            warn!(
                service = %service,
                "found OAuth client secret in environment without a matching client ID"
            );
        }
    }

    fn store_key(&self, service: &str, value: String, source: KeySource) {
        let mut keys = self.keys.write().unwrap();
        let mut sources = self.key_sources.write().unwrap();
        if let Some(previous) = sources.get(service) {
            debug!(service = %service, previous = %previous, new = %source, "overwriting key");
        }
        info!(service = %service, source = %source, "loaded API key");
        keys.insert(service.to_string(), value);
        sources.insert(service.to_string(), source);
    }

    fn store_key_if_absent(&self, service: &str, value: String, source: KeySource) {
        {
            let keys = self.keys.read().unwrap();
            if keys.contains_key(service) {
                debug!(service = %service, "key already loaded from a higher-priority source");
                return;
            }
        }
        self.store_key(service, value, source);
    }

    fn store_oauth(&self, service: &str, id: String, secret: String, source: KeySource) {
        info!(service = %service, source = %source, "loaded OAuth client credentials");
        self.oauth_ids
            .write()
            .unwrap()
            .insert(service.to_string(), id);
        self.oauth_secrets
            .write()
            .unwrap()
            .insert(service.to_string(), secret);
        self.oauth_sources
            .write()
            .unwrap()
            .insert(service.to_string(), source);
    }

    fn store_oauth_if_absent(&self, service: &str, id: String, secret: String, source: KeySource) {
        {
            let ids = self.oauth_ids.read().unwrap();
            if ids.contains_key(service) {
                debug!(service = %service, "oauth credentials already loaded from a higher-priority source");
                return;
            }
        }
        self.store_oauth(service, id, secret, source);
    }

    // ---- lookups -----------------------------------------------------------

    /// Retrieve the API key for a service, consulting file/env caches first
    /// and then the keyring (caching a hit). Unknown services yield
    /// `Ok(None)`.
    pub fn get_key(&self, service_id: &str) -> Result<Option<String>> {
        let normalized = service_id.to_lowercase();

        if let Some(value) = self.keys.read().unwrap().get(&normalized) {
            return Ok(Some(value.clone()));
        }

        if self.use_keyring {
            debug!(service = %normalized, "key not cached, querying keyring");
            let service_name = format!("agentvault:{normalized}");
            match self.backend.get(&service_name, &normalized) {
                Ok(Some(value)) => {
                    self.store_key(&normalized, value.clone(), KeySource::Keyring);
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(e) => {
                    // A keyring read failure is a miss, not a hard error.
                    warn!(service = %normalized, error = %e, "keyring lookup failed");
                }
            }
        }

        debug!(service = %normalized, "key not found in any configured source");
        Ok(None)
    }

    /// The source the service's API key was loaded from, if any.
    pub fn get_key_source(&self, service_id: &str) -> Option<KeySource> {
        self.key_sources
            .read()
            .unwrap()
            .get(&service_id.to_lowercase())
            .copied()
    }

    /// Retrieve the OAuth client ID for a service.
    pub fn get_oauth_client_id(&self, service_id: &str) -> Result<Option<String>> {
        self.get_oauth_half(service_id, true)
    }

    /// Retrieve the OAuth client secret for a service.
    pub fn get_oauth_client_secret(&self, service_id: &str) -> Result<Option<String>> {
        self.get_oauth_half(service_id, false)
    }

    fn get_oauth_half(&self, service_id: &str, want_id: bool) -> Result<Option<String>> {
        let normalized = service_id.to_lowercase();

        {
            let cache = if want_id {
                self.oauth_ids.read().unwrap()
            } else {
                self.oauth_secrets.read().unwrap()
            };
            if let Some(value) = cache.get(&normalized) {
                return Ok(Some(value.clone()));
            }
        }

        if self.use_keyring {
            // Keyring only counts as configured when both halves are present.
            let service_name = format!("agentvault:oauth:{normalized}");
            let id = self.backend.get(&service_name, "clientId")?;
            let secret = self.backend.get(&service_name, "clientSecret")?;
            if let (Some(id), Some(secret)) = (id, secret) {
                self.store_oauth(&normalized, id.clone(), secret.clone(), KeySource::Keyring);
                return Ok(Some(if want_id { id } else { secret }));
            }
        }

        Ok(None)
    }

    /// The source the service's OAuth credentials were loaded from, if any.
    pub fn get_oauth_source(&self, service_id: &str) -> Option<KeySource> {
        self.oauth_sources
            .read()
            .unwrap()
            .get(&service_id.to_lowercase())
            .copied()
    }

    /// Configuration status of the service's OAuth credential pair.
    pub fn get_oauth_status(&self, service_id: &str) -> Result<OAuthStatus> {
        let id = self.get_oauth_client_id(service_id)?;
        let secret = self.get_oauth_client_secret(service_id)?;
        Ok(match (id, secret) {
            (Some(_), Some(_)) => OAuthStatus::Complete,
            (None, None) => OAuthStatus::NotConfigured,
            _ => OAuthStatus::Partial,
        })
    }

    // ---- keyring writes ----------------------------------------------------

    /// Store an API key in the keyring under `agentvault:{service}`.
    ///
    /// Errors when keyring support is disabled or the write fails.
    pub fn set_key_in_keyring(&self, service_id: &str, key_value: &str) -> Result<()> {
        if !self.use_keyring {
            return Err(AgentVaultError::KeyManagement(
                "keyring support is not enabled for this KeyManager".to_string(),
            ));
        }
        if key_value.is_empty() {
            return Err(AgentVaultError::KeyManagement(
                "key value must be a non-empty string".to_string(),
            ));
        }

        let normalized = service_id.to_lowercase();
        let service_name = format!("agentvault:{normalized}");
        info!(service = %normalized, backend = %self.backend.name(), "storing API key in keyring");
        self.backend.set(&service_name, &normalized, key_value)?;
        self.store_key(&normalized, key_value.to_string(), KeySource::Keyring);
        Ok(())
    }

    /// Store an OAuth client-credential pair in the keyring under
    /// `agentvault:oauth:{service}`.
    pub fn set_oauth_creds_in_keyring(
        &self,
        service_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<()> {
        if !self.use_keyring {
            return Err(AgentVaultError::KeyManagement(
                "keyring support is not enabled for this KeyManager".to_string(),
            ));
        }
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(AgentVaultError::KeyManagement(
                "client ID and client secret must be non-empty".to_string(),
            ));
        }

        let normalized = service_id.to_lowercase();
        let service_name = format!("agentvault:oauth:{normalized}");
        info!(service = %normalized, backend = %self.backend.name(), "storing OAuth credentials in keyring");
        self.backend.set(&service_name, "clientId", client_id)?;
        self.backend.set(&service_name, "clientSecret", client_secret)?;
        self.store_oauth(
            &normalized,
            client_id.to_string(),
            client_secret.to_string(),
            KeySource::Keyring,
        );
        Ok(())
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("use_keyring", &self.use_keyring)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_memory_backend() -> (KeyManager, &'static MemorySecretBackend) {
        // Leak the backend so both the test and the manager can reach it.
        let backend: &'static MemorySecretBackend = Box::leak(Box::new(MemorySecretBackend::new()));
        struct Shared(&'static MemorySecretBackend);
        impl SecretBackend for Shared {
            fn get(&self, service: &str, username: &str) -> Result<Option<String>> {
                self.0.get(service, username)
            }
            fn set(&self, service: &str, username: &str, value: &str) -> Result<()> {
                self.0.set(service, username, value)
            }
            fn name(&self) -> &'static str {
                "memory"
            }
        }
        let config = KeyManagerConfig {
            key_file_path: None,
            use_env: false,
            use_keyring: true,
        };
        (
            KeyManager::with_backend(config, Box::new(Shared(backend))),
            backend,
        )
    }

    #[test]
    fn unknown_service_is_none_not_error() {
        let manager = KeyManager::with_backend(
            KeyManagerConfig {
                key_file_path: None,
                use_env: false,
                use_keyring: false,
            },
            Box::new(DisabledSecretBackend),
        );
        assert!(manager.get_key("nope").unwrap().is_none());
        assert!(manager.get_key_source("nope").is_none());
    }

    #[test]
    fn keyring_hit_is_cached_with_keyring_source() {
        let (manager, backend) = manager_with_memory_backend();
        backend.insert("agentvault:svc", "svc", "from-keyring");

        assert_eq!(
            manager.get_key("SVC").unwrap().as_deref(),
            Some("from-keyring")
        );
        assert_eq!(manager.get_key_source("svc"), Some(KeySource::Keyring));
    }

    #[test]
    fn oauth_keyring_requires_both_halves() {
        let (manager, backend) = manager_with_memory_backend();
        backend.insert("agentvault:oauth:svc", "clientId", "cid");

        // Only half present — keyring not considered configured.
        assert!(manager.get_oauth_client_id("svc").unwrap().is_none());
        assert_eq!(
            manager.get_oauth_status("svc").unwrap(),
            OAuthStatus::NotConfigured
        );

        backend.insert("agentvault:oauth:svc", "clientSecret", "csec");
        assert_eq!(manager.get_oauth_client_id("svc").unwrap().as_deref(), Some("cid"));
        assert_eq!(
            manager.get_oauth_client_secret("svc").unwrap().as_deref(),
            Some("csec")
        );
        assert_eq!(manager.get_oauth_status("svc").unwrap(), OAuthStatus::Complete);
        assert_eq!(manager.get_oauth_source("svc"), Some(KeySource::Keyring));
    }

    #[test]
    fn set_key_requires_keyring_enabled() {
        let disabled = KeyManager::new(KeyManagerConfig {
            key_file_path: None,
            use_env: false,
            use_keyring: false,
        });
        assert!(disabled.set_key_in_keyring("svc", "value").is_err());
    }

    #[test]
    fn set_key_round_trips_through_backend() {
        let (manager, backend) = manager_with_memory_backend();
        manager.set_key_in_keyring("Svc", "value").unwrap();
        assert_eq!(
            backend.get("agentvault:svc", "svc").unwrap().as_deref(),
            Some("value")
        );
        assert_eq!(manager.get_key("svc").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn empty_key_value_rejected() {
        let (manager, _backend) = manager_with_memory_backend();
        assert!(manager.set_key_in_keyring("svc", "").is_err());
    }
}
