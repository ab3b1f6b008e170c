//! Secret backends — the pluggable storage behind the key manager's
//! keyring layer.
//!
//! Three implementations: the OS keyring (via the `keyring` crate), an
//! in-memory map for tests, and a disabled backend that always misses.
//! Construction-time capability detection picks the right one; an absent or
//! broken OS keyring downgrades to the disabled backend with a warning
//! rather than failing.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{AgentVaultError, Result};

/// Storage interface for secrets addressed by `(service, username)`.
///
/// Mirrors the OS keyring addressing model; the key manager layers its
/// `agentvault:{service}` naming convention on top.
pub trait SecretBackend: Send + Sync {
    /// Look up a secret. `Ok(None)` means "not stored" — not an error.
    fn get(&self, service: &str, username: &str) -> Result<Option<String>>;

    /// Store or replace a secret.
    fn set(&self, service: &str, username: &str, value: &str) -> Result<()>;

    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Backend over the operating system's secret store.
pub struct OsKeyringBackend;

impl OsKeyringBackend {
    /// Check whether the OS secret store is usable on this machine.
    ///
    /// A lookup miss is a healthy outcome; platform errors (no DBus secret
    /// service, locked keychain) mean the backend should not be used.
    pub fn probe() -> Result<()> {
        let entry = keyring::Entry::new("agentvault:probe", "probe")
            .map_err(|e| AgentVaultError::KeyManagement(format!("keyring unavailable: {e}")))?;
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AgentVaultError::KeyManagement(format!(
                "keyring backend failed to initialize: {e}"
            ))),
        }
    }
}

impl SecretBackend for OsKeyringBackend {
    fn get(&self, service: &str, username: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(service, username)
            .map_err(|e| AgentVaultError::KeyManagement(format!("keyring error: {e}")))?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AgentVaultError::KeyManagement(format!(
                "failed to read secret for service '{service}': {e}"
            ))),
        }
    }

    fn set(&self, service: &str, username: &str, value: &str) -> Result<()> {
        let entry = keyring::Entry::new(service, username)
            .map_err(|e| AgentVaultError::KeyManagement(format!("keyring error: {e}")))?;
        entry.set_password(value).map_err(|e| {
            AgentVaultError::KeyManagement(format!(
                "failed to store secret for service '{service}': {e}"
            ))
        })
    }

    fn name(&self) -> &'static str {
        "os-keyring"
    }
}

/// In-memory backend for tests.
#[derive(Default)]
pub struct MemorySecretBackend {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemorySecretBackend {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a secret, for test setup.
    pub fn insert(&self, service: &str, username: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert((service.to_string(), username.to_string()), value.to_string());
    }
}

impl SecretBackend for MemorySecretBackend {
    fn get(&self, service: &str, username: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(&(service.to_string(), username.to_string()))
            .cloned())
    }

    fn set(&self, service: &str, username: &str, value: &str) -> Result<()> {
        debug!(service = %service, "storing secret in memory backend");
        self.insert(service, username, value);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Backend used when keyring support is off or unavailable: lookups always
/// miss; writes error out.
pub struct DisabledSecretBackend;

impl SecretBackend for DisabledSecretBackend {
    fn get(&self, _service: &str, _username: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn set(&self, service: &str, _username: &str, _value: &str) -> Result<()> {
        Err(AgentVaultError::KeyManagement(format!(
            "keyring support is not enabled; cannot store secret for service '{service}'"
        )))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
