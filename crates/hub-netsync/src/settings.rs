//! Router settings and the hot-swappable settings handle
//!
//! Settings are read-mostly. Every sync attempt takes one snapshot with
//! [`SettingsHandle::load`] and uses it to the end, so a concurrent
//! [`SettingsHandle::replace`] never mixes old and new credentials within an
//! attempt while still being visible to the next one.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::MasterKey;
use crate::error::{SyncError, SyncResult};

/// Which router implementation to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterDriver {
    /// MikroTik RouterOS v7 REST API
    #[default]
    Routeros,
    /// In-process simulated router (staging, demos)
    Simulated,
}

/// Retry budget for router calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, first one included
    pub tries: u32,
    /// Fixed delay between attempts
    pub backoff_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            tries: 3,
            backoff_secs: 60,
        }
    }
}

/// Router connection and hotspot provisioning settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub enabled: bool,
    pub driver: RouterDriver,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: String,
    /// Encrypted password as stored in the config file
    #[serde(rename = "password", skip_serializing_if = "Option::is_none")]
    pub password_encrypted: Option<String>,
    /// Decrypted password, never serialized
    #[serde(skip)]
    pub password: String,
    pub timeout_secs: u64,
    pub hotspot_profile: Option<String>,
    pub hotspot_server: Option<String>,
    /// Placeholders: `{phone}`, `{member_code}`, `{email}`, `{id}`
    pub username_template: String,
    pub auto_generate_password: bool,
    pub password_length: usize,
    pub retry: RetrySettings,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            driver: RouterDriver::default(),
            host: "192.168.88.1".to_string(),
            port: 443,
            use_tls: true,
            username: "admin".to_string(),
            password_encrypted: None,
            password: String::new(),
            timeout_secs: 10,
            hotspot_profile: None,
            hotspot_server: None,
            username_template: "{phone}".to_string(),
            auto_generate_password: true,
            password_length: 8,
            retry: RetrySettings::default(),
        }
    }
}

impl std::fmt::Debug for RouterSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterSettings")
            .field("enabled", &self.enabled)
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("hotspot_profile", &self.hotspot_profile)
            .field("hotspot_server", &self.hotspot_server)
            .field("username_template", &self.username_template)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RouterSettings {
    /// Base URL of the router REST API
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Decrypt the stored password into [`RouterSettings::password`]
    pub fn unseal(mut self, key: Option<&MasterKey>) -> SyncResult<Self> {
        if let Some(blob) = self.password_encrypted.as_deref() {
            let key = key.ok_or_else(|| {
                SyncError::Settings(
                    "router password is encrypted but no master key is configured".to_string(),
                )
            })?;
            self.password = String::clone(&*key.decrypt_string(blob)?);
        }
        Ok(self)
    }

    /// Check the settings before they go live
    pub fn validate(&self) -> SyncResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.host.trim().is_empty() {
            return Err(SyncError::Settings("router host is empty".to_string()));
        }
        if self.username_template.trim().is_empty() {
            return Err(SyncError::Settings("username template is empty".to_string()));
        }
        if self.auto_generate_password && !(4..=64).contains(&self.password_length) {
            return Err(SyncError::Settings(format!(
                "password length {} outside 4..=64",
                self.password_length
            )));
        }
        if self.retry.tries == 0 {
            return Err(SyncError::Settings("retry.tries must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Shared, atomically replaceable settings
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<ArcSwap<RouterSettings>>,
}

impl SettingsHandle {
    /// Handle over initial settings
    pub fn new(settings: RouterSettings) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<RouterSettings> {
        self.inner.load_full()
    }

    /// Swap in new settings after validation
    pub fn replace(&self, settings: RouterSettings) -> SyncResult<()> {
        settings.validate()?;
        tracing::info!(
            enabled = settings.enabled,
            host = %settings.host,
            "router settings replaced"
        );
        self.inner.store(Arc::new(settings));
        Ok(())
    }

    /// Apply an edit to a copy of the current settings and swap it in
    pub fn update<F>(&self, edit: F) -> SyncResult<()>
    where
        F: FnOnce(&mut RouterSettings),
    {
        let mut next = (*self.load()).clone();
        edit(&mut next);
        self.replace(next)
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(RouterSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RouterSettings::default();
        assert!(!settings.enabled);
        assert_eq!(settings.timeout(), Duration::from_secs(10));
        assert_eq!(settings.username_template, "{phone}");
        assert_eq!(settings.password_length, 8);
        assert_eq!(settings.retry.tries, 3);
        assert_eq!(settings.retry.backoff_secs, 60);
        assert_eq!(settings.base_url(), "https://192.168.88.1:443");
    }

    #[test]
    fn test_unseal_decrypts_password() {
        let key = MasterKey::generate();
        let settings = RouterSettings {
            password_encrypted: Some(key.encrypt_string("s3cret").unwrap()),
            ..RouterSettings::default()
        };
        let unsealed = settings.clone().unseal(Some(&key)).unwrap();
        assert_eq!(unsealed.password, "s3cret");

        assert!(matches!(settings.unseal(None), Err(SyncError::Settings(_))));
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = RouterSettings {
            password: "hunter2".to_string(),
            ..RouterSettings::default()
        };
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }

    #[test]
    fn test_replace_is_visible_to_later_loads_only() {
        let handle = SettingsHandle::default();
        let before = handle.load();

        handle
            .update(|s| {
                s.enabled = true;
                s.host = "10.0.0.1".to_string();
            })
            .unwrap();

        assert!(!before.enabled);
        assert_eq!(before.host, "192.168.88.1");
        let after = handle.load();
        assert!(after.enabled);
        assert_eq!(after.host, "10.0.0.1");
    }

    #[test]
    fn test_replace_rejects_invalid() {
        let handle = SettingsHandle::default();
        let result = handle.update(|s| {
            s.enabled = true;
            s.retry.tries = 0;
        });
        assert!(result.is_err());
        assert!(!handle.load().enabled);
    }

    #[test]
    fn test_deserialize_partial_toml_section() {
        let settings: RouterSettings = serde_json::from_str(
            r#"{"enabled": true, "host": "10.1.1.1", "port": 8080, "use_tls": false}"#,
        )
        .unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.base_url(), "http://10.1.1.1:8080");
        assert_eq!(settings.retry.tries, 3);
        assert!(settings.password_encrypted.is_none());
    }
}
