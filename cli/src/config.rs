//! hubctl configuration
//!
//! ```toml
//! data_dir = "./data"
//!
//! [lifecycle]
//! expiry_warning_days = 7
//! invoice_due_days = 14
//!
//! [router]
//! enabled = true
//! host = "10.0.0.1"
//! password = "<output of hubctl settings encrypt-password>"
//!
//! [worker]
//! lifecycle_interval_secs = 3600
//! ```

use anyhow::Context;
use hub_billing::LifecycleConfig;
use hub_netsync::{MasterKey, RouterSettings, SettingsHandle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "hubspace.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub data_dir: PathBuf,
    pub lifecycle: LifecycleConfig,
    pub router: RouterSettings,
    pub worker: WorkerConfig,
    pub locks: LockConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            lifecycle: LifecycleConfig::default(),
            router: RouterSettings::default(),
            worker: WorkerConfig::default(),
            locks: LockConfig::default(),
        }
    }
}

/// `[worker]` section for `hubctl run`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub lifecycle_interval_secs: u64,
    pub sync_interval_secs: u64,
    pub sync_shards: usize,
    pub event_shards: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lifecycle_interval_secs: 3600,
            sync_interval_secs: 900,
            sync_shards: hub_netsync::DEFAULT_SYNC_SHARDS,
            event_shards: 4,
        }
    }
}

impl WorkerConfig {
    pub fn lifecycle_interval(&self) -> Duration {
        Duration::from_secs(self.lifecycle_interval_secs.max(1))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }
}

/// `[locks]` section; TTLs sit slightly above the expected run time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub lifecycle_ttl_secs: u64,
    pub router_sync_ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lifecycle_ttl_secs: 600,
            router_sync_ttl_secs: 900,
        }
    }
}

impl LockConfig {
    pub fn lifecycle_ttl(&self) -> Duration {
        Duration::from_secs(self.lifecycle_ttl_secs)
    }

    pub fn router_sync_ttl(&self) -> Duration {
        Duration::from_secs(self.router_sync_ttl_secs)
    }
}

impl HubConfig {
    /// Read `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config not found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.lifecycle.validate()?;
        Ok(config)
    }

    /// Router settings with the password decrypted by `HUB_MASTER_KEY`
    pub fn router_settings(&self) -> anyhow::Result<RouterSettings> {
        let key = MasterKey::from_env()?;
        let settings = self.router.clone().unseal(key.as_ref())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Live settings handle for this config
    pub fn settings_handle(&self) -> anyhow::Result<SettingsHandle> {
        Ok(SettingsHandle::new(self.router_settings()?))
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn sync_log_path(&self) -> PathBuf {
        self.data_dir.join("network_sync_log.jsonl")
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.data_dir.join("locks")
    }
}
