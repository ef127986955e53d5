//! Sync configuration file.
//!
//! `config.json` holds the remote credentials and one settings block per
//! entity type:
//!
//! ```json
//! {
//!   "logAll": false,
//!   "remote": { "url": "https://shop.example.com", "consumer_key": "ck_...", "consumer_secret": "cs_..." },
//!   "entities": { "orders": { "direction": "two_way", "limit": 100, "master": false } }
//! }
//! ```
//!
//! Installations that kept their options as flat names (`direction_orders`,
//! `orders_limit`, `logAll`, `master`) go through [`SyncConfig::from_options`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::sync::{SyncDirection, SUPPORTED_ENTITIES};

/// Default page size for both directions.
pub const DEFAULT_LIMIT: u32 = 100;

/// Default HTTP timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Top-level sync configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Write per-record and scan start/end events to the audit log.
    #[serde(default, rename = "logAll")]
    pub log_all: bool,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub entities: BTreeMap<String, EntitySettings>,
}

/// Connection settings for the WooCommerce REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_secret: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: None,
            consumer_key: None,
            consumer_secret: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

const fn default_enabled() -> bool {
    true
}

/// Per-entity sync policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySettings {
    /// Whether `run` touches this entity at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub direction: SyncDirection,
    /// Page size for remote pages and local queries.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// The remote side is authoritative.
    #[serde(default)]
    pub master: bool,
}

impl Default for EntitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            direction: SyncDirection::default(),
            limit: DEFAULT_LIMIT,
            master: false,
        }
    }
}

impl SyncConfig {
    /// Default configuration with a settings block for every supported entity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            entities: SUPPORTED_ENTITIES
                .iter()
                .map(|e| ((*e).to_string(), EntitySettings::default()))
                .collect(),
            ..Self::default()
        }
    }

    /// Settings for an entity, falling back to defaults.
    #[must_use]
    pub fn entity(&self, name: &str) -> EntitySettings {
        self.entities.get(name).copied().unwrap_or_default()
    }

    /// Build a configuration from flat option names.
    ///
    /// Recognized: `logAll`, `master`, `direction_<entity>` (0 = two-way,
    /// 1 = import only, 2 = export only), `<entity>_limit`, `url`,
    /// `consumer_key`, `consumer_secret`. `master` applies to every entity.
    /// Other names are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a recognized option has an invalid value.
    pub fn from_options(options: &serde_json::Map<String, Value>) -> Result<Self> {
        let mut config = Self::default();
        let mut master = false;

        for (name, value) in options {
            match name.as_str() {
                "logAll" => config.log_all = option_bool(name, value)?,
                "master" => master = option_bool(name, value)?,
                "url" => config.remote.url = option_string(value),
                "consumer_key" => config.remote.consumer_key = option_string(value),
                "consumer_secret" => config.remote.consumer_secret = option_string(value),
                _ => {
                    if let Some(entity) = name.strip_prefix("direction_") {
                        let code = option_int(name, value)?;
                        let direction = SyncDirection::from_code(code).ok_or_else(|| {
                            Error::Config(format!("{name}: unknown direction code {code}"))
                        })?;
                        config.entities.entry(entity.to_string()).or_default().direction =
                            direction;
                    } else if let Some(entity) = name.strip_suffix("_limit") {
                        let limit = option_int(name, value)?;
                        let limit = u32::try_from(limit)
                            .map_err(|_| Error::Config(format!("{name}: out of range")))?;
                        config.entities.entry(entity.to_string()).or_default().limit = limit;
                    }
                }
            }
        }

        for entity in SUPPORTED_ENTITIES {
            config.entities.entry((*entity).to_string()).or_default();
        }
        for settings in config.entities.values_mut() {
            settings.master = master;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero page size, or an entity with no
    /// local table.
    pub fn validate(&self) -> Result<()> {
        for (name, settings) in &self.entities {
            if !SUPPORTED_ENTITIES.contains(&name.as_str()) {
                return Err(Error::Config(format!(
                    "unknown entity '{name}' (supported: {})",
                    SUPPORTED_ENTITIES.join(", ")
                )));
            }
            if settings.limit == 0 {
                return Err(Error::Config(format!("{name}: limit must be positive")));
            }
        }
        Ok(())
    }

    /// Load a configuration file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::with_defaults());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Apply `WC_URL`, `WC_CONSUMER_KEY` and `WC_CONSUMER_SECRET`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply credential overrides from a variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty("WC_URL") {
            self.remote.url = Some(url);
        }
        if let Some(key) = non_empty("WC_CONSUMER_KEY") {
            self.remote.consumer_key = Some(key);
        }
        if let Some(secret) = non_empty("WC_CONSUMER_SECRET") {
            self.remote.consumer_secret = Some(secret);
        }
    }
}

fn option_bool(name: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_i64().unwrap_or_default() != 0),
        Value::String(s) => match s.trim() {
            "1" | "true" => Ok(true),
            "0" | "false" | "" => Ok(false),
            other => Err(Error::Config(format!("{name}: expected a boolean, got '{other}'"))),
        },
        Value::Null => Ok(false),
        other => Err(Error::Config(format!("{name}: expected a boolean, got {other}"))),
    }
}

fn option_int(name: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::Config(format!("{name}: expected an integer, got {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name}: expected an integer, got '{s}'"))),
        other => Err(Error::Config(format!("{name}: expected an integer, got {other}"))),
    }
}

fn option_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}
