//! Session configuration applied by the provider, loaded from TOML.
//!
//! ```toml
//! isolation_level = "read-committed"
//! time_zone = "Europe/Berlin"
//! fallback_time_zone = "UTC"
//! reconfigure = "new-only"
//! connect_timeout_ms = 5000
//! read_timeout_ms = 30000
//! ```
//!
//! Every field is optional.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::IsolationLevel;
use crate::error::{CacheError, CacheResult};

/// When session configuration is applied to a handed-out connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconfigurePolicy {
    /// Configure only freshly opened connections; cached ones keep the
    /// session state from when they were opened.
    #[default]
    NewOnly,
    /// Re-apply isolation level and time zone on every handout, cache hits
    /// included.
    EveryHandout,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub isolation_level: IsolationLevel,
    /// Session time zone. Falls back to `$TZ`, then `fallback_time_zone`.
    pub time_zone: Option<String>,
    /// Zone used when the client zone cannot be set (default: "UTC").
    pub fallback_time_zone: String,
    pub reconfigure: ReconfigurePolicy,
    /// Connect timeout for drivers that honour one (default: 5000ms).
    pub connect_timeout_ms: u64,
    /// Read timeout for drivers that honour one (default: 30000ms).
    pub read_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            isolation_level: IsolationLevel::default(),
            time_zone: None,
            fallback_time_zone: "UTC".to_string(),
            reconfigure: ReconfigurePolicy::default(),
            connect_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
        }
    }
}

impl SessionConfig {
    pub fn from_file(path: &Path) -> CacheResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> CacheResult<Self> {
        toml::from_str(content).map_err(|e| CacheError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> CacheResult<String> {
        toml::to_string_pretty(self).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// The zone to request first: configured zone, then `$TZ`, then the fallback.
    pub fn client_time_zone(&self) -> String {
        self.resolve_time_zone(std::env::var("TZ").ok().as_deref())
    }

    /// Same as [`client_time_zone`](Self::client_time_zone), with the
    /// environment's zone passed in. A blank `env_tz` counts as unset.
    pub fn resolve_time_zone(&self, env_tz: Option<&str>) -> String {
        self.time_zone
            .clone()
            .or_else(|| env_tz.filter(|tz| !tz.trim().is_empty()).map(str::to_string))
            .unwrap_or_else(|| self.fallback_time_zone.clone())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Builder method: set the session time zone.
    pub fn with_time_zone(self, zone: &str) -> Self {
        Self {
            time_zone: Some(zone.to_string()),
            ..self
        }
    }

    /// Builder method: set the reconfigure policy.
    pub fn with_reconfigure(self, reconfigure: ReconfigurePolicy) -> Self {
        Self {
            reconfigure,
            ..self
        }
    }

    /// Builder method: set the isolation level.
    pub fn with_isolation_level(self, isolation_level: IsolationLevel) -> Self {
        Self {
            isolation_level,
            ..self
        }
    }
}
