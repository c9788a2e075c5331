//! Engine configuration.
//!
//! Loaded from JSON; every key is optional:
//!
//! ```json
//! { "caching": true, "cacheDelay": 3, "accessChecks": true }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::CachePolicy;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Scene-wide default for caches that follow the global policy.
    pub caching: bool,
    /// Frames without change before a stale cache rebuilds.
    pub cache_delay: u32,
    /// Enforce access kinds on new fields.
    pub access_checks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            caching: true,
            cache_delay: 3,
            access_checks: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            caching: self.caching,
            delay: self.cache_delay,
        }
    }
}
