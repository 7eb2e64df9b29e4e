//! Registry configuration loaded via OrthoConfig.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::outbound::persistence::DEFAULT_KEY_PREFIX;

const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5_000;

/// Configuration values for store selection, key layout, and startup
/// seeding.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "USER_REGISTRY")]
pub struct RegistrySettings {
    /// Redis connection URL. The in-memory store is used when absent.
    pub redis_url: Option<String>,
    /// Namespace placed in front of every store key.
    pub key_prefix: Option<String>,
    /// Deadline for each store call, in milliseconds. Zero disables it.
    pub operation_timeout_ms: Option<u64>,
    /// Create the fixture users on startup.
    #[ortho_config(default = false)]
    pub seed_fixtures: bool,
}

impl RegistrySettings {
    /// Return the configured Redis URL, ignoring blank values.
    pub fn redis_url(&self) -> Option<&str> {
        self.redis_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Return the configured key prefix, falling back to the default.
    pub fn key_prefix(&self) -> &str {
        self.key_prefix.as_deref().unwrap_or(DEFAULT_KEY_PREFIX)
    }

    /// Return the per-call deadline, if one applies.
    pub fn operation_timeout(&self) -> Option<Duration> {
        match self
            .operation_timeout_ms
            .unwrap_or(DEFAULT_OPERATION_TIMEOUT_MS)
        {
            0 => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }
}
