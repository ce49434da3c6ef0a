//! Configuration for privilege resolution
//!
//! Layered the usual way: defaults, then a TOML file, then `RCMS_*`
//! environment variables, then validation.
//!
//! ```toml
//! [policy]
//! superuser_overrides = "narrow"
//!
//! [client]
//! fetch_timeout_ms = 5000
//!
//! [bridge]
//! channel_capacity = 64
//! ```

use crate::errors::{RcmsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "RCMS_";

/// Core trait for RCMS configuration types
pub trait RcmsConfig: Clone + Default + Send + Sync + 'static {
    /// Parse configuration from TOML text
    fn from_toml_str(content: &str) -> Result<Self>;

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RcmsError::config(format!("Failed to read config file: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Merge `RCMS_*` variables from the process environment
    fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Merge `RCMS_*` variables from an explicit source
    fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>;

    /// Validate the configuration
    fn validate(&self) -> Result<()>;
}

/// How override rows attached to a superuser are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuperuserOverrides {
    /// Rows restrict a superuser to exactly those capabilities; no rows
    /// means every capability.
    #[default]
    Narrow,
    /// Rows are ignored; superusers are allowed unconditionally.
    Ignore,
}

impl std::str::FromStr for SuperuserOverrides {
    type Err = RcmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "narrow" => Ok(Self::Narrow),
            "ignore" => Ok(Self::Ignore),
            other => Err(RcmsError::config(format!(
                "unknown superuser_overrides policy: {other}"
            ))),
        }
    }
}

/// Server-side policy settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Superuser override handling
    pub superuser_overrides: SuperuserOverrides,
}

/// Client resolution cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Upper bound on a single grant-set fetch
    pub fetch_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 5_000,
        }
    }
}

impl ClientSettings {
    /// Fetch timeout as a `Duration`
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Invalidation bridge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Buffered session signals per subscriber
    pub channel_capacity: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

/// Complete privilege resolution configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeConfig {
    /// Evaluator and catalog fetcher settings
    pub policy: PolicySettings,
    /// Resolution cache settings
    pub client: ClientSettings,
    /// Invalidation bridge settings
    pub bridge: BridgeSettings,
}

impl RcmsConfig for PrivilegeConfig {
    fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(key) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key {
                "POLICY_SUPERUSER_OVERRIDES" => {
                    self.policy.superuser_overrides = value.parse()?;
                }
                "CLIENT_FETCH_TIMEOUT_MS" => {
                    self.client.fetch_timeout_ms = parse_number(key, &value)?;
                }
                "BRIDGE_CHANNEL_CAPACITY" => {
                    self.bridge.channel_capacity = parse_number(key, &value)?;
                }
                _ => {
                    tracing::debug!(key, "ignoring unknown RCMS_ variable");
                }
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.client.fetch_timeout_ms == 0 {
            return Err(RcmsError::config("client.fetch_timeout_ms must be positive"));
        }
        if self.bridge.channel_capacity == 0 {
            return Err(RcmsError::config("bridge.channel_capacity must be positive"));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RcmsError::config(format!("{ENV_PREFIX}{key} is not a number: {value}")))
}
