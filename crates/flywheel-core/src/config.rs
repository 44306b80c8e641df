//! Gateway configuration file.
//!
//! JSON is the native format; a path ending in `.toml` is read as TOML with
//! the same keys.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3 * 60 * 60);
const DEFAULT_HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_REGION: &str = "us-east-1";

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decode json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not decode toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which resource controller drives the managed resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    #[default]
    Aws,
    /// In-process simulation; resources converge instantly.
    Memory,
}

/// Autoscaling groups managed alongside the standalone instances.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AutoScalingConfig {
    /// Groups scaled to 0/0 on stop and restored to the given size on start.
    #[serde(default)]
    pub terminate: BTreeMap<String, u32>,
    /// Groups whose members are stopped individually, with self-healing
    /// suspended while stopped.
    #[serde(default)]
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Request hostname → backend host.
    #[serde(default)]
    pub vhosts: BTreeMap<String, String>,
    /// Backend for hosts without a vhost entry.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub instances: Vec<String>,
    #[serde(default = "default_healthcheck_interval", with = "duration::serde_str")]
    pub healthcheck_interval: Duration,
    #[serde(default = "default_idle_timeout", with = "duration::serde_str")]
    pub idle_timeout: Duration,
    #[serde(default = "default_region", alias = "aws_region")]
    pub region: String,
    #[serde(default)]
    pub autoscaling: AutoScalingConfig,
    #[serde(default)]
    pub controller: ControllerKind,
}

fn default_healthcheck_interval() -> Duration {
    DEFAULT_HEALTHCHECK_INTERVAL
}

fn default_idle_timeout() -> Duration {
    DEFAULT_IDLE_TIMEOUT
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Config {
    /// Read, decode and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instances.is_empty()
            && self.autoscaling.stop.is_empty()
            && self.autoscaling.terminate.is_empty()
        {
            return Err(ConfigError::Invalid("no instances configured".into()));
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("no endpoint configured".into()));
        }

        if let Some(group) = self
            .autoscaling
            .stop
            .iter()
            .find(|g| self.autoscaling.terminate.contains_key(*g))
        {
            return Err(ConfigError::Invalid(format!(
                "autoscaling group {group} is listed as both terminate and stop"
            )));
        }

        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Invalid("idle-timeout must be positive".into()));
        }
        if self.healthcheck_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "healthcheck-interval must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Backend authority (`host[:port]`) for an inbound Host header.
    ///
    /// Tries the exact header value, then the host with any port removed,
    /// then falls back to the default endpoint.
    pub fn backend_for(&self, host: &str) -> &str {
        let backend = self.vhosts.get(host).or_else(|| {
            let bare = host.rsplit_once(':').map_or(host, |(name, _)| name);
            self.vhosts.get(bare)
        });
        strip_scheme(backend.unwrap_or(&self.endpoint))
    }
}

fn strip_scheme(target: &str) -> &str {
    let target = target.strip_prefix("http://").unwrap_or(target);
    target.trim_end_matches('/')
}
