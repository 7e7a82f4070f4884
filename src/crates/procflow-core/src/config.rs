//! Workflow manager configuration.
//!
//! Configuration can be built in code, loaded from a YAML or JSON file, or read from
//! environment variables:
//!
//! ```yaml
//! max_workers: 8
//! priority_policy: contiguous
//! default_sync_timeout: 30.0
//! ```
//!
//! ```rust,ignore
//! use procflow_core::WorkflowConfig;
//!
//! let from_file = WorkflowConfig::from_file("workflow.yaml")?;
//! let from_env = WorkflowConfig::from_env("PROCFLOW")?; // PROCFLOW_MAX_WORKERS, ...
//! ```

use crate::error::{FlowError, Result};
use crate::priority::PriorityPolicy;
use procflow_env::SimTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Semaphore;

/// Default size of the worker pool.
pub const DEFAULT_MAX_WORKERS: usize = 4;

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

/// Settings applied by [`WorkflowManager::with_config`](crate::WorkflowManager::with_config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Ceiling on concurrently running work items across the manager
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Priority rules for groups built by the manager
    #[serde(default)]
    pub priority_policy: PriorityPolicy,

    /// Timeout applied to barriers that do not set their own
    #[serde(default)]
    pub default_sync_timeout: Option<SimTime>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            priority_policy: PriorityPolicy::default(),
            default_sync_timeout: None,
        }
    }
}

impl WorkflowConfig {
    /// Set the worker pool size.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the group priority policy.
    pub fn with_priority_policy(mut self, policy: PriorityPolicy) -> Self {
        self.priority_policy = policy;
        self
    }

    /// Set the default barrier timeout.
    pub fn with_default_sync_timeout(mut self, timeout: SimTime) -> Self {
        self.default_sync_timeout = Some(timeout);
        self
    }

    /// Load from a file, picking YAML or JSON by extension. The result is validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                FlowError::Configuration(format!(
                    "Unable to determine file extension for {:?}",
                    path
                ))
            })?;

        let config: Self = match extension.to_lowercase().as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&std::fs::read_to_string(path)?)?,
            "json" => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            other => {
                return Err(FlowError::Configuration(format!(
                    "Unsupported config file extension: {}",
                    other
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from `<PREFIX>_MAX_WORKERS`, `<PREFIX>_PRIORITY_POLICY` and
    /// `<PREFIX>_SYNC_TIMEOUT`. Unset variables keep their defaults.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let mut config = Self::default();

        if let Some(workers) = env_parse::<usize>(&format!("{prefix}_MAX_WORKERS"))? {
            config.max_workers = workers;
        }
        if let Some(policy) = env_parse::<PriorityPolicy>(&format!("{prefix}_PRIORITY_POLICY"))? {
            config.priority_policy = policy;
        }
        if let Some(timeout) = env_parse::<SimTime>(&format!("{prefix}_SYNC_TIMEOUT"))? {
            config.default_sync_timeout = Some(timeout);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(FlowError::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.max_workers > Semaphore::MAX_PERMITS {
            return Err(FlowError::Configuration(format!(
                "max_workers must be at most {}, got {}",
                Semaphore::MAX_PERMITS,
                self.max_workers
            )));
        }
        if let Some(timeout) = self.default_sync_timeout {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(FlowError::Configuration(format!(
                    "default_sync_timeout must be positive, got {}",
                    timeout
                )));
            }
        }
        Ok(())
    }

    /// Parse a configuration from a YAML or JSON string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|e| {
            FlowError::Configuration(format!(
                "Failed to parse environment variable '{}': {}",
                key, e
            ))
        }),
        Err(_) => Ok(None),
    }
}
