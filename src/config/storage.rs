//! Configuration storage
//!
//! The updater reads a single JSON file. A missing file is created with
//! defaults using a temp file + rename so a crash never leaves a partial
//! config behind.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::logging::LoggingConfig;

/// Environment variable overriding [`UpdaterConfig::endpoint`]
pub const ENV_ENDPOINT: &str = "APP_UPDATER_ENDPOINT";
/// Environment variable overriding [`UpdaterConfig::current_version`]
pub const ENV_CURRENT_VERSION: &str = "APP_UPDATER_CURRENT_VERSION";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Updater configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Manifest URL
    #[serde(default)]
    pub endpoint: String,

    /// Version of the running application
    #[serde(default = "default_current_version")]
    pub current_version: String,

    /// Manifest request timeout and artifact connect timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long to wait for swarm peers and metadata
    #[serde(default = "default_swarm_ready_timeout")]
    pub swarm_ready_timeout_secs: u64,

    /// Working directory used for environment detection; process cwd if unset
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Install root override; derived from the platform layout if unset
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Age after which a leftover session lock is considered abandoned
    #[serde(default = "default_lock_stale_after")]
    pub lock_stale_after_secs: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_current_version() -> String {
    "0.0.0".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_swarm_ready_timeout() -> u64 {
    120
}

fn default_lock_stale_after() -> u64 {
    3600
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            current_version: default_current_version(),
            request_timeout_secs: default_request_timeout(),
            swarm_ready_timeout_secs: default_swarm_ready_timeout(),
            working_dir: None,
            staging_dir: None,
            lock_stale_after_secs: default_lock_stale_after(),
            logging: LoggingConfig::default(),
        }
    }
}

impl UpdaterConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn swarm_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.swarm_ready_timeout_secs)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }

    /// Apply `APP_UPDATER_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup; empty values are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = value(ENV_ENDPOINT) {
            tracing::debug!(endpoint = %endpoint, "Endpoint overridden from environment");
            self.endpoint = endpoint;
        }
        if let Some(version) = value(ENV_CURRENT_VERSION) {
            tracing::debug!(version = %version, "Current version overridden from environment");
            self.current_version = version;
        }
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "endpoint is not set (config file or {})",
                ENV_ENDPOINT
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.swarm_ready_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "swarm_ready_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loaded configuration and the file it came from
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: UpdaterConfig,
    /// Whether `load` wrote a default file
    created: bool,
}

impl ConfigStore {
    /// `<config_dir>/app-updater/updater.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("app-updater")
            .join("updater.json")
    }

    /// Load `path`, creating it with defaults if it does not exist
    pub async fn load(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();

        let created = !tokio::fs::try_exists(&path).await?;
        let config = if created {
            let config = UpdaterConfig::default();
            Self::save_to_file(&path, &config).await?;
            tracing::info!(path = %path.display(), "Created default updater config");
            config
        } else {
            Self::load_from_file(&path).await?
        };

        Ok(Self {
            path,
            config,
            created,
        })
    }

    async fn load_from_file(path: &Path) -> ConfigResult<UpdaterConfig> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save_to_file(path: &Path, config: &UpdaterConfig) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(config)?;
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, path).await?;

        Ok(())
    }

    /// Whether this store's file was created by `load`
    pub fn created(&self) -> bool {
        self.created
    }

    /// Persist `config` to this store's file
    pub async fn save(&mut self, config: UpdaterConfig) -> ConfigResult<()> {
        Self::save_to_file(&self.path, &config).await?;
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn into_config(self) -> UpdaterConfig {
        self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
