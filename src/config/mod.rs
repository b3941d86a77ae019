//! Updater configuration
//!
//! JSON file storage with environment overrides.

mod storage;

pub use storage::{
    ConfigError, ConfigResult, ConfigStore, UpdaterConfig, ENV_CURRENT_VERSION, ENV_ENDPOINT,
};
