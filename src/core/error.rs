//! Error types for the updater
//!
//! One taxonomy for every pipeline stage. Each stage short-circuits the
//! pipeline with one of these; no stage retries internally.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::update::UpdatePhase;

/// Result type alias for updater operations
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Main error type for the update pipeline
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Artifact verification failed: {0}")]
    Verification(String),

    #[error("Install failed: {0}")]
    Install(String),

    /// The installation may be in neither the old nor the new state.
    #[error("Rollback failed after install error ({install}): {rollback}")]
    Rollback { install: String, rollback: String },

    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Update session busy (phase: {phase})")]
    SessionBusy { phase: UpdatePhase },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Coarse classification reported to the host application
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpdateError::Network(_) => ErrorKind::Network,
            UpdateError::InvalidManifest(_) => ErrorKind::InvalidManifest,
            UpdateError::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            UpdateError::UnsupportedTransport(_) => ErrorKind::UnsupportedTransport,
            UpdateError::Download(_) => ErrorKind::Download,
            UpdateError::Verification(_) => ErrorKind::Verification,
            UpdateError::Install(_) => ErrorKind::Install,
            UpdateError::Rollback { .. } => ErrorKind::Rollback,
            UpdateError::InvalidVersion(_) => ErrorKind::InvalidVersion,
            UpdateError::SessionBusy { .. } => ErrorKind::SessionBusy,
            UpdateError::Config(_) => ErrorKind::Config,
            UpdateError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the live installation can no longer be assumed runnable
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, UpdateError::Rollback { .. })
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        UpdateError::Network(err.to_string())
    }
}

/// Error classification carried by error events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    InvalidManifest,
    UnsupportedPlatform,
    UnsupportedTransport,
    Download,
    Verification,
    Install,
    Rollback,
    InvalidVersion,
    SessionBusy,
    Config,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::InvalidManifest => "invalid_manifest",
            ErrorKind::UnsupportedPlatform => "unsupported_platform",
            ErrorKind::UnsupportedTransport => "unsupported_transport",
            ErrorKind::Download => "download",
            ErrorKind::Verification => "verification",
            ErrorKind::Install => "install",
            ErrorKind::Rollback => "rollback",
            ErrorKind::InvalidVersion => "invalid_version",
            ErrorKind::SessionBusy => "session_busy",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(UpdateError::Network("x".into()).kind(), ErrorKind::Network);
        assert_eq!(UpdateError::Verification("x".into()).kind(), ErrorKind::Verification);
        assert_eq!(
            UpdateError::SessionBusy { phase: UpdatePhase::Downloading }.kind(),
            ErrorKind::SessionBusy
        );
    }

    #[test]
    fn test_only_rollback_is_unrecoverable() {
        let rollback = UpdateError::Rollback {
            install: "rename failed".to_string(),
            rollback: "restore failed".to_string(),
        };
        assert!(rollback.is_unrecoverable());
        assert!(!UpdateError::Install("rename failed".into()).is_unrecoverable());
        assert!(!UpdateError::Verification("bad".into()).is_unrecoverable());
    }

    #[test]
    fn test_error_display() {
        let err = UpdateError::UnsupportedTransport("ftp".to_string());
        assert_eq!(err.to_string(), "Unsupported transport: ftp");
        assert_eq!(ErrorKind::UnsupportedTransport.to_string(), "unsupported_transport");
    }
}
