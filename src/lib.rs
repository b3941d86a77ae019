//! App Updater - self-update engine for packaged applications
//!
//! This crate provides:
//! - Manifest checks with per-platform release selection
//! - Artifact download over HTTP(S) or a peer-to-peer swarm
//! - SHA-256 + Ed25519 artifact verification
//! - Rename-swap and extract-and-replace installs with rollback
//! - Event notifications for the host application

pub mod config;
pub mod core;
pub mod logging;
pub mod update;

// Re-export commonly used items
pub use config::{ConfigStore, UpdaterConfig};
pub use core::error::{ErrorKind, Result, UpdateError};
pub use update::{
    CheckOutcome, EventSink, PlatformTarget, UpdateEvent, UpdateOutcome, UpdatePhase,
    UpdateSession, Version,
};
