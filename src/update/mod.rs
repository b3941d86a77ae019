//! Self-update pipeline
//!
//! - Manifest check with per-platform record selection
//! - Artifact download over HTTP(S) or a peer-to-peer swarm
//! - Checksum and signature verification
//! - Platform-specific install with rollback

pub mod download;
pub mod environment;
pub mod events;
pub mod install;
pub mod manifest;
pub mod platform;
pub mod session;
pub mod verify;
pub mod version;


pub use download::{
    Artifact, Downloader, HttpTransport, SwarmEngine, SwarmError, SwarmFile, SwarmTorrent,
    SwarmTransport, Transport,
};
pub use environment::EnvironmentGuard;
pub use events::{EventCallback, EventSink, UpdateEvent};
pub use install::{
    installer_for, ArchiveExtractor, ExtractReplaceInstaller, FileOps, InstallReport,
    InstallState, Installer, RenameSwapInstaller, TokioFileOps, ZipExtractor,
};
pub use manifest::{ManifestClient, PlatformRecord, UpdateManifest};
pub use platform::{Arch, InstallLayout, Os, PlatformTarget};
pub use session::{CheckOutcome, SessionLock, UpdateOutcome, UpdatePhase, UpdateSession};
pub use verify::Verifier;
pub use version::{is_newer, Version};
