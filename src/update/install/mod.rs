//! Per-platform installation strategies
//!
//! Each installer moves through `Idle → BackedUp → Committed`, ending in
//! `RolledBack` or `Failed` when the swap does not complete. The live
//! installation is only ever touched from here.

mod extract;
mod fs;
mod rename_swap;

pub use extract::{ArchiveExtractor, ExtractReplaceInstaller, ZipExtractor};
pub use fs::{FileOps, TokioFileOps};
pub use rename_swap::RenameSwapInstaller;

#[cfg(test)]
pub(crate) use fs::testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::download::Artifact;
use super::platform::{InstallLayout, Os, PlatformTarget};
use crate::core::error::{Result, UpdateError};

/// Progress of a single install attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallState {
    Idle,
    /// The previous installation has been moved aside
    BackedUp,
    /// The new installation is live
    Committed,
    /// The swap failed and the previous installation was restored
    RolledBack,
    Failed,
}

/// Outcome of a successful install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Non-fatal cleanup problems left behind
    pub warnings: Vec<String>,
}

/// Replaces the live installation with a verified artifact
#[async_trait]
pub trait Installer: Send + Sync {
    fn name(&self) -> &'static str;

    fn state(&self) -> InstallState;

    /// Consume `artifact` and make it the live installation
    async fn install(&mut self, artifact: Artifact) -> Result<InstallReport>;
}

/// Pick the installer for `platform`; fails before touching the filesystem
pub fn installer_for(
    platform: &PlatformTarget,
    layout: &InstallLayout,
    extractor: Arc<dyn ArchiveExtractor>,
    fs: Arc<dyn FileOps>,
) -> Result<Box<dyn Installer>> {
    match platform.os {
        Os::Linux | Os::Windows => Ok(Box::new(RenameSwapInstaller::new(
            layout.package_path(),
            layout.backup_path(),
            fs,
        ))),
        Os::MacOs => Ok(Box::new(ExtractReplaceInstaller::new(
            layout.bundle_dir(),
            extractor,
            fs,
        ))),
        Os::Unknown => Err(UpdateError::UnsupportedPlatform(format!(
            "no installer for {}",
            platform
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::platform::Arch;
    use tempfile::TempDir;

    fn pick(os: Os, layout: &InstallLayout) -> Result<Box<dyn Installer>> {
        installer_for(
            &PlatformTarget::new(os, Arch::X64),
            layout,
            Arc::new(ZipExtractor),
            Arc::new(TokioFileOps),
        )
    }

    #[test]
    fn test_installer_selection() {
        let temp = TempDir::new().unwrap();
        let layout = InstallLayout::new(temp.path());

        assert_eq!(pick(Os::Linux, &layout).unwrap().name(), "rename-swap");
        assert_eq!(pick(Os::Windows, &layout).unwrap().name(), "rename-swap");
        assert_eq!(pick(Os::MacOs, &layout).unwrap().name(), "extract-replace");
        assert_eq!(pick(Os::Linux, &layout).unwrap().state(), InstallState::Idle);
    }

    #[test]
    fn test_unknown_platform_fails_without_mutation() {
        let temp = TempDir::new().unwrap();
        let layout = InstallLayout::new(temp.path());

        assert!(matches!(
            pick(Os::Unknown, &layout),
            Err(UpdateError::UnsupportedPlatform(_))
        ));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
