//! Two-rename swap of a single package file

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::{FileOps, InstallReport, InstallState, Installer};
use crate::core::error::{Result, UpdateError};
use crate::update::download::Artifact;

/// Moves the live package to a backup, renames the artifact into place and
/// restores the backup if the second rename fails
pub struct RenameSwapInstaller {
    live: PathBuf,
    backup: PathBuf,
    fs: Arc<dyn FileOps>,
    state: InstallState,
}

impl RenameSwapInstaller {
    pub fn new(live: PathBuf, backup: PathBuf, fs: Arc<dyn FileOps>) -> Self {
        Self {
            live,
            backup,
            fs,
            state: InstallState::Idle,
        }
    }

    async fn roll_back(&mut self, artifact: &Artifact, cause: String) -> UpdateError {
        if self.fs.exists(artifact.path()).await {
            if let Err(e) = self.fs.remove_file(artifact.path()).await {
                tracing::warn!(
                    path = %artifact.path().display(),
                    error = %e,
                    "Failed to delete artifact before rollback"
                );
            }
        }

        if self.fs.exists(&self.live).await {
            self.state = InstallState::Failed;
            return UpdateError::Install(format!(
                "{}; {} exists, backup kept at {}",
                cause,
                self.live.display(),
                self.backup.display()
            ));
        }

        match self.fs.rename(&self.backup, &self.live).await {
            Ok(()) => {
                self.state = InstallState::RolledBack;
                tracing::warn!(live = %self.live.display(), "Previous package restored");
                UpdateError::Install(format!("{}; previous package restored", cause))
            }
            Err(e) => {
                self.state = InstallState::Failed;
                tracing::error!(
                    backup = %self.backup.display(),
                    error = %e,
                    "Rollback failed, installation is broken"
                );
                UpdateError::Rollback {
                    install: cause,
                    rollback: e.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Installer for RenameSwapInstaller {
    fn name(&self) -> &'static str {
        "rename-swap"
    }

    fn state(&self) -> InstallState {
        self.state
    }

    async fn install(&mut self, artifact: Artifact) -> Result<InstallReport> {
        if let Err(e) = self.fs.rename(&self.live, &self.backup).await {
            self.state = InstallState::Failed;
            return Err(UpdateError::Install(format!(
                "moving {} aside: {}",
                self.live.display(),
                e
            )));
        }
        self.state = InstallState::BackedUp;

        if let Err(e) = self.fs.rename(artifact.path(), &self.live).await {
            let cause = format!("renaming update into {}: {}", self.live.display(), e);
            tracing::error!(error = %cause, "Package swap failed");
            return Err(self.roll_back(&artifact, cause).await);
        }
        self.state = InstallState::Committed;

        let mut report = InstallReport::default();
        if let Err(e) = self.fs.remove_file(&self.backup).await {
            tracing::warn!(
                backup = %self.backup.display(),
                error = %e,
                "Failed to delete backup package"
            );
            report
                .warnings
                .push(format!("backup {} left behind: {}", self.backup.display(), e));
        }

        tracing::info!(live = %self.live.display(), "Package swapped");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::install::testing::FlakyFileOps;
    use crate::update::install::TokioFileOps;
    use crate::update::platform::InstallLayout;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        layout: InstallLayout,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let layout = InstallLayout::new(temp.path());
            fs::write(layout.package_path(), b"old").unwrap();
            fs::write(layout.download_path(), b"new").unwrap();
            Self {
                _temp: temp,
                layout,
            }
        }

        fn installer(&self, fs: impl FileOps + 'static) -> RenameSwapInstaller {
            RenameSwapInstaller::new(
                self.layout.package_path(),
                self.layout.backup_path(),
                Arc::new(fs),
            )
        }

        fn artifact(&self) -> Artifact {
            Artifact::new(self.layout.download_path(), 3)
        }
    }

    #[tokio::test]
    async fn test_swap_replaces_package_and_cleans_up() {
        let fx = Fixture::new();
        let mut installer = fx.installer(TokioFileOps);

        let report = installer.install(fx.artifact()).await.unwrap();

        assert!(report.warnings.is_empty());
        assert_eq!(installer.state(), InstallState::Committed);
        assert_eq!(fs::read(fx.layout.package_path()).unwrap(), b"new");
        assert!(!fx.layout.backup_path().exists());
        assert!(!fx.layout.download_path().exists());
    }

    #[tokio::test]
    async fn test_backup_failure_leaves_live_untouched() {
        let fx = Fixture::new();
        let mut installer = fx.installer(FlakyFileOps::failing_renames(&[1]));

        let result = installer.install(fx.artifact()).await;

        assert!(matches!(result, Err(UpdateError::Install(_))));
        assert_eq!(installer.state(), InstallState::Failed);
        assert_eq!(fs::read(fx.layout.package_path()).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_failed_commit_restores_backup() {
        let fx = Fixture::new();
        let mut installer = fx.installer(FlakyFileOps::failing_renames(&[2]));

        let result = installer.install(fx.artifact()).await;

        assert!(matches!(result, Err(UpdateError::Install(_))));
        assert_eq!(installer.state(), InstallState::RolledBack);
        assert_eq!(fs::read(fx.layout.package_path()).unwrap(), b"old");
        assert!(!fx.layout.backup_path().exists());
        assert!(!fx.layout.download_path().exists());
    }

    #[tokio::test]
    async fn test_failed_restore_is_unrecoverable() {
        let fx = Fixture::new();
        let mut installer = fx.installer(FlakyFileOps::failing_renames(&[2, 3]));

        let err = installer.install(fx.artifact()).await.unwrap_err();

        assert!(err.is_unrecoverable());
        assert!(matches!(err, UpdateError::Rollback { .. }));
        assert_eq!(installer.state(), InstallState::Failed);
        assert!(!fx.layout.package_path().exists());
        assert_eq!(fs::read(fx.layout.backup_path()).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_missing_live_package_fails_first_rename() {
        let fx = Fixture::new();
        fs::remove_file(fx.layout.package_path()).unwrap();
        let mut installer = fx.installer(TokioFileOps);

        let result = installer.install(fx.artifact()).await;

        assert!(matches!(result, Err(UpdateError::Install(_))));
        assert!(fx.layout.download_path().exists());
    }
}
