//! Extract-and-replace of an application bundle directory
//!
//! The archive is unpacked into a staging directory next to the bundle
//! first, so the live bundle is only moved once a complete replacement
//! exists on the same filesystem.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FileOps, InstallReport, InstallState, Installer};
use crate::core::error::{Result, UpdateError};
use crate::update::download::Artifact;

/// Unpacks an archive into a directory
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract(&self, archive: &Path, destination: &Path) -> io::Result<()>;
}

/// [`ArchiveExtractor`] for zip archives
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, destination: &Path) -> io::Result<()> {
        let archive = archive.to_path_buf();
        let destination = destination.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&archive)?;
            let mut zip = zip::ZipArchive::new(file)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            std::fs::create_dir_all(&destination)?;
            zip.extract(&destination)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

/// Replaces the bundle directory with the contents of an archive
pub struct ExtractReplaceInstaller {
    bundle: PathBuf,
    staging: PathBuf,
    previous: PathBuf,
    extractor: Arc<dyn ArchiveExtractor>,
    fs: Arc<dyn FileOps>,
    state: InstallState,
}

impl ExtractReplaceInstaller {
    pub fn new(bundle: PathBuf, extractor: Arc<dyn ArchiveExtractor>, fs: Arc<dyn FileOps>) -> Self {
        let staging = sibling(&bundle, "staging");
        let previous = sibling(&bundle, "old");
        Self {
            bundle,
            staging,
            previous,
            extractor,
            fs,
            state: InstallState::Idle,
        }
    }

    async fn clear_dir(&self, dir: &Path) -> Result<()> {
        if self.fs.exists(dir).await {
            self.fs.remove_dir_all(dir).await.map_err(|e| {
                UpdateError::Install(format!("clearing {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    async fn discard_staging(&self) {
        if let Err(e) = self.clear_dir(&self.staging).await {
            tracing::warn!(error = %e, "Failed to remove staging directory");
        }
    }

    /// Put back a previous bundle left without a live one by an earlier run
    async fn recover_previous(&mut self) -> Result<()> {
        if self.fs.exists(&self.bundle).await || !self.fs.exists(&self.previous).await {
            return Ok(());
        }

        tracing::warn!(
            previous = %self.previous.display(),
            bundle = %self.bundle.display(),
            "Restoring bundle left behind by an interrupted update"
        );
        self.fs.rename(&self.previous, &self.bundle).await.map_err(|e| {
            UpdateError::Install(format!(
                "restoring {} before update: {}",
                self.previous.display(),
                e
            ))
        })
    }

    async fn stage(&mut self, artifact: &Artifact) -> Result<()> {
        self.clear_dir(&self.staging).await?;

        if let Err(e) = self.extractor.extract(artifact.path(), &self.staging).await {
            self.discard_staging().await;
            return Err(UpdateError::Install(format!(
                "extracting {}: {}",
                artifact.path().display(),
                e
            )));
        }

        // The previous bundle is only disposable while a live one exists.
        if self.fs.exists(&self.bundle).await {
            if let Err(e) = self.clear_dir(&self.previous).await {
                self.discard_staging().await;
                return Err(e);
            }
        }

        tracing::debug!(staging = %self.staging.display(), "Archive extracted");
        Ok(())
    }

    async fn commit(&mut self, had_bundle: bool) -> Result<()> {
        if had_bundle {
            if let Err(e) = self.fs.rename(&self.bundle, &self.previous).await {
                self.discard_staging().await;
                return Err(UpdateError::Install(format!(
                    "moving {} aside: {}",
                    self.bundle.display(),
                    e
                )));
            }
            self.state = InstallState::BackedUp;
        }

        let Err(e) = self.fs.rename(&self.staging, &self.bundle).await else {
            self.state = InstallState::Committed;
            return Ok(());
        };

        let cause = format!("moving staged bundle into {}: {}", self.bundle.display(), e);
        tracing::error!(error = %cause, "Bundle swap failed");
        self.discard_staging().await;

        if !had_bundle {
            return Err(UpdateError::Install(cause));
        }

        match self.fs.rename(&self.previous, &self.bundle).await {
            Ok(()) => {
                self.state = InstallState::RolledBack;
                tracing::warn!(bundle = %self.bundle.display(), "Previous bundle restored");
                Err(UpdateError::Install(format!("{}; previous bundle restored", cause)))
            }
            Err(e) => {
                self.state = InstallState::Failed;
                tracing::error!(
                    previous = %self.previous.display(),
                    error = %e,
                    "Rollback failed, installation is broken"
                );
                Err(UpdateError::Rollback {
                    install: cause,
                    rollback: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl Installer for ExtractReplaceInstaller {
    fn name(&self) -> &'static str {
        "extract-replace"
    }

    fn state(&self) -> InstallState {
        self.state
    }

    async fn install(&mut self, artifact: Artifact) -> Result<InstallReport> {
        let result = async {
            self.recover_previous().await?;
            self.stage(&artifact).await?;
            let had_bundle = self.fs.exists(&self.bundle).await;
            self.commit(had_bundle).await
        }
        .await;

        if let Err(e) = result {
            if self.state == InstallState::Idle {
                self.state = InstallState::Failed;
            }
            return Err(e);
        }

        let mut report = InstallReport::default();
        for (path, is_dir) in [(self.previous.clone(), true), (artifact.into_path(), false)] {
            if !self.fs.exists(&path).await {
                continue;
            }
            let removed = if is_dir {
                self.fs.remove_dir_all(&path).await
            } else {
                self.fs.remove_file(&path).await
            };
            if let Err(e) = removed {
                tracing::warn!(path = %path.display(), error = %e, "Cleanup after install failed");
                report
                    .warnings
                    .push(format!("{} left behind: {}", path.display(), e));
            }
        }

        tracing::info!(bundle = %self.bundle.display(), "Bundle replaced");
        Ok(report)
    }
}

fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}
