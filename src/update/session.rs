//! Update session
//!
//! One explicit value drives the whole pipeline:
//! check → download → verify → install → notify. Stages run strictly in
//! sequence and the first failure ends the run.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;

use super::download::{Downloader, HttpTransport, SwarmEngine, SwarmTransport};
use super::environment::EnvironmentGuard;
use super::events::{EventSink, UpdateEvent};
use super::install::{installer_for, ArchiveExtractor, FileOps, TokioFileOps, ZipExtractor};
use super::manifest::{ManifestClient, PlatformRecord};
use super::platform::{InstallLayout, PlatformTarget};
use super::verify::Verifier;
use super::version::Version;
use crate::config::UpdaterConfig;
use crate::core::error::{Result, UpdateError};

/// Lock file held in the staging directory while an update runs
pub const LOCK_FILE: &str = ".app-updater.lock";

/// Where a session is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    Downloading,
    Verifying,
    Installing,
    Installed,
    Failed,
}

impl UpdatePhase {
    /// Whether a stage is running (or was abandoned mid-run)
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            UpdatePhase::Checking
                | UpdatePhase::Downloading
                | UpdatePhase::Verifying
                | UpdatePhase::Installing
        )
    }
}

impl std::fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UpdatePhase::Idle => "idle",
            UpdatePhase::Checking => "checking",
            UpdatePhase::UpToDate => "up_to_date",
            UpdatePhase::UpdateAvailable => "update_available",
            UpdatePhase::Downloading => "downloading",
            UpdatePhase::Verifying => "verifying",
            UpdatePhase::Installing => "installing",
            UpdatePhase::Installed => "installed",
            UpdatePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of [`UpdateSession::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Development checkout; nothing was fetched
    Skipped,
    UpToDate,
    UpdateAvailable(Version),
}

/// Result of [`UpdateSession::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Skipped,
    UpToDate,
    Installed(Version),
}

/// Drives one application's self-update
pub struct UpdateSession {
    config: UpdaterConfig,
    platform: PlatformTarget,
    layout: InstallLayout,
    working_dir: PathBuf,
    guard: EnvironmentGuard,
    manifest: ManifestClient,
    downloader: Downloader,
    verifier: Verifier,
    extractor: Arc<dyn ArchiveExtractor>,
    fs: Arc<dyn FileOps>,
    events: EventSink,
    phase: UpdatePhase,
    current_version: Version,
    /// Record retained from the last check that found an update
    record: Option<PlatformRecord>,
    /// Artifact written by the current run, deleted on failure
    artifact_path: Option<PathBuf>,
}

impl UpdateSession {
    /// Create a session for `platform` from a validated config
    pub fn new(config: UpdaterConfig, platform: PlatformTarget) -> Result<Self> {
        config.validate()?;
        let current_version = Version::parse(&config.current_version)?;
        let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), current_version);

        let manifest =
            ManifestClient::new(config.endpoint.clone(), config.request_timeout(), &user_agent)?;
        let downloader = Downloader::new(HttpTransport::new(config.request_timeout(), &user_agent)?);

        let working_dir = match &config.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let layout = match &config.staging_dir {
            Some(dir) => InstallLayout::new(dir.clone()),
            None => InstallLayout::detect(platform.os, &std::env::current_exe()?, &working_dir),
        };

        tracing::debug!(
            platform = %platform,
            version = %current_version,
            staging = %layout.staging_dir().display(),
            "Update session created"
        );

        Ok(Self {
            config,
            platform,
            layout,
            working_dir,
            guard: EnvironmentGuard::from_env(),
            manifest,
            downloader,
            verifier: Verifier::new()?,
            extractor: Arc::new(ZipExtractor),
            fs: Arc::new(TokioFileOps),
            events: EventSink::default(),
            phase: UpdatePhase::Idle,
            current_version,
            record: None,
            artifact_path: None,
        })
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Enable `magnet:` downloads through `engine`
    pub fn with_swarm_engine(mut self, engine: Arc<dyn SwarmEngine>) -> Self {
        let transport = SwarmTransport::new(engine, self.config.swarm_ready_timeout());
        self.downloader = self.downloader.with_transport(transport);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_file_ops(mut self, fs: Arc<dyn FileOps>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_guard(mut self, guard: EnvironmentGuard) -> Self {
        self.guard = guard;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn current_version(&self) -> Version {
        self.current_version
    }

    pub fn platform(&self) -> PlatformTarget {
        self.platform
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Version found by the last successful check, if newer than current
    pub fn available_version(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.version.as_str())
    }

    /// Ask the manifest whether a newer version exists
    pub async fn check(&mut self) -> Result<CheckOutcome> {
        self.ensure_resting()?;
        match self.run_check().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Check if needed, then download, verify and install the update
    pub async fn update(&mut self) -> Result<UpdateOutcome> {
        self.ensure_resting()?;

        if self.record.is_none() {
            match self.run_check().await {
                Ok(CheckOutcome::Skipped) => return Ok(UpdateOutcome::Skipped),
                Ok(CheckOutcome::UpToDate) => return Ok(UpdateOutcome::UpToDate),
                Ok(CheckOutcome::UpdateAvailable(_)) => {}
                Err(e) => return Err(self.fail(e).await),
            }
        }
        let Some(record) = self.record.clone() else {
            return Ok(UpdateOutcome::UpToDate);
        };

        let acquired =
            SessionLock::try_acquire(self.layout.staging_dir(), self.config.lock_stale_after())
                .await;
        let lock = match acquired {
            Ok(Some(lock)) => lock,
            Ok(None) => return Err(UpdateError::SessionBusy { phase: self.phase }),
            Err(e) => return Err(self.fail(e.into()).await),
        };

        let result = self.install_record(&record, &lock).await;
        drop(lock);

        match result {
            Ok(version) => {
                self.phase = UpdatePhase::Installed;
                self.current_version = version;
                self.record = None;
                self.artifact_path = None;
                tracing::info!(version = %version, "Update installed");
                self.events.emit(UpdateEvent::Installed { version });
                Ok(UpdateOutcome::Installed(version))
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    fn ensure_resting(&self) -> Result<()> {
        if self.phase.is_in_flight() {
            return Err(UpdateError::SessionBusy { phase: self.phase });
        }
        Ok(())
    }

    async fn run_check(&mut self) -> Result<CheckOutcome> {
        self.phase = UpdatePhase::Checking;
        self.record = None;

        if self.guard.should_skip_update(&self.platform, &self.working_dir) {
            self.phase = UpdatePhase::UpToDate;
            return Ok(CheckOutcome::Skipped);
        }

        let manifest = self.manifest.fetch().await?;
        let record = ManifestClient::select(&manifest, &self.platform)?;
        let candidate = Version::parse(&record.version)?;

        if candidate > self.current_version {
            tracing::info!(
                current = %self.current_version,
                version = %candidate,
                "Update available"
            );
            self.record = Some(record);
            self.phase = UpdatePhase::UpdateAvailable;
            self.events
                .emit(UpdateEvent::UpdateAvailable { version: candidate });
            Ok(CheckOutcome::UpdateAvailable(candidate))
        } else {
            tracing::info!(version = %self.current_version, "Already up to date");
            self.phase = UpdatePhase::UpToDate;
            Ok(CheckOutcome::UpToDate)
        }
    }

    async fn install_record(&mut self, record: &PlatformRecord, lock: &SessionLock) -> Result<Version> {
        let version = Version::parse(&record.version)?;
        let mut installer = installer_for(
            &self.platform,
            &self.layout,
            self.extractor.clone(),
            self.fs.clone(),
        )?;

        self.phase = UpdatePhase::Downloading;
        let destination = self.layout.download_path();
        self.artifact_path = Some(destination.clone());
        let artifact = self.downloader.fetch(&record.update_url, &destination).await?;

        lock.refresh().await;
        self.phase = UpdatePhase::Verifying;
        let artifact = self
            .verifier
            .verify(artifact, &record.checksum, &record.signature)
            .await?;

        lock.refresh().await;
        self.phase = UpdatePhase::Installing;
        tracing::info!(installer = installer.name(), version = %version, "Installing update");
        let report = installer.install(artifact).await?;
        for warning in &report.warnings {
            tracing::warn!(warning = %warning, "Install finished with cleanup warning");
        }

        Ok(version)
    }

    /// Record a terminal failure and hand the error back
    async fn fail(&mut self, error: UpdateError) -> UpdateError {
        let failed_in = self.phase;
        self.phase = UpdatePhase::Failed;
        self.record = None;

        if let Some(path) = self.artifact_path.take() {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete artifact");
                }
            }
        }

        if error.is_unrecoverable() {
            tracing::error!(phase = %failed_in, error = %error, "Update failed, installation may be broken");
        } else {
            tracing::error!(phase = %failed_in, error = %error, "Update failed");
        }
        self.events.emit(UpdateEvent::from_error(&error));
        error
    }
}

/// Exclusive marker file guarding the staging directory
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    /// Take the lock in `dir`, or `None` if a live session holds it.
    ///
    /// A lock file older than `stale_after` is treated as abandoned and
    /// replaced.
    pub async fn try_acquire(dir: &Path, stale_after: Duration) -> io::Result<Option<Self>> {
        let path = dir.join(LOCK_FILE);

        for _ in 0..2 {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(format!("{}\n", std::process::id()).as_bytes())
                        .await?;
                    return Ok(Some(Self { path }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !Self::is_stale(&path, stale_after).await {
                        return Ok(None);
                    }
                    tracing::warn!(path = %path.display(), "Replacing abandoned session lock");
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    async fn is_stale(path: &Path, stale_after: Duration) -> bool {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => return e.kind() == io::ErrorKind::NotFound,
        };

        metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age > stale_after)
            .unwrap_or(false)
    }

    /// Bump the lock's modification time so a long run is not taken for
    /// an abandoned one
    pub async fn refresh(&self) {
        let pid = format!("{}\n", std::process::id());
        if let Err(e) = tokio::fs::write(&self.path, pid).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to refresh session lock");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    // Blocking removal; also runs when an update future is dropped mid-run.
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release session lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_flight_phases() {
        for phase in [
            UpdatePhase::Checking,
            UpdatePhase::Downloading,
            UpdatePhase::Verifying,
            UpdatePhase::Installing,
        ] {
            assert!(phase.is_in_flight(), "{}", phase);
        }
        for phase in [
            UpdatePhase::Idle,
            UpdatePhase::UpToDate,
            UpdatePhase::UpdateAvailable,
            UpdatePhase::Installed,
            UpdatePhase::Failed,
        ] {
            assert!(!phase.is_in_flight(), "{}", phase);
        }
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_and_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let hour = Duration::from_secs(3600);

        let lock = SessionLock::try_acquire(temp.path(), hour).await.unwrap().unwrap();
        assert!(lock.path().exists());
        assert!(SessionLock::try_acquire(temp.path(), hour).await.unwrap().is_none());

        drop(lock);
        assert!(!temp.path().join(LOCK_FILE).exists());
        assert!(SessionLock::try_acquire(temp.path(), hour).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(LOCK_FILE);
        std::fs::write(&path, "12345\n").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(7200))
            .unwrap();

        let lock = SessionLock::try_acquire(temp.path(), Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(lock.is_some());
        let pid = std::fs::read_to_string(&path).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }

    #[tokio::test]
    async fn test_refreshed_lock_is_not_stale() {
        let temp = TempDir::new().unwrap();
        let hour = Duration::from_secs(3600);
        let lock = SessionLock::try_acquire(temp.path(), hour).await.unwrap().unwrap();
        std::fs::File::options()
            .write(true)
            .open(lock.path())
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(7200))
            .unwrap();

        lock.refresh().await;

        assert!(SessionLock::try_acquire(temp.path(), hour).await.unwrap().is_none());
        assert!(lock.path().exists());
    }

    #[tokio::test]
    async fn test_lock_in_missing_directory_is_io_error() {
        let temp = TempDir::new().unwrap();
        let result =
            SessionLock::try_acquire(&temp.path().join("missing"), Duration::from_secs(60)).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_session_requires_endpoint() {
        let result = UpdateSession::new(UpdaterConfig::default(), PlatformTarget::current());
        assert!(matches!(result, Err(UpdateError::Config(_))));
    }

    #[test]
    fn test_session_rejects_bad_current_version() {
        let config = UpdaterConfig {
            endpoint: "http://127.0.0.1:1/manifest.json".to_string(),
            current_version: "1.2.3-beta".to_string(),
            ..UpdaterConfig::default()
        };
        let result = UpdateSession::new(config, PlatformTarget::current());
        assert!(matches!(result, Err(UpdateError::InvalidVersion(_))));
    }
}
