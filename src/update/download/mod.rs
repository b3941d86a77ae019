//! Artifact download over interchangeable transports
//!
//! The transport is picked from the URI scheme. Every transport writes to a
//! `.part` sibling and renames it onto the destination only once its byte
//! stream has ended, so the destination never holds a truncated artifact.

mod http;
mod swarm;

pub use http::HttpTransport;
pub use swarm::{SwarmEngine, SwarmError, SwarmFile, SwarmTorrent, SwarmTransport};

#[cfg(test)]
pub(crate) use swarm::tests::FakeSwarm;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::core::error::{Result, UpdateError};

/// A downloaded artifact on disk
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    size: u64,
}

impl Artifact {
    pub(crate) fn new(path: PathBuf, size: u64) -> Self {
        Self { path, size }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// A way of retrieving bytes for some URI schemes
#[async_trait]
pub trait Transport: Send + Sync {
    /// URI schemes this transport serves
    fn schemes(&self) -> &[&'static str];

    /// Retrieve `source` into `destination`
    async fn fetch(&self, source: &reqwest::Url, destination: &Path) -> Result<Artifact>;
}

/// Dispatches downloads to the transport registered for the URI scheme
pub struct Downloader {
    transports: Vec<Box<dyn Transport>>,
}

impl Downloader {
    /// Downloader without any transport
    pub fn empty() -> Self {
        Self {
            transports: Vec::new(),
        }
    }

    /// Downloader serving `http` and `https`
    pub fn new(http: HttpTransport) -> Self {
        Self::empty().with_transport(http)
    }

    /// Register an additional transport
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transports.push(Box::new(transport));
        self
    }

    /// Whether a transport is registered for `scheme`
    pub fn supports(&self, scheme: &str) -> bool {
        self.transport_for(scheme).is_some()
    }

    fn transport_for(&self, scheme: &str) -> Option<&dyn Transport> {
        self.transports
            .iter()
            .find(|t| t.schemes().iter().any(|s| *s == scheme))
            .map(|t| t.as_ref())
    }

    /// Retrieve `source` into `destination`
    pub async fn fetch(&self, source: &str, destination: &Path) -> Result<Artifact> {
        let url = reqwest::Url::parse(source)
            .map_err(|e| UpdateError::UnsupportedTransport(format!("{}: {}", source, e)))?;

        let transport = self.transport_for(url.scheme()).ok_or_else(|| {
            UpdateError::UnsupportedTransport(format!("no transport for scheme {:?}", url.scheme()))
        })?;

        tracing::info!(
            url = %source,
            destination = %destination.display(),
            "Downloading update artifact"
        );

        let artifact = transport.fetch(&url, destination).await?;

        tracing::info!(
            path = %artifact.path().display(),
            bytes = artifact.size(),
            "Download complete"
        );

        Ok(artifact)
    }
}

/// In-progress download file, renamed onto the destination on completion
pub(crate) struct PartialFile {
    file: File,
    partial_path: PathBuf,
    destination: PathBuf,
    written: u64,
}

impl PartialFile {
    pub(crate) async fn create(destination: &Path) -> Result<Self> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial_path = partial_path_for(destination);
        let file = File::create(&partial_path).await?;

        Ok(Self {
            file,
            partial_path,
            destination: destination.to_path_buf(),
            written: 0,
        })
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// End of stream reached: flush and move into place
    pub(crate) async fn finish(mut self) -> Result<Artifact> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);

        tokio::fs::rename(&self.partial_path, &self.destination).await?;
        Ok(Artifact::new(self.destination, self.written))
    }

    /// Drop the partial data after a failed transfer
    pub(crate) async fn abort(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.partial_path).await {
            tracing::warn!(
                path = %self.partial_path.display(),
                error = %e,
                "Failed to remove partial download"
            );
        }
    }
}

fn partial_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
