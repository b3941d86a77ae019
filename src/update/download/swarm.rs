//! Peer-to-peer swarm transport for `magnet:` URIs
//!
//! The peer-to-peer engine itself is a collaborator behind [`SwarmEngine`];
//! this transport owns readiness, file selection and the write to disk.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Artifact, PartialFile, Transport};
use crate::core::error::{Result, UpdateError};

/// Errors reported by a swarm engine
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Swarm engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file listed in a swarm's metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmFile {
    pub name: String,
    pub length: u64,
}

/// A joined swarm whose metadata is available
#[async_trait]
pub trait SwarmTorrent: Send + Sync {
    /// Files in metadata order
    fn files(&self) -> Vec<SwarmFile>;

    /// Open file `index` as a byte stream that ends with the file
    async fn open(
        &self,
        index: usize,
    ) -> std::result::Result<Box<dyn AsyncRead + Send + Unpin>, SwarmError>;
}

/// Peer-to-peer engine capable of joining a swarm by magnet URI
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Join the swarm; resolves once peers and metadata are ready
    async fn join(&self, magnet: &str) -> std::result::Result<Box<dyn SwarmTorrent>, SwarmError>;
}

/// Transport retrieving a single file from a swarm
pub struct SwarmTransport {
    engine: Arc<dyn SwarmEngine>,
    ready_timeout: Duration,
}

impl SwarmTransport {
    pub fn new(engine: Arc<dyn SwarmEngine>, ready_timeout: Duration) -> Self {
        Self {
            engine,
            ready_timeout,
        }
    }

    /// Index of the file to download.
    ///
    /// The manifest does not name a file, so the last listed one is taken.
    /// This mirrors the legacy updater and is likely a placeholder policy.
    fn select_file(files: &[SwarmFile]) -> Option<usize> {
        files.len().checked_sub(1)
    }

    async fn copy_stream(
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
        part: &mut PartialFile,
    ) -> Result<()> {
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(|e| UpdateError::Download(e.to_string()))?;
            if n == 0 {
                return Ok(());
            }
            part.write(&buffer[..n]).await?;
        }
    }
}

#[async_trait]
impl Transport for SwarmTransport {
    fn schemes(&self) -> &[&'static str] {
        &["magnet"]
    }

    async fn fetch(&self, source: &reqwest::Url, destination: &Path) -> Result<Artifact> {
        tracing::debug!(magnet = %source, "Joining swarm");

        let torrent = tokio::time::timeout(self.ready_timeout, self.engine.join(source.as_str()))
            .await
            .map_err(|_| {
                UpdateError::Download(format!(
                    "Swarm not ready after {}s",
                    self.ready_timeout.as_secs()
                ))
            })?
            .map_err(|e| UpdateError::Download(e.to_string()))?;

        let files = torrent.files();
        let index = Self::select_file(&files)
            .ok_or_else(|| UpdateError::Download("Swarm lists no files".to_string()))?;
        let file = &files[index];

        tracing::info!(file = %file.name, bytes = file.length, "Selected swarm file");

        let reader = torrent
            .open(index)
            .await
            .map_err(|e| UpdateError::Download(e.to_string()))?;

        let mut part = PartialFile::create(destination).await?;
        match Self::copy_stream(reader, &mut part).await {
            Ok(()) => part.finish().await,
            Err(e) => {
                part.abort().await;
                Err(e)
            }
        }
    }
}
