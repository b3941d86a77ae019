//! Direct-stream transport over HTTP(S)

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;

use super::{Artifact, PartialFile, Transport};
use crate::core::error::{Result, UpdateError};

/// Streams an HTTP response body to disk
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport; `connect_timeout` bounds connection setup only,
    /// since artifact bodies may take arbitrarily long to stream
    pub fn new(connect_timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    async fn copy_body(response: reqwest::Response, part: &mut PartialFile) -> Result<()> {
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| UpdateError::Download(e.to_string()))?;
            part.write(&chunk).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn schemes(&self) -> &[&'static str] {
        &["http", "https"]
    }

    async fn fetch(&self, source: &reqwest::Url, destination: &Path) -> Result<Artifact> {
        let response = self
            .client
            .get(source.clone())
            .send()
            .await
            .map_err(|e| UpdateError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpdateError::Download(format!(
                "Server returned status: {}",
                response.status()
            )));
        }

        let mut part = PartialFile::create(destination).await?;
        match Self::copy_body(response, &mut part).await {
            Ok(()) => part.finish().await,
            Err(e) => {
                part.abort().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::download::Downloader;
    use axum::{routing::get, Router};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Server announcing a 1000-byte body that hangs up after 10 bytes
    async fn serve_truncated() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n0123456789")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn downloader() -> Downloader {
        Downloader::new(HttpTransport::new(Duration::from_secs(5), "app-updater-test").unwrap())
    }

    #[tokio::test]
    async fn test_http_download_writes_full_body() {
        let payload = vec![7u8; 256 * 1024];
        let body = payload.clone();
        let base = serve(Router::new().route("/pkg", get(move || async move { body }))).await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("package.nw.new");
        let artifact = downloader()
            .fetch(&format!("{}/pkg", base), &dest)
            .await
            .unwrap();

        assert_eq!(artifact.size(), payload.len() as u64);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_http_error_status_is_download_error() {
        let base = serve(Router::new()).await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("package.nw.new");
        let result = downloader().fetch(&format!("{}/missing", base), &dest).await;

        assert!(matches!(result, Err(UpdateError::Download(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_connection_refused_is_download_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let temp = TempDir::new().unwrap();
        let result = downloader()
            .fetch(&format!("http://{}/pkg", addr), &temp.path().join("x"))
            .await;
        assert!(matches!(result, Err(UpdateError::Download(_))));
    }

    #[tokio::test]
    async fn test_truncated_body_removes_partial_file() {
        let base = serve_truncated().await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("package.nw.new");
        let result = downloader().fetch(&format!("{}/pkg", base), &dest).await;

        assert!(matches!(result, Err(UpdateError::Download(_))));
        assert!(!dest.exists());
        assert!(!temp.path().join("package.nw.new.part").exists());
    }
}
