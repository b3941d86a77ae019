//! Update manifest retrieval and per-platform record selection

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::platform::{Os, PlatformTarget};
use crate::core::error::{Result, UpdateError};

/// Latest release for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRecord {
    /// Release version string, normalized when compared
    pub version: String,
    /// `http(s)://` or `magnet:` location of the artifact
    pub update_url: String,
    /// Hex SHA-256 of the artifact
    pub checksum: String,
    /// Base64 Ed25519ph signature of the artifact
    pub signature: String,
}

/// Manifest served by the update endpoint
///
/// Entries stay raw JSON until one is selected, so metadata keys and
/// entries for other platforms never affect the running platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateManifest {
    pub entries: HashMap<String, serde_json::Value>,
}

impl UpdateManifest {
    /// Parse a manifest body
    pub fn from_json(body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Err(UpdateError::Network("Empty manifest response".to_string()));
        }
        serde_json::from_str(body).map_err(|e| UpdateError::InvalidManifest(e.to_string()))
    }
}

/// Client for the manifest endpoint
pub struct ManifestClient {
    endpoint: String,
    client: reqwest::Client,
}

impl ManifestClient {
    /// Create a client for `endpoint`
    pub fn new(endpoint: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the manifest with a single round trip
    pub async fn fetch(&self) -> Result<UpdateManifest> {
        tracing::info!(endpoint = %self.endpoint, "Fetching update manifest");

        let response = self.client.get(&self.endpoint).send().await?;

        if !response.status().is_success() {
            return Err(UpdateError::Network(format!(
                "Manifest server returned status: {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        UpdateManifest::from_json(&body)
    }

    /// Select the record for `platform`
    pub fn select(manifest: &UpdateManifest, platform: &PlatformTarget) -> Result<PlatformRecord> {
        let key = platform.os.manifest_key().ok_or_else(|| {
            UpdateError::UnsupportedPlatform(format!("no manifest key for {}", platform.os))
        })?;

        let entry = manifest.entries.get(key).ok_or_else(|| {
            UpdateError::UnsupportedPlatform(format!("manifest has no entry for {}", key))
        })?;

        let (entry, label) = match platform.os {
            Os::Linux => {
                let arch = platform.arch.manifest_key();
                let nested = entry.get(arch).ok_or_else(|| {
                    UpdateError::UnsupportedPlatform(format!(
                        "manifest has no {} entry for {}",
                        platform.arch, key
                    ))
                })?;
                (nested, format!("{}.{}", key, arch))
            }
            _ => (entry, key.to_string()),
        };

        PlatformRecord::deserialize(entry)
            .map_err(|e| UpdateError::InvalidManifest(format!("entry {}: {}", label, e)))
    }
}
