//! Artifact authentication
//!
//! An artifact is trusted only when both its SHA-256 content hash matches
//! the manifest checksum and its Ed25519ph signature verifies against the
//! public key compiled into the updater. Both are computed in one read pass.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha256, Sha512};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::download::Artifact;
use crate::core::error::{Result, UpdateError};

/// Release signing public key
pub const EMBEDDED_PUBLIC_KEY: [u8; 32] = [
    0x3d, 0xfb, 0xfc, 0x7b, 0xc1, 0xa0, 0x58, 0xd0, 0x05, 0x30, 0xec, 0x96, 0x86, 0x00, 0x94, 0x4c,
    0xb5, 0x0d, 0xef, 0xca, 0x68, 0x9e, 0xd0, 0x2b, 0xa0, 0x76, 0xc8, 0x2a, 0xa8, 0x85, 0xd0, 0xdd,
];

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Verifies downloaded artifacts
#[derive(Debug, Clone)]
pub struct Verifier {
    public_key: VerifyingKey,
}

impl Verifier {
    /// Verifier trusting the embedded release key
    pub fn new() -> Result<Self> {
        let public_key = VerifyingKey::from_bytes(&EMBEDDED_PUBLIC_KEY)
            .map_err(|e| UpdateError::Verification(format!("embedded public key: {}", e)))?;
        Ok(Self { public_key })
    }

    /// Verifier trusting another key; never reachable from runtime input
    pub(crate) fn with_public_key(public_key: VerifyingKey) -> Self {
        Self { public_key }
    }

    /// Check `artifact` against the manifest checksum and signature.
    ///
    /// Failure of either check is reported as the same error; the caller
    /// owns deleting the untrusted file.
    pub async fn verify(
        &self,
        artifact: Artifact,
        expected_checksum: &str,
        expected_signature: &str,
    ) -> Result<Artifact> {
        let (checksum, prehash) = digest_file(&artifact).await.map_err(|e| {
            UpdateError::Verification(format!("reading {}: {}", artifact.path().display(), e))
        })?;

        let checksum_ok = checksum.eq_ignore_ascii_case(expected_checksum.trim());
        let signature_ok = self.signature_matches(prehash, expected_signature);

        tracing::debug!(
            path = %artifact.path().display(),
            checksum_ok,
            signature_ok,
            "Artifact verification finished"
        );

        if checksum_ok && signature_ok {
            Ok(artifact)
        } else {
            Err(UpdateError::Verification("invalid hash or signature".to_string()))
        }
    }

    fn signature_matches(&self, prehash: Sha512, encoded: &str) -> bool {
        let Ok(bytes) = BASE64.decode(encoded.trim()) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };
        self.public_key
            .verify_prehashed(prehash, None, &signature)
            .is_ok()
    }
}

/// Hex SHA-256 and the Ed25519ph prehash of the file, from one pass
async fn digest_file(artifact: &Artifact) -> std::io::Result<(String, Sha512)> {
    let mut file = File::open(artifact.path()).await?;
    let mut content = Sha256::new();
    let mut prehash = Sha512::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        content.update(&buffer[..n]);
        prehash.update(&buffer[..n]);
    }

    Ok((hex::encode(content.finalize()), prehash))
}
