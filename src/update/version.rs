//! Version parsing and comparison
//!
//! Versions are `major.minor.patch[-build]`. A missing build counter is
//! treated as `-0`, so `1.2.0` and `1.2.0-0` are the same release.

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, UpdateError};

/// Normalized release version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: u64,
}

impl Version {
    /// Create a version with build counter 0
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build: 0,
        }
    }

    /// Create a version with an explicit build counter
    pub fn with_build(major: u64, minor: u64, patch: u64, build: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Parse a version string (e.g., "1.2.3", "v1.2.3" or "1.2.3-7")
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('v');

        let (core, build) = match s.split_once('-') {
            Some((core, build)) => {
                let build = build.parse().map_err(|_| {
                    UpdateError::InvalidVersion(format!("Invalid build counter in {:?}", s))
                })?;
                (core, build)
            }
            None => (s, 0),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(UpdateError::InvalidVersion(format!(
                "Expected 3 version components in {:?}, got {}",
                s,
                parts.len()
            )));
        }

        let component = |part: &str, name: &str| -> Result<u64> {
            part.parse().map_err(|_| {
                UpdateError::InvalidVersion(format!("Invalid {} version: {}", name, part))
            })
        };

        Ok(Self {
            major: component(parts[0], "major")?,
            minor: component(parts[1], "minor")?,
            patch: component(parts[2], "patch")?,
            build,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}-{}", self.major, self.minor, self.patch, self.build)
    }
}

impl std::str::FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Whether `candidate` is strictly newer than `current` after normalization
pub fn is_newer(candidate: &str, current: &str) -> Result<bool> {
    Ok(Version::parse(candidate)? > Version::parse(current)?)
}
