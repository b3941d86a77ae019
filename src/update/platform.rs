//! Platform facts and the on-disk install layout
//!
//! OS and CPU detection belong to the host; sessions receive a
//! [`PlatformTarget`] and never inspect the machine themselves.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Live package file name for rename-swap platforms
pub const PACKAGE_FILE: &str = "package.nw";
/// Backup of the live package held during an install
pub const BACKUP_FILE: &str = "package.nw.old";
/// Downloaded artifact, staged next to the live package
pub const DOWNLOAD_FILE: &str = "package.nw.new";
/// Live install directory for the extract-and-replace platform
pub const BUNDLE_DIR: &str = "app.nw";

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Platform A: rename-swap, manifest entries keyed by architecture
    Linux,
    /// Platform B: rename-swap
    Windows,
    /// Platform C: extract-and-replace
    MacOs,
    Unknown,
}

impl Os {
    /// Key used for this OS in the update manifest
    pub fn manifest_key(&self) -> Option<&'static str> {
        match self {
            Os::Linux => Some("linux"),
            Os::Windows => Some("windows"),
            Os::MacOs => Some("mac"),
            Os::Unknown => None,
        }
    }

    /// Map an OS name as reported by `std::env::consts::OS`
    pub fn from_name(name: &str) -> Self {
        match name {
            "linux" => Os::Linux,
            "windows" => Os::Windows,
            "macos" => Os::MacOs,
            _ => Os::Unknown,
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Os::Linux => write!(f, "linux"),
            Os::Windows => write!(f, "windows"),
            Os::MacOs => write!(f, "mac"),
            Os::Unknown => write!(f, "unknown"),
        }
    }
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86,
    X64,
}

impl Arch {
    /// Any architecture name mentioning 64 is treated as x64
    pub fn from_name(name: &str) -> Self {
        if name.contains("64") {
            Arch::X64
        } else {
            Arch::X86
        }
    }

    pub fn manifest_key(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.manifest_key())
    }
}

/// Platform an update session targets; fixed for the session's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformTarget {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformTarget {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Platform of the running binary, for hosts that have nothing better
    pub fn current() -> Self {
        Self {
            os: Os::from_name(std::env::consts::OS),
            arch: Arch::from_name(std::env::consts::ARCH),
        }
    }
}

impl std::fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Paths the installer reads and mutates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    staging_dir: PathBuf,
}

impl InstallLayout {
    /// Layout rooted at an explicit staging directory
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    /// Derive the layout from where the application runs.
    ///
    /// Linux keeps `package.nw` beside the executable; the other platforms
    /// stage in the parent of the working directory.
    pub fn detect(os: Os, executable: &Path, working_dir: &Path) -> Self {
        let staging_dir = match os {
            Os::Linux => executable.parent(),
            _ => working_dir.parent(),
        }
        .map(Path::to_path_buf)
        .unwrap_or_else(|| working_dir.to_path_buf());

        Self { staging_dir }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn package_path(&self) -> PathBuf {
        self.staging_dir.join(PACKAGE_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.staging_dir.join(BACKUP_FILE)
    }

    pub fn download_path(&self) -> PathBuf {
        self.staging_dir.join(DOWNLOAD_FILE)
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.staging_dir.join(BUNDLE_DIR)
    }
}
