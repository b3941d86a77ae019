//! Development-checkout detection
//!
//! A source checkout must never replace itself with a packaged build.

use std::path::{Path, PathBuf};

use super::platform::{Os, PlatformTarget, BUNDLE_DIR, PACKAGE_FILE};

/// Version-control marker looked for in the working directory
pub const VCS_MARKER: &str = ".git";

/// Decides whether the current execution context may self-update
#[derive(Debug, Clone, Default)]
pub struct EnvironmentGuard {
    /// User-local application-data directory (`%APPDATA%` on Windows)
    app_data_dir: Option<PathBuf>,
}

impl EnvironmentGuard {
    pub fn new(app_data_dir: Option<PathBuf>) -> Self {
        Self { app_data_dir }
    }

    /// Guard reading `APPDATA` from the process environment
    pub fn from_env() -> Self {
        Self {
            app_data_dir: std::env::var_os("APPDATA").map(PathBuf::from),
        }
    }

    /// True when all update activity must be skipped.
    ///
    /// A VCS marker flags a development checkout unless the working
    /// directory also shows the installed layout of the platform.
    pub fn should_skip_update(&self, platform: &PlatformTarget, working_dir: &Path) -> bool {
        if !working_dir.join(VCS_MARKER).exists() {
            return false;
        }

        let installed = match platform.os {
            Os::Windows => self
                .app_data_dir
                .as_deref()
                .map(|app_data| working_dir.starts_with(app_data))
                .unwrap_or(false),
            Os::Linux => working_dir.join(PACKAGE_FILE).exists(),
            Os::MacOs => inside_bundle_resources(working_dir),
            Os::Unknown => false,
        };

        if !installed {
            tracing::info!(
                working_dir = %working_dir.display(),
                platform = %platform,
                "Not updating because we are running in a development environment"
            );
        }

        !installed
    }
}

/// Whether the path contains `Resources/app.nw`
fn inside_bundle_resources(path: &Path) -> bool {
    let components: Vec<_> = path.components().map(|c| c.as_os_str()).collect();
    components
        .windows(2)
        .any(|pair| pair[0] == "Resources" && pair[1] == BUNDLE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::platform::Arch;
    use tempfile::TempDir;

    fn platform(os: Os) -> PlatformTarget {
        PlatformTarget::new(os, Arch::X64)
    }

    fn checkout() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(VCS_MARKER)).unwrap();
        dir
    }

    #[test]
    fn test_no_vcs_marker_never_skips() {
        let dir = TempDir::new().unwrap();
        let guard = EnvironmentGuard::default();
        for os in [Os::Linux, Os::Windows, Os::MacOs, Os::Unknown] {
            assert!(!guard.should_skip_update(&platform(os), dir.path()));
        }
    }

    #[test]
    fn test_linux_checkout_without_package_skips() {
        let dir = checkout();
        let guard = EnvironmentGuard::default();
        assert!(guard.should_skip_update(&platform(Os::Linux), dir.path()));

        std::fs::write(dir.path().join(PACKAGE_FILE), b"pkg").unwrap();
        assert!(!guard.should_skip_update(&platform(Os::Linux), dir.path()));
    }

    #[test]
    fn test_windows_under_app_data_is_installed() {
        let app_data = checkout();
        let install = app_data.path().join("App");
        std::fs::create_dir_all(install.join(VCS_MARKER)).unwrap();

        let guard = EnvironmentGuard::new(Some(app_data.path().to_path_buf()));
        assert!(!guard.should_skip_update(&platform(Os::Windows), &install));

        let elsewhere = checkout();
        assert!(guard.should_skip_update(&platform(Os::Windows), elsewhere.path()));
    }

    #[test]
    fn test_mac_bundle_resources_is_installed() {
        let root = TempDir::new().unwrap();
        let resources = root.path().join("App.app/Contents/Resources").join(BUNDLE_DIR);
        std::fs::create_dir_all(resources.join(VCS_MARKER)).unwrap();

        let guard = EnvironmentGuard::default();
        assert!(!guard.should_skip_update(&platform(Os::MacOs), &resources));

        let dev = checkout();
        assert!(guard.should_skip_update(&platform(Os::MacOs), dev.path()));
    }

    #[test]
    fn test_unknown_platform_checkout_skips() {
        let dir = checkout();
        assert!(EnvironmentGuard::default().should_skip_update(&platform(Os::Unknown), dir.path()));
    }
}
