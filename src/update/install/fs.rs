//! Filesystem operations used by installers

use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Mutations an installer performs on the live installation
#[async_trait]
pub trait FileOps: Send + Sync {
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    async fn exists(&self, path: &Path) -> bool;
}

/// [`FileOps`] backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileOps;

#[async_trait]
impl FileOps for TokioFileOps {
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_dir_all(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Real filesystem with scripted rename failures
    #[derive(Default)]
    pub(crate) struct FlakyFileOps {
        renames: AtomicUsize,
        failing_renames: Mutex<Vec<usize>>,
    }

    impl FlakyFileOps {
        /// Fail the given 1-based rename calls
        pub(crate) fn failing_renames(calls: &[usize]) -> Self {
            Self {
                renames: AtomicUsize::new(0),
                failing_renames: Mutex::new(calls.to_vec()),
            }
        }
    }

    #[async_trait]
    impl FileOps for FlakyFileOps {
        async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            let call = self.renames.fetch_add(1, Ordering::SeqCst) + 1;
            let fail = self.failing_renames.lock().unwrap().contains(&call);
            if fail {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("injected failure on rename #{}", call),
                ));
            }
            tokio::fs::rename(from, to).await
        }

        async fn remove_file(&self, path: &Path) -> io::Result<()> {
            tokio::fs::remove_file(path).await
        }

        async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            tokio::fs::remove_dir_all(path).await
        }

        async fn exists(&self, path: &Path) -> bool {
            tokio::fs::try_exists(path).await.unwrap_or(false)
        }
    }
}
