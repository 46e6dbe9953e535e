use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive lock on the stats directory, shared by concurrent Claude Code sessions.
/// Released automatically on Drop (fs2 unlocks when the fd closes).
pub struct StatsLockGuard {
    _file: File, // held open to maintain flock
    #[allow(dead_code)] // used in tests via lock_path() accessor
    lock_path: PathBuf,
}

impl StatsLockGuard {
    /// Acquire a blocking exclusive flock on `lock_path`. The lock is a sidecar
    /// file, never one of the stats files themselves: atomic rename would
    /// drop the flock along with the replaced inode.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to acquire flock on {}", lock_path.display()))?;

        Ok(Self {
            _file: file,
            lock_path: lock_path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}
