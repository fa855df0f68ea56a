/// Single-writer lock over the backup directory
///
/// Create, delete and restore hold this for their whole duration so at most
/// one of them touches the directory (or the database, for restore) at a
/// time, across processes as well as within one.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use super::error::{BackupError, BackupResult};
use crate::utils::LOCK_FILE_NAME;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Held lock; released on drop
#[derive(Debug)]
pub struct DirectoryLock {
    file: File,
    path: PathBuf,
}

impl DirectoryLock {
    /// Create the directory if needed and take the lock, polling for up to `wait`
    pub async fn acquire(dir: &Path, wait: Duration) -> BackupResult<Self> {
        ensure_directory(dir)?;

        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| BackupError::Directory {
                path: dir.to_path_buf(),
                source: e,
            })?;

        let deadline = Instant::now() + wait;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(lock = %path.display(), "Acquired backup directory lock");
                    return Ok(Self { file, path });
                }
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(_) => return Err(BackupError::Busy),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(lock = %self.path.display(), "Released backup directory lock");
    }
}

/// Create the backup directory with default permissions if it is missing
pub fn ensure_directory(dir: &Path) -> BackupResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| BackupError::Directory {
        path: dir.to_path_buf(),
        source: e,
    })
}
