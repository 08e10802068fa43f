//! Single-writer lock on the data root.
//!
//! The queue snapshot is rewritten whole on every save, so two processes
//! holding the queue at once would overwrite each other's work. A process
//! that mutates the queue takes an exclusive advisory lock on
//! `queue.lock` first; the lock is released when the [`WriterLock`] drops.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::RollcallError;

/// Exclusive lock on a lock file, held until dropped.
#[derive(Debug)]
pub struct WriterLock {
    // Closing the file releases the lock
    _file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Take the lock without waiting.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Busy` if another holder has it, and
    /// `RollcallError::Persistence` if the lock file cannot be opened.
    pub fn acquire(path: &Path) -> Result<Self, RollcallError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| {
                RollcallError::Persistence(format!(
                    "Failed to open lock file {}: {e}",
                    path.display()
                ))
            })?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(path = %path.display(), "Writer lock acquired");
                Ok(Self {
                    _file: file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(RollcallError::Busy(format!(
                    "another rollcall process is using the queue ({}); try again when it finishes",
                    path.display()
                )))
            }
            Err(e) => Err(RollcallError::Persistence(format!(
                "Failed to lock {}: {e}",
                path.display()
            ))),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_holder_is_refused_until_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.lock");

        let first = WriterLock::acquire(&path).unwrap();
        assert_eq!(first.path(), path.as_path());
        assert!(matches!(
            WriterLock::acquire(&path),
            Err(RollcallError::Busy(_))
        ));

        drop(first);
        assert!(WriterLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_missing_directory_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("queue.lock");

        assert!(matches!(
            WriterLock::acquire(&path),
            Err(RollcallError::Persistence(_))
        ));
    }
}
