//! Path resolution for rollcall configuration and data files.
//!
//! All rollcall data is stored in `~/.rollcall/` unless `ROLLCALL_HOME`
//! points elsewhere:
//! - `config.yaml` - Main configuration file
//! - `rollcall.db` - SQLite database holding the queue snapshot and local records
//! - `queue.lock` - Held by the one process allowed to change the queue

use std::path::PathBuf;

use crate::error::RollcallError;

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "ROLLCALL_HOME";

/// Paths to rollcall configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.rollcall/`
    pub root: PathBuf,
    /// Config file: `~/.rollcall/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.rollcall/rollcall.db`
    pub database: PathBuf,
    /// Queue writer lock: `~/.rollcall/queue.lock`
    pub queue_lock: PathBuf,
}

impl Paths {
    /// Resolve paths from `ROLLCALL_HOME` or the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, RollcallError> {
        if let Ok(root) = std::env::var(HOME_ENV) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME").map_err(|_| {
            RollcallError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_root(PathBuf::from(home).join(".rollcall")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("rollcall.db"),
            queue_lock: root.join("queue.lock"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), RollcallError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                RollcallError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-rollcall");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("rollcall.db"));
        assert_eq!(paths.queue_lock, root.join("queue.lock"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested").join("rollcall"));

        paths.ensure_dirs().unwrap();

        assert!(paths.root.exists());
    }
}
