//! Process-exclusivity run lock
//!
//! A single advisory lock file carrying the owner's pid brackets the whole
//! run so two build processes never corrupt the shared cache. Release is
//! guaranteed by `Drop`, whether or not a stage failed.

use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{KilnError, KilnResult};

/// Scoped acquisition of the build lock
#[derive(Debug)]
pub struct RunLock {
    file: std::fs::File,
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock or fail fast with the holder's pid. Never blocks.
    pub fn acquire(path: &Path) -> KilnResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            let mut contents = String::new();
            let _ = file.read_to_string(&mut contents);
            let pid = contents.trim().parse().unwrap_or(0);
            return Err(KilnError::LockHeld {
                pid,
                path: path.to_path_buf(),
            });
        }

        file.set_len(0)?;
        file.rewind()?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_writes_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".kiln.lock");

        let _lock = RunLock::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());
    }

    #[test]
    fn second_acquire_in_same_process_fails_with_holder_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".kiln.lock");

        let _held = RunLock::acquire(&path).unwrap();
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(matches!(err, KilnError::LockHeld { pid, .. } if pid == std::process::id()));
    }

    #[test]
    fn lock_file_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".kiln.lock");

        {
            let _lock = RunLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());

        // Re-acquisition after release succeeds.
        let _lock = RunLock::acquire(&path).unwrap();
    }
}
