//! Lock file discipline for atomic file replacement.
//!
//! Writers create `<target>.lock` with exclusive create, write the new
//! contents there, and commit by renaming over the target. Readers never
//! observe a half-written file. Dropping an uncommitted lock rolls back.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// RAII guard over a `<target>.lock` file.
#[derive(Debug)]
pub struct LockFile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl LockFile {
    /// Acquire the lock for `target`, failing if another writer holds it.
    pub fn acquire(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let lock_path = PathBuf::from(format!("{}{}", target.display(), LOCK_SUFFIX));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    UtilError::Lock(LockError::AlreadyLocked {
                        path: lock_path.clone(),
                    })
                } else {
                    UtilError::Lock(LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    })
                }
            })?;

        Ok(Self {
            target,
            lock_path,
            file: Some(file),
            committed: false,
        })
    }

    /// Non-blocking variant: `Ok(None)` when the lock is already held.
    pub fn try_acquire(target: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::acquire(target) {
            Ok(lock) => Ok(Some(lock)),
            Err(UtilError::Lock(LockError::AlreadyLocked { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Path of the file this lock protects.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Path of the `.lock` file itself.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, fsync, and atomically rename the lock over the target.
    pub fn commit(mut self) -> Result<()> {
        let lock_path = self.lock_path.clone();
        if let Some(ref mut file) = self.file {
            file.flush()
                .map_err(|e| UtilError::Lock(LockError::Commit { path: lock_path.clone(), source: e }))?;
            file.sync_all()
                .map_err(|e| UtilError::Lock(LockError::Commit { path: lock_path.clone(), source: e }))?;
        }
        self.file.take();

        fs::rename(&self.lock_path, &self.target).map_err(|e| self.commit_error(e))?;
        self.committed = true;
        Ok(())
    }

    /// Discard the lock and its contents.
    pub fn rollback(mut self) -> Result<()> {
        self.file.take();
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)?;
        }
        self.committed = true;
        Ok(())
    }

    fn commit_error(&self, source: io::Error) -> UtilError {
        UtilError::Lock(LockError::Commit {
            path: self.lock_path.clone(),
            source,
        })
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}
