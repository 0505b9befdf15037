//! Single-flight guard for compaction runs.
//!
//! The engine assumes at most one run per corpus. Callers that can be
//! invoked concurrently take a [`RunLock`] keyed by the base namespace before
//! starting a run; a second caller waits up to its timeout and then gives up.

use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Advisory lock errors.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "{code}: lock timed out after {waited:?} at {shown}",
        code = ErrorCode::LockContention.code(),
        shown = .path.display()
    )]
    Timeout { path: PathBuf, waited: Duration },

    #[error("{code}: {0}", code = ErrorCode::StoreUnavailable.code())]
    IoError(#[from] io::Error),
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::StoreUnavailable,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Lock file path for a namespace under `locks_dir`. Slashes in the
/// namespace are flattened so nested prefixes map to a single file.
#[must_use]
pub fn lock_path(locks_dir: &Path, namespace: &str) -> PathBuf {
    let name: String = namespace
        .trim_matches('/')
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let name = if name.is_empty() { "root".to_string() } else { name };
    locks_dir.join(format!("{name}.lock"))
}

/// RAII guard for an exclusive per-namespace run lock.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Acquire the exclusive lock at `path`, polling until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] when another holder keeps the lock past the
    /// timeout, [`LockError::IoError`] when the lock file cannot be opened.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if FileExt::try_lock_exclusive(&file).is_ok() {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, RunLock, lock_path};
    use crate::error::ErrorCode;
    use std::{
        path::{Path, PathBuf},
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    fn test_lock(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push("shelf_lock_tests");
        path.push(name);
        path
    }

    #[test]
    fn lock_path_flattens_namespace() {
        let dir = Path::new("/tmp/locks");
        assert_eq!(
            lock_path(dir, "/knowledge-base/team/"),
            dir.join("knowledge-base_team.lock")
        );
        assert_eq!(lock_path(dir, ""), dir.join("root.lock"));
    }

    #[test]
    fn run_lock_allows_acquire_and_release() -> Result<(), LockError> {
        let path = test_lock("basic.lock");
        let lock = RunLock::acquire(&path, Duration::from_millis(50))?;
        assert_eq!(lock.path(), path.as_path());
        lock.release();
        Ok(())
    }

    #[test]
    fn run_lock_times_out_when_held() {
        let path = test_lock("timeout.lock");
        let _guard = RunLock::acquire(&path, Duration::from_millis(50)).unwrap();
        let err = RunLock::acquire(&path, Duration::from_millis(20)).unwrap_err();

        assert!(matches!(err, LockError::Timeout { path: ref p, .. } if *p == path));
        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(err.hint().is_some());
        assert!(err.to_string().starts_with("E5002"));
    }

    #[test]
    fn lock_release_allows_follow_up_lock() -> Result<(), LockError> {
        let path = test_lock("release-followup.lock");
        {
            let _first = RunLock::acquire(&path, Duration::from_millis(50))?;
        }

        let _second = RunLock::acquire(&path, Duration::from_millis(50))?;
        Ok(())
    }

    #[test]
    fn contention_is_resolved_after_holder_releases() -> Result<(), LockError> {
        let path = test_lock("thread.lock");

        let blocker = Arc::new(Barrier::new(2));
        let waiter = Arc::new(Barrier::new(2));

        let blocker_thread = Arc::clone(&blocker);
        let waiter_thread = Arc::clone(&waiter);
        let path_in_thread = path.clone();
        let handle = thread::spawn(move || {
            let _holder = RunLock::acquire(&path_in_thread, Duration::from_millis(200)).unwrap();
            blocker_thread.wait();
            waiter_thread.wait();
        });

        blocker.wait();
        assert!(matches!(
            RunLock::acquire(&path, Duration::from_millis(20)),
            Err(LockError::Timeout { .. })
        ));
        waiter.wait();
        handle.join().unwrap();

        let follow_up = RunLock::acquire(&path, Duration::from_millis(50))?;
        follow_up.release();
        Ok(())
    }
}
