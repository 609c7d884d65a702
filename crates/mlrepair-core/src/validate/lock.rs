use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;

/// Advisory per-item lock held for the duration of a validation.
///
/// Acquisition creates the lock file with create-new semantics and never
/// waits. The file records the holder's pid; a lock whose holder is no
/// longer running is reclaimed. Dropping the guard removes the file.
#[derive(Debug)]
pub struct ItemLock {
    path: PathBuf,
}

impl ItemLock {
    /// `Ok(None)` when somebody else holds the lock.
    pub fn try_acquire(path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.into();
        if let Some(lock) = Self::create(&path)? {
            return Ok(Some(lock));
        }
        let Some(holder) = stale_holder(&path) else {
            return Ok(None);
        };
        warn!(
            event = "validate.stale_lock",
            lock = %path.display(),
            pid = holder,
            "reclaiming lock of a dead worker"
        );
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            // another worker reclaimed it first
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Self::create(&path)
    }

    fn create(path: &Path) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Pid recorded in the lock file when that process is gone. An unreadable
/// or empty file may belong to a holder that has not written its pid yet,
/// so it counts as live.
fn stale_holder(path: &Path) -> Option<u32> {
    let pid: u32 = std::fs::read_to_string(path).ok()?.trim().parse().ok()?;
    (pid != std::process::id() && !process_alive(pid)).then_some(pid)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for ItemLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validate.lock");
        let first = ItemLock::try_acquire(&path).unwrap().unwrap();
        assert!(ItemLock::try_acquire(&path).unwrap().is_none());
        assert_eq!(first.path(), path);
        drop(first);
        assert!(!path.exists());
        assert!(ItemLock::try_acquire(&path).unwrap().is_some());
    }

    /// Pid of a child that has already exited and been reaped.
    #[cfg(target_os = "linux")]
    pub(crate) fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_lock_of_dead_holder_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validate.lock");
        std::fs::write(&path, format!("{}\n", dead_pid())).unwrap();
        let lock = ItemLock::try_acquire(&path).unwrap().unwrap();
        let holder = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(holder.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_empty_lock_file_counts_as_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validate.lock");
        std::fs::write(&path, "").unwrap();
        assert!(ItemLock::try_acquire(&path).unwrap().is_none());
        assert!(path.exists());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ItemLock::try_acquire(dir.path().join("gone").join("validate.lock")).is_err());
    }
}
