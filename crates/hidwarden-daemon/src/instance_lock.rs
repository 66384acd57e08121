//! Host-wide single-instance lock for the monitor.
//!
//! Two concurrent monitors would double-prompt for the same device, so
//! startup takes a non-blocking exclusive `flock` on a fixed-name lock
//! file. A second instance sees the lock held and exits with status 0
//! without disturbing the running one. The lock is released when the
//! process exits (the kernel drops `flock` locks with the descriptor).

use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};

/// Held for the lifetime of the monitor process; dropping it releases the
/// lock.
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
}

impl InstanceLock {
    /// Try to acquire the lock at `path`. Returns `Ok(None)` when another
    /// instance already holds it.
    pub fn acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating lock directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .with_context(|| format!("opening lock file {}", path.display()))?;

        if try_lock_exclusive(&file).with_context(|| format!("locking {}", path.display()))? {
            Ok(Some(Self { _file: file }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: `fd` comes from an open `File` that outlives this call, and
    // `LOCK_EX | LOCK_NB` is a valid flock operation.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return Ok(false);
    }
    Err(err)
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> std::io::Result<bool> {
    Ok(true)
}
