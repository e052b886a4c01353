//! Advisory lock file carrying the holder's pid

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::GuardError;

/// An exclusive `flock` on the lock file
///
/// The lock belongs to the open file description, so a second
/// [`FileLock::try_acquire`] on the same path fails even inside the same
/// process.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Takes the lock without blocking and writes our pid into the file
    pub fn try_acquire(path: &Path) -> Result<Self, GuardError> {
        let io_err = |source| GuardError::LockIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        // Not truncated on open: the current holder's pid must survive a
        // failed attempt.
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            return Err(if err.kind() == ErrorKind::WouldBlock {
                GuardError::LockHeld {
                    path: path.to_path_buf(),
                }
            } else {
                io_err(err)
            });
        }

        file.set_len(0).map_err(io_err)?;
        write!(file, "{}", std::process::id()).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the lock file, then drops the lock
    pub fn release(self) {
        let _ = std::fs::remove_file(&self.path);
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// Pid recorded in a lock file, if it holds one
pub fn read_holder_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}
