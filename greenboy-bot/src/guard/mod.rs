//! Single-instance guard
//!
//! Only one bot per operator may poll the gateway and run the monitor. The
//! claim is made of two independent resources: an advisory lock file with
//! the holder's pid and a loopback port derived from the operator name. A
//! stale lock file can be reclaimed by checking the recorded pid, while the
//! port is released by the kernel when its holder dies; holding both covers
//! the failure mode of either one.

mod file_lock;
mod port_lock;
mod reclaim;

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::GuardError;

pub use file_lock::FileLock;
pub use port_lock::PortLock;
pub use reclaim::{ReclaimReport, Reclaimer};

/// All-or-nothing composition of the file lock and the port lock
#[derive(Debug)]
pub struct InstanceGuard {
    lock_path: PathBuf,
    port: u16,
    file: Option<FileLock>,
    socket: Option<PortLock>,
}

impl InstanceGuard {
    pub fn new(lock_path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            lock_path: lock_path.into(),
            port,
            file: None,
            socket: None,
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some() && self.socket.is_some()
    }

    /// Takes both resources; `false` if either is held elsewhere
    ///
    /// When the second claim fails the first one is given back.
    pub fn acquire(&mut self) -> bool {
        match self.try_acquire() {
            Ok(()) => true,
            Err(e) => {
                warn!("Instance guard not acquired: {}", e);
                false
            }
        }
    }

    pub fn try_acquire(&mut self) -> Result<(), GuardError> {
        if self.is_held() {
            return Ok(());
        }

        let file = FileLock::try_acquire(&self.lock_path)?;
        let socket = match PortLock::try_acquire(self.port) {
            Ok(socket) => socket,
            Err(e) => {
                file.release();
                return Err(e);
            }
        };

        info!(
            "Instance guard acquired (lock: {}, port: {})",
            self.lock_path.display(),
            self.port
        );
        self.file = Some(file);
        self.socket = Some(socket);
        Ok(())
    }

    /// Gives both resources back; safe to call any number of times
    pub fn release(&mut self) {
        let had_any = self.file.is_some() || self.socket.is_some();

        if let Some(file) = self.file.take() {
            file.release();
        }
        if let Some(socket) = self.socket.take() {
            socket.release();
        }

        if had_any {
            info!("Instance guard released");
        } else {
            debug!("Instance guard already released");
        }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use tempfile::TempDir;

    fn free_port() -> u16 {
        TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_second_instance_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("greenboy-alice.lock");
        let port = free_port();

        let mut first = InstanceGuard::new(&lock, port);
        let mut second = InstanceGuard::new(&lock, port);

        assert!(first.acquire());
        assert!(first.is_held());
        assert!(!second.acquire());

        first.release();
        assert!(second.acquire());
        second.release();
    }

    #[test]
    fn test_busy_port_rolls_back_file_lock() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("greenboy-alice.lock");
        let port = free_port();
        let squatter = PortLock::try_acquire(port).unwrap();

        let mut guard = InstanceGuard::new(&lock, port);
        assert!(matches!(
            guard.try_acquire(),
            Err(GuardError::PortInUse { .. })
        ));
        assert!(!guard.is_held());

        // The file lock was given back
        FileLock::try_acquire(&lock).unwrap().release();
        squatter.release();
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("greenboy-alice.lock");

        let mut guard = InstanceGuard::new(&lock, free_port());
        assert!(guard.acquire());
        assert!(guard.acquire());

        guard.release();
        guard.release();
        assert!(!guard.is_held());
        assert!(!lock.exists());
    }
}
