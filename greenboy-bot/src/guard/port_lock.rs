//! Loopback port claim

use std::io::ErrorKind;
use std::net::{Ipv4Addr, TcpListener};

use crate::error::GuardError;

/// A listening socket held only to keep the port busy
#[derive(Debug)]
pub struct PortLock {
    listener: TcpListener,
    port: u16,
}

impl PortLock {
    pub fn try_acquire(port: u16) -> Result<Self, GuardError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).map_err(|source| {
            if source.kind() == ErrorKind::AddrInUse {
                GuardError::PortInUse { port }
            } else {
                GuardError::PortIo { port, source }
            }
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| GuardError::PortIo { port, source })?;

        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn release(self) {
        drop(self.listener);
    }
}

/// Whether something on this host is bound to `port`
pub fn port_in_use(port: u16) -> bool {
    matches!(
        PortLock::try_acquire(port),
        Err(GuardError::PortInUse { .. })
    )
}
