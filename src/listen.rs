//! Purpose: Bind a TCP listener on an OS-assigned port and report where it landed.
//! Exports: `BoundListener`, `bind_listener`, `probe`, `DEFAULT_PROBE_ADDR`.
//! Invariants: The listener is closed when `BoundListener` drops.
use std::net::{SocketAddr, TcpListener};

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_PROBE_ADDR: &str = "127.0.0.1:0";

#[derive(Debug)]
pub struct BoundListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn into_inner(self) -> TcpListener {
        self.listener
    }
}

pub fn bind_listener(addr: SocketAddr) -> Result<BoundListener, Error> {
    let listener = TcpListener::bind(addr).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to bind {addr}"))
            .with_source(err)
    })?;
    let local_addr = listener.local_addr().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read bound address")
            .with_source(err)
    })?;
    Ok(BoundListener {
        listener,
        local_addr,
    })
}

/// Binds `addr`, logs the bound address and closes the listener again.
pub fn probe(addr: SocketAddr) -> Result<SocketAddr, Error> {
    let listener = bind_listener(addr)?;
    let bound = listener.local_addr();
    tracing::info!("bound to {bound:?}");
    drop(listener);
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_PROBE_ADDR, bind_listener, probe};
    use crate::core::error::ErrorKind;
    use std::net::SocketAddr;

    #[test]
    fn probe_reports_ephemeral_loopback_port() {
        let addr: SocketAddr = DEFAULT_PROBE_ADDR.parse().expect("addr");
        let bound = probe(addr).expect("probe");
        assert!(bound.ip().is_loopback());
        assert_ne!(bound.port(), 0);
    }

    #[test]
    fn probe_releases_the_port() {
        let addr: SocketAddr = DEFAULT_PROBE_ADDR.parse().expect("addr");
        let bound = probe(addr).expect("probe");
        let again = bind_listener(bound).expect("rebind after close");
        assert_eq!(again.local_addr(), bound);
    }

    #[test]
    fn bind_conflict_is_io_error() {
        let addr: SocketAddr = DEFAULT_PROBE_ADDR.parse().expect("addr");
        let held = bind_listener(addr).expect("bind");
        let err = bind_listener(held.local_addr()).expect_err("port already taken");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
