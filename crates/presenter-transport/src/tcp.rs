use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::PresenterStream;

/// Non-blocking TCP listener for producer agents.
///
/// The listener is put in non-blocking mode at bind time so the event loop can
/// drain every pending connection on a single readiness notification.
/// On Unix, `SO_REUSEADDR` is set by the standard library so a restarted
/// server can rebind while old connections sit in `TIME_WAIT`.
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Bind and listen on `addr`.
    ///
    /// Port 0 asks the OS for an ephemeral port; read it back with
    /// [`local_addr`](Self::local_addr).
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "presenter socket server listening");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept one pending connection.
    ///
    /// Returns `Ok(None)` when no connection is waiting. Accepted streams are
    /// switched to non-blocking mode with `TCP_NODELAY` set.
    pub fn accept(&self) -> Result<Option<(PresenterStream, SocketAddr)>> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    debug!(%addr, "accepted connection");
                    return Ok(Some((PresenterStream::from_tcp(stream), addr)));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for TcpAcceptor {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.listener.as_raw_fd()
    }
}
