use std::collections::HashMap;
use std::io::ErrorKind;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Poll};
use tracing::trace;

use crate::error::{Result, TransportError};

pub use mio::Interest;

const EVENT_CAPACITY: usize = 256;

/// Caller-chosen identifier attached to a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

impl From<Token> for mio::Token {
    fn from(token: Token) -> Self {
        mio::Token(token.0 as usize)
    }
}

/// A readiness notification for one registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: Token,
    /// Data (or a pending connection, for listeners) is available.
    pub readable: bool,
    /// The send buffer has room again.
    pub writable: bool,
    /// The peer hung up.
    pub hangup: bool,
    /// The socket is in an error state.
    pub error: bool,
}

impl Event {
    /// True when the source can no longer deliver data.
    pub fn is_closed(&self) -> bool {
        self.hangup || self.error
    }
}

/// Edge-triggered readiness set on top of [`mio::Poll`].
///
/// Sources are plain non-blocking sockets registered by descriptor. Because
/// notifications are edge-triggered, a reader must drain a source until it
/// would block, or remember to come back to it without waiting for another
/// event.
pub struct Poller {
    poll: Poll,
    events: Events,
    sources: HashMap<Token, RawFd>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("sources", &self.sources)
            .finish()
    }
}

impl Poller {
    pub fn new() -> Result<Self> {
        Ok(Self {
            poll: Poll::new().map_err(TransportError::Poll)?,
            events: Events::with_capacity(EVENT_CAPACITY),
            sources: HashMap::new(),
        })
    }

    /// Watch `source` for `interest` under `token`.
    pub fn register(
        &mut self,
        source: &impl AsRawFd,
        token: Token,
        interest: Interest,
    ) -> Result<()> {
        let fd = source.as_raw_fd();
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token.into(), interest)
            .map_err(TransportError::Poll)?;
        self.sources.insert(token, fd);
        Ok(())
    }

    /// Stop watching the source registered under `token`.
    ///
    /// Must be called before the descriptor is closed. Returns false when
    /// the token was unknown.
    pub fn deregister(&mut self, token: Token) -> Result<bool> {
        let Some(fd) = self.sources.remove(&token) else {
            return Ok(false);
        };
        self.poll
            .registry()
            .deregister(&mut SourceFd(&fd))
            .map_err(TransportError::Poll)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Wait up to `timeout` for readiness.
    ///
    /// `out` is cleared and refilled. An interrupted wait returns zero
    /// events.
    pub fn wait(&mut self, timeout: Duration, out: &mut Vec<Event>) -> Result<usize> {
        out.clear();
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(0),
            Err(err) => return Err(TransportError::Poll(err)),
        }

        out.extend(self.events.iter().map(|event| Event {
            token: Token(event.token().0 as u64),
            readable: event.is_readable(),
            writable: event.is_writable(),
            hangup: event.is_read_closed(),
            error: event.is_error(),
        }));
        if !out.is_empty() {
            trace!(ready = out.len(), "readiness wait returned");
        }
        Ok(out.len())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::SocketAddr;
    use std::time::Instant;

    use super::*;
    use crate::stream::PresenterStream;
    use crate::tcp::TcpAcceptor;

    const LISTENER: Token = Token(0);
    const CLIENT: Token = Token(1);

    fn connected_pair() -> (TcpAcceptor, PresenterStream, PresenterStream) {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).unwrap();
        let client =
            PresenterStream::connect(acceptor.local_addr(), Some(Duration::from_secs(2))).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        let server = loop {
            if let Some((stream, _)) = acceptor.accept().unwrap() {
                break stream;
            }
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        };
        (acceptor, client, server)
    }

    #[test]
    fn timeout_with_no_activity_yields_no_events() {
        let (_acceptor, _client, server) = connected_pair();
        let mut poller = Poller::new().unwrap();
        poller.register(&server, CLIENT, Interest::READABLE).unwrap();

        let mut events = Vec::new();
        let n = poller.wait(Duration::from_millis(20), &mut events).unwrap();
        assert_eq!(n, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn reports_readable_stream() {
        let (_acceptor, mut client, server) = connected_pair();
        let mut poller = Poller::new().unwrap();
        poller.register(&server, CLIENT, Interest::READABLE).unwrap();

        client.write_all(b"x").unwrap();

        let mut events = Vec::new();
        poller.wait(Duration::from_secs(2), &mut events).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token, CLIENT);
        assert!(events[0].readable);
    }

    #[test]
    fn reports_writable_stream() {
        let (_acceptor, _client, server) = connected_pair();
        let mut poller = Poller::new().unwrap();
        poller
            .register(&server, CLIENT, Interest::READABLE | Interest::WRITABLE)
            .unwrap();

        let mut events = Vec::new();
        poller.wait(Duration::from_secs(2), &mut events).unwrap();
        assert_eq!(events.first().map(|e| e.token), Some(CLIENT));
        assert!(events[0].writable);
        assert!(!events[0].readable);
    }

    #[test]
    fn reports_pending_connection_on_listener() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).unwrap();
        let mut poller = Poller::new().unwrap();
        poller.register(&acceptor, LISTENER, Interest::READABLE).unwrap();

        let _client =
            PresenterStream::connect(acceptor.local_addr(), Some(Duration::from_secs(2))).unwrap();

        let mut events = Vec::new();
        poller.wait(Duration::from_secs(2), &mut events).unwrap();
        assert_eq!(events.first().map(|e| e.token), Some(LISTENER));
        assert!(acceptor.accept().unwrap().is_some());
    }

    #[test]
    fn peer_close_wakes_the_wait() {
        let (_acceptor, client, server) = connected_pair();
        let mut poller = Poller::new().unwrap();
        poller.register(&server, CLIENT, Interest::READABLE).unwrap();

        drop(client);

        let mut events = Vec::new();
        poller.wait(Duration::from_secs(2), &mut events).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].readable || events[0].is_closed());
    }

    #[test]
    fn deregister_removes_source() {
        let (_acceptor, mut client, server) = connected_pair();
        let mut poller = Poller::new().unwrap();
        poller.register(&server, CLIENT, Interest::READABLE).unwrap();
        assert_eq!(poller.len(), 1);

        assert!(poller.deregister(CLIENT).unwrap());
        assert!(!poller.deregister(CLIENT).unwrap());
        assert!(poller.is_empty());

        client.write_all(b"x").unwrap();
        let mut events = Vec::new();
        poller.wait(Duration::from_millis(20), &mut events).unwrap();
        assert!(events.is_empty());
    }
}
