use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use presenter_channel::{ChannelRegistry, ConnectionId};
use presenter_frame::{
    Frame, FrameConfig, FrameError, FrameReader, FrameWriter, ReadStatus, WriteStatus,
};
use presenter_transport::{Interest, Poller, PresenterStream, TcpAcceptor, Token};
use tracing::{debug, error, info, warn};

use crate::error::{ErrorClass, Result, ServerError};
use crate::router::{MessageRouter, RouteAction, RouterConfig};

const LISTENER: Token = Token(0);

/// Socket server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Upper bound of one readiness wait; also bounds shutdown latency.
    pub poll_interval: Duration,
    /// How often idle channels are swept.
    pub sweep_interval: Duration,
    /// Frame limits for producer connections.
    pub frame: FrameConfig,
    /// Reply bytes a connection may have queued before it is dropped as
    /// stalled.
    pub max_outbound: usize,
    pub router: RouterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 7006)),
            poll_interval: Duration::from_millis(100),
            sweep_interval: Duration::from_secs(1),
            frame: FrameConfig::default(),
            max_outbound: 256 * 1024,
            router: RouterConfig::default(),
        }
    }
}

/// Cooperative stop signal for a running server.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Wrap an existing flag, e.g. one flipped by a signal handler.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Ask the server loop to exit at its next iteration.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: FrameReader<PresenterStream>,
    writer: FrameWriter<PresenterStream>,
}

impl Connection {
    /// Push queued replies out without waiting on the socket.
    fn drain_outbound(&mut self, max_outbound: usize) -> Result<()> {
        match self.writer.write_pending()? {
            WriteStatus::Flushed => Ok(()),
            WriteStatus::Pending if self.writer.pending() > max_outbound => {
                Err(ServerError::Stalled {
                    pending: self.writer.pending(),
                })
            }
            WriteStatus::Pending => Ok(()),
        }
    }
}

/// Single-threaded readiness loop serving producer agents.
///
/// Nothing on this thread waits on a peer: replies are queued per connection
/// and written as the socket accepts them, and video frames are handed to
/// per-channel feeder threads.
pub struct PresenterServer {
    acceptor: TcpAcceptor,
    poller: Poller,
    router: MessageRouter,
    registry: Arc<ChannelRegistry>,
    connections: HashMap<Token, Connection>,
    /// Connections that used up their read budget and still have input.
    backlog: Vec<Token>,
    next_id: u64,
    shutdown: ShutdownHandle,
    config: ServerConfig,
}

impl PresenterServer {
    /// Bind the listening socket.
    ///
    /// This is the only failure that stops the server from starting.
    pub fn bind(config: ServerConfig, registry: Arc<ChannelRegistry>) -> Result<Self> {
        let acceptor = TcpAcceptor::bind(config.addr)?;
        let mut poller = Poller::new()?;
        poller.register(&acceptor, LISTENER, Interest::READABLE)?;
        Ok(Self {
            acceptor,
            poller,
            router: MessageRouter::new(Arc::clone(&registry), config.router),
            registry,
            connections: HashMap::new(),
            backlog: Vec::new(),
            next_id: 1,
            shutdown: ShutdownHandle::default(),
            config,
        })
    }

    /// Use an externally owned shutdown flag.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Number of open producer connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run the loop on a dedicated `presenter-server` thread.
    pub fn spawn(self) -> Result<ServerHandle> {
        let local_addr = self.local_addr();
        let shutdown = self.shutdown_handle();
        let thread = std::thread::Builder::new()
            .name("presenter-server".to_string())
            .spawn(move || self.run())
            .map_err(presenter_transport::TransportError::Io)?;
        Ok(ServerHandle {
            local_addr,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Run until the shutdown flag is set.
    pub fn run(mut self) -> Result<()> {
        info!(
            addr = %self.local_addr(),
            transport = self.acceptor.transport_name(),
            "presenter server started"
        );

        let mut events = Vec::new();
        let mut frames = Vec::new();
        let mut last_sweep = Instant::now();

        while !self.shutdown.is_shutdown() {
            let timeout = if self.backlog.is_empty() {
                self.config.poll_interval
            } else {
                Duration::ZERO
            };
            if let Err(err) = self.poller.wait(timeout, &mut events) {
                error!(error = %err, "readiness wait failed");
                std::thread::sleep(self.config.poll_interval);
                continue;
            }

            let backlog = std::mem::take(&mut self.backlog);
            for event in &events {
                if event.token == LISTENER {
                    self.accept_pending();
                    continue;
                }
                if event.writable {
                    self.flush_outbound(event.token);
                }
                if event.readable || event.is_closed() {
                    self.service(event.token, event.is_closed() && !event.readable, &mut frames);
                }
            }
            for token in backlog {
                self.service(token, false, &mut frames);
            }

            if last_sweep.elapsed() >= self.config.sweep_interval {
                self.sweep();
                last_sweep = Instant::now();
            }
        }

        self.stop();
        Ok(())
    }

    fn accept_pending(&mut self) {
        loop {
            match self.acceptor.accept() {
                Ok(Some((stream, peer))) => {
                    if let Err(err) = self.add_connection(stream, peer) {
                        warn!(%peer, error = %err, "dropping accepted connection");
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    return;
                }
            }
        }
    }

    fn add_connection(&mut self, stream: PresenterStream, peer: SocketAddr) -> Result<()> {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        let token = Token(id.0);

        let reader_stream = stream.try_clone()?;
        self.poller
            .register(&stream, token, Interest::READABLE | Interest::WRITABLE)?;
        self.connections.insert(
            token,
            Connection {
                id,
                peer,
                reader: FrameReader::with_config(reader_stream, self.config.frame.clone()),
                writer: FrameWriter::with_config(stream, self.config.frame.clone()),
            },
        );
        info!(connection = %id, %peer, "producer connected");
        Ok(())
    }

    /// Read a connection up to its frame budget and dispatch the frames in
    /// receipt order. Replies are queued and written as far as the socket
    /// allows.
    fn service(&mut self, token: Token, hangup: bool, frames: &mut Vec<Frame>) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        frames.clear();
        let status = conn.reader.pump(frames);

        let mut teardown: Option<ServerError> = None;
        for frame in frames.drain(..) {
            let (reply, close) = match self.router.dispatch(conn.id, &frame) {
                RouteAction::Reply(reply) => (Some(reply), None),
                RouteAction::Silent => (None, None),
                RouteAction::ReplyAndClose(reply, err) => (Some(reply), Some(err)),
                RouteAction::Close(err) => (None, Some(err)),
            };
            if let Some(reply) = reply {
                if let Err(err) = conn.writer.queue(reply.name, &reply.body) {
                    teardown = Some(err.into());
                    break;
                }
            }
            if close.is_some() {
                teardown = close;
                break;
            }
        }

        match teardown {
            // Best effort: the last reply explains why the connection closes.
            Some(_) => {
                let _ = conn.writer.write_pending();
            }
            None => teardown = conn.drain_outbound(self.config.max_outbound).err(),
        }

        let teardown = teardown.or(match status {
            Ok(ReadStatus::WouldBlock) if hangup => Some(FrameError::ConnectionClosed.into()),
            Ok(ReadStatus::WouldBlock) => None,
            Ok(ReadStatus::Budget) => {
                if !self.backlog.contains(&token) {
                    self.backlog.push(token);
                }
                None
            }
            Ok(ReadStatus::Closed) => Some(FrameError::ConnectionClosed.into()),
            Err(err) => Some(err.into()),
        });

        if let Some(reason) = teardown {
            self.teardown(token, &reason);
        }
    }

    /// The socket has room again: write out queued replies.
    fn flush_outbound(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if conn.writer.pending() == 0 {
            return;
        }
        if let Err(reason) = conn.drain_outbound(self.config.max_outbound) {
            self.teardown(token, &reason);
        }
    }

    fn teardown(&mut self, token: Token, reason: &ServerError) {
        let Some(conn) = self.connections.remove(&token) else {
            return;
        };
        self.backlog.retain(|pending| *pending != token);
        if let Err(err) = self.poller.deregister(token) {
            debug!(connection = %conn.id, error = %err, "deregister failed");
        }
        let channel = self.registry.release_connection(conn.id);
        conn.writer.get_ref().close();

        let channel = channel.as_deref().unwrap_or("-");
        if reason.is_disconnect() {
            info!(connection = %conn.id, peer = %conn.peer, %channel, "producer disconnected");
            return;
        }
        match reason.class() {
            ErrorClass::Protocol => {
                warn!(connection = %conn.id, peer = %conn.peer, %channel, error = %reason, "protocol violation, connection closed")
            }
            ErrorClass::ResourceTimeout => {
                info!(connection = %conn.id, peer = %conn.peer, %channel, error = %reason, "connection closed")
            }
            ErrorClass::Transport | ErrorClass::Application => {
                warn!(connection = %conn.id, peer = %conn.peer, %channel, error = %reason, "connection closed")
            }
        }
    }

    /// Unregister idle channels and close their producers.
    fn sweep(&mut self) {
        for expired in self.registry.expire_idle() {
            let reason = ServerError::HeartbeatExpired {
                channel: expired.name,
            };
            self.teardown(Token(expired.connection.0), &reason);
        }
    }

    fn stop(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            if let Some(conn) = self.connections.remove(&token) {
                let _ = self.poller.deregister(token);
                conn.writer.get_ref().close();
                debug!(connection = %conn.id, "connection closed on shutdown");
            }
        }
        self.registry.close_all();
        let _ = self.poller.deregister(LISTENER);
        info!(addr = %self.local_addr(), "presenter server stopped");
    }
}

/// Handle to a server running on its own thread.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signal the loop to stop. Returns immediately.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Wait for the server thread to exit.
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ServerError::ThreadPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shutdown.shutdown();
            let _ = thread.join();
        }
    }
}
