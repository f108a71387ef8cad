use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use presenter_transport::PresenterStream;
use tracing::trace;

use crate::codec::{Frame, FrameConfig, FrameHeader, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Where the decoder is within the current frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeState {
    /// Waiting for the 5-byte header.
    AwaitHead,
    /// Header parsed; waiting for `header.name_len` name bytes.
    AwaitName { header: FrameHeader },
    /// Name decoded; waiting for `body_len` body bytes.
    AwaitBody { name: String, body_len: usize },
}

/// Incremental frame assembler.
///
/// Feed it any split of the byte stream; it consumes what it can, keeps its
/// position across calls and yields a frame only once the body is complete.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            state: DecodeState::AwaitHead,
            max_frame_size,
        }
    }

    /// Current assembly state.
    pub fn state(&self) -> &DecodeState {
        &self.state
    }

    /// True when a frame has been started but not finished.
    pub fn is_mid_frame(&self) -> bool {
        self.state != DecodeState::AwaitHead
    }

    /// Forget any partially assembled frame.
    pub fn reset(&mut self) {
        self.state = DecodeState::AwaitHead;
    }

    /// Advance the state machine over `src`.
    ///
    /// Consumed bytes are removed from `src`. Returns `Ok(None)` when more
    /// bytes are needed. On error the decoder is back at `AwaitHead`, but the
    /// stream is no longer trustworthy and should be closed.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            match std::mem::replace(&mut self.state, DecodeState::AwaitHead) {
                DecodeState::AwaitHead => {
                    let Some(header) = FrameHeader::parse(src) else {
                        return Ok(None);
                    };
                    // Validate lengths before buffering anything else.
                    header.body_len(self.max_frame_size)?;
                    src.advance(HEADER_SIZE);
                    self.state = DecodeState::AwaitName { header };
                }
                DecodeState::AwaitName { header } => {
                    let name_len = header.name_len as usize;
                    if src.len() < name_len {
                        self.state = DecodeState::AwaitName { header };
                        return Ok(None);
                    }
                    let raw = src.split_to(name_len);
                    let name = String::from_utf8(raw.to_vec()).map_err(|err| {
                        FrameError::MalformedFrame(format!("message name is not UTF-8: {err}"))
                    })?;
                    let body_len = header.body_len(self.max_frame_size)?;
                    trace!(%name, body_len, "frame header decoded");
                    self.state = DecodeState::AwaitBody { name, body_len };
                }
                DecodeState::AwaitBody { name, body_len } => {
                    if src.len() < body_len {
                        self.state = DecodeState::AwaitBody { name, body_len };
                        return Ok(None);
                    }
                    let body = src.split_to(body_len).freeze();
                    return Ok(Some(Frame { name, body }));
                }
            }
        }
    }
}

/// Outcome of a non-blocking [`FrameReader::pump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The socket has no more data for now.
    WouldBlock,
    /// The frame budget was used up; more data may be buffered or waiting
    /// on the socket, so pump again without waiting for readiness.
    Budget,
    /// The peer closed the stream cleanly between frames.
    Closed,
}

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(config.max_frame_size),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` on EOF between frames and
    /// `Err(FrameError::IncompleteFrame)` on EOF inside one.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(self.closed());
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Drain a non-blocking stream, up to the configured frame budget.
    ///
    /// Reads until the stream would block or `pump_budget` frames have been
    /// appended to `out` in receipt order. Frames appended before an error or
    /// a close are complete and may still be dispatched. A zero-length read
    /// discards any partial frame and yields `ReadStatus::Closed`, or
    /// `Err(FrameError::IncompleteFrame)` if a frame was cut short.
    pub fn pump(&mut self, out: &mut Vec<Frame>) -> Result<ReadStatus> {
        let budget = self.config.pump_budget.max(1);
        let mut produced = 0usize;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            while produced < budget {
                match self.decoder.decode(&mut self.buf)? {
                    Some(frame) => {
                        out.push(frame);
                        produced += 1;
                    }
                    None => break,
                }
            }
            if produced >= budget {
                return Ok(ReadStatus::Budget);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(ReadStatus::WouldBlock)
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return match self.closed() {
                    FrameError::ConnectionClosed => Ok(ReadStatus::Closed),
                    err => Err(err),
                };
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn closed(&mut self) -> FrameError {
        let partial = self.decoder.is_mid_frame() || !self.buf.is_empty();
        self.decoder.reset();
        self.buf.clear();
        if partial {
            FrameError::IncompleteFrame
        } else {
            FrameError::ConnectionClosed
        }
    }

    /// Current decoder state.
    pub fn state(&self) -> &DecodeState {
        self.decoder.state()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<PresenterStream> {
    /// Create a frame reader for `PresenterStream` and apply read timeout from config.
    pub fn with_config_stream(inner: PresenterStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: presenter_transport::TransportError) -> FrameError {
    match err {
        presenter_transport::TransportError::Io(io)
        | presenter_transport::TransportError::Accept(io)
        | presenter_transport::TransportError::Poll(io) => FrameError::Io(io),
        presenter_transport::TransportError::Bind { source, .. }
        | presenter_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
    }
}
