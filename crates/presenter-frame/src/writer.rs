use std::io::{ErrorKind, Write};

use bytes::{Buf, BytesMut};
use presenter_transport::PresenterStream;

use crate::codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Outcome of [`FrameWriter::write_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Every queued byte reached the stream.
    Flushed,
    /// The stream would block; the rest stays queued.
    Pending,
}

/// Writes complete frames to any `Write` stream.
///
/// Frames are encoded onto one outbound buffer, so frames from one writer
/// never interleave on the wire. Blocking callers use [`send`](Self::send);
/// a readiness loop uses [`queue`](Self::queue) and drains with
/// [`write_pending`](Self::write_pending) whenever the socket is writable.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(&frame.name, frame.body.as_ref())
    }

    /// Encode and send a named message body, blocking until it is written.
    ///
    /// A stream that would block (a write timeout on a blocking socket) is
    /// reported as `TimedOut`; the unsent remainder is discarded since the
    /// peer can no longer parse the stream.
    pub fn send(&mut self, name: &str, body: &[u8]) -> Result<()> {
        self.queue(name, body)?;
        match self.write_pending()? {
            WriteStatus::Flushed => Ok(()),
            WriteStatus::Pending => {
                self.buf.clear();
                Err(FrameError::Io(std::io::Error::new(
                    ErrorKind::TimedOut,
                    "frame write timed out",
                )))
            }
        }
    }

    /// Encode a named message body onto the outbound buffer without
    /// touching the stream.
    pub fn queue(&mut self, name: &str, body: &[u8]) -> Result<()> {
        let size = HEADER_SIZE + name.len() + body.len();
        if size > self.config.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.config.max_frame_size,
            });
        }
        encode_frame(name, body, &mut self.buf)
    }

    /// Write as much of the outbound buffer as the stream takes.
    ///
    /// Never waits on a non-blocking stream: `WouldBlock` leaves the
    /// remainder queued and returns [`WriteStatus::Pending`].
    pub fn write_pending(&mut self) -> Result<WriteStatus> {
        while !self.buf.is_empty() {
            match self.inner.write(&self.buf) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => self.buf.advance(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(WriteStatus::Pending),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        self.flush()?;
        Ok(WriteStatus::Flushed)
    }

    /// Bytes queued but not yet written.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<PresenterStream> {
    /// Create a frame writer for `PresenterStream` and apply write timeout from config.
    pub fn with_config_stream(inner: PresenterStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::{decode_frame, DEFAULT_MAX_FRAME};
    use crate::reader::FrameReader;

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> BytesMut {
        BytesMut::from(writer.into_inner().into_inner().as_slice())
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer
            .send("ascend.presenter.proto.OpenChannelResponse", b"\x08\x02")
            .unwrap();

        let mut wire = written(writer);
        let frame = decode_frame(&mut wire, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(frame.name, "ascend.presenter.proto.OpenChannelResponse");
        assert_eq!(frame.body.as_ref(), b"\x08\x02");
    }

    #[test]
    fn frames_are_written_in_order() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send("one", b"1").unwrap();
        writer.write_frame(&Frame::new("two", &b"22"[..])).unwrap();
        writer.send("three", b"").unwrap();

        let mut reader = FrameReader::new(Cursor::new(written(writer).to_vec()));
        let names: Vec<String> = (0..3).map(|_| reader.read_frame().unwrap().name).collect();
        assert_eq!(names, ["one", "two", "three"]);
    }

    #[test]
    fn frame_over_limit_rejected_before_writing() {
        let cfg = FrameConfig {
            max_frame_size: 16,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send("name", b"much too long a body").unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { max: 16, .. }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn long_name_rejected() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let err = writer.send(&"x".repeat(300), b"").unwrap_err();
        assert!(matches!(err, FrameError::NameTooLong { .. }));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send("hb", b"").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn retries_interrupted_writes() {
        let sink = FlakyWriter {
            failures: vec![ErrorKind::Interrupted, ErrorKind::Interrupted],
            flush_failures: vec![ErrorKind::Interrupted],
            data: Vec::new(),
        };
        let mut writer = FrameWriter::new(sink);
        writer.send("retry", b"body").unwrap();

        let mut wire = BytesMut::from(writer.into_inner().data.as_slice());
        let frame = decode_frame(&mut wire, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(frame, Frame::new("retry", &b"body"[..]));
    }

    #[test]
    fn send_reports_would_block_as_timeout() {
        let sink = FlakyWriter {
            failures: vec![ErrorKind::WouldBlock],
            flush_failures: Vec::new(),
            data: Vec::new(),
        };
        let mut writer = FrameWriter::new(sink);

        let err = writer.send("stuck", b"body").unwrap_err();
        assert!(matches!(err, FrameError::Io(ref io) if io.kind() == ErrorKind::TimedOut));
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn queued_frames_drain_across_would_block() {
        let sink = ThrottledWriter {
            capacity: 4,
            data: Vec::new(),
        };
        let mut writer = FrameWriter::new(sink);
        writer.queue("one", b"1").unwrap();
        writer.queue("two", b"22").unwrap();
        let total = writer.pending();

        assert_eq!(writer.write_pending().unwrap(), WriteStatus::Pending);
        assert_eq!(writer.pending(), total - 4);

        writer.get_mut().capacity = usize::MAX;
        assert_eq!(writer.write_pending().unwrap(), WriteStatus::Flushed);
        assert_eq!(writer.pending(), 0);

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner().data));
        assert_eq!(reader.read_frame().unwrap(), Frame::new("one", &b"1"[..]));
        assert_eq!(reader.read_frame().unwrap(), Frame::new("two", &b"22"[..]));
    }

    #[test]
    fn queue_rejects_oversized_frame() {
        let cfg = FrameConfig {
            max_frame_size: 16,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        assert!(writer.queue("name", b"much too long a body").is_err());
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send("x", b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn applies_write_timeout_for_presenter_stream() {
        let acceptor =
            presenter_transport::TcpAcceptor::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let client = PresenterStream::connect(
            acceptor.local_addr(),
            Some(std::time::Duration::from_secs(2)),
        )
        .unwrap();

        let cfg = FrameConfig {
            write_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };

        let writer = FrameWriter::with_config_stream(client, cfg);
        assert!(writer.is_ok());
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        assert_eq!(writer.config().max_frame_size, DEFAULT_MAX_FRAME);
        let _inner = writer.into_inner();
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails with the queued error kinds first, then accepts one byte per write.
    struct FlakyWriter {
        failures: Vec<ErrorKind>,
        flush_failures: Vec<ErrorKind>,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.failures.pop() {
                return Err(std::io::Error::from(kind));
            }
            self.data.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            match self.flush_failures.pop() {
                Some(kind) => Err(std::io::Error::from(kind)),
                None => Ok(()),
            }
        }
    }

    /// Accepts up to `capacity` bytes in total, then would block.
    struct ThrottledWriter {
        capacity: usize,
        data: Vec<u8>,
    }

    impl Write for ThrottledWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let room = self.capacity.saturating_sub(self.data.len());
            if room == 0 {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            let n = room.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
