use std::net::SocketAddr;
use std::time::Duration;

use presenter_channel::{MediaKind, VideoFrame};
use presenter_frame::{FrameConfig, FrameReader, FrameWriter, DEFAULT_MAX_FRAME};
use presenter_transport::PresenterStream;
use prost::Name;
use tracing::debug;

use crate::error::{Result, ServerError};
use crate::messages::{
    ChannelContentType, HeartbeatMessage, OpenChannelErrorCode, OpenChannelRequest,
    OpenChannelResponse, PresentDataErrorCode, PresentImageRequest, PresentImageResponse,
};

/// Producer-side connection settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Bound on the TCP handshake.
    pub connect_timeout: Option<Duration>,
    /// Bound on each blocking read or write.
    pub io_timeout: Option<Duration>,
    /// Largest frame the agent sends or accepts.
    pub max_frame_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(5)),
            io_timeout: Some(Duration::from_secs(5)),
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

/// Blocking producer client: opens one channel and pushes images into it.
pub struct PresenterAgent {
    peer: SocketAddr,
    reader: FrameReader<PresenterStream>,
    writer: FrameWriter<PresenterStream>,
    channel: Option<String>,
}

impl PresenterAgent {
    /// Connect to a presenter server.
    pub fn connect(addr: SocketAddr, config: &AgentConfig) -> Result<Self> {
        let stream = PresenterStream::connect(addr, config.connect_timeout)?;
        let reader_stream = stream.try_clone()?;

        let frame_config = FrameConfig {
            max_frame_size: config.max_frame_size,
            read_timeout: config.io_timeout,
            write_timeout: config.io_timeout,
            ..FrameConfig::default()
        };
        let reader = FrameReader::with_config_stream(reader_stream, frame_config.clone())?;
        let writer = FrameWriter::with_config_stream(stream, frame_config)?;

        Ok(Self {
            peer: addr,
            reader,
            writer,
            channel: None,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Channel opened by the last successful `open_channel`.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Send a request and return the server's raw response.
    pub fn open(&mut self, request: &OpenChannelRequest) -> Result<OpenChannelResponse> {
        self.send(request)?;
        self.recv()
    }

    /// Open (and bind this connection to) a channel.
    ///
    /// Any refusal is returned as [`ServerError::OpenRejected`].
    pub fn open_channel(&mut self, name: &str, kind: MediaKind) -> Result<()> {
        let response = self.open(&OpenChannelRequest {
            channel_name: name.to_string(),
            content_type: ChannelContentType::from(kind) as i32,
        })?;
        let code = response.error_code();
        if code != OpenChannelErrorCode::None {
            return Err(ServerError::OpenRejected {
                code,
                message: response.error_message,
            });
        }
        debug!(channel = %name, %kind, "channel opened");
        self.channel = Some(name.to_string());
        Ok(())
    }

    /// Send an image request and return the server's raw response.
    pub fn present(&mut self, request: &PresentImageRequest) -> Result<PresentImageResponse> {
        self.send(request)?;
        self.recv()
    }

    /// Publish a JPEG frame on the open channel.
    ///
    /// Any refusal is returned as [`ServerError::PresentRejected`].
    pub fn present_image(&mut self, frame: &VideoFrame) -> Result<()> {
        let response = self.present(&PresentImageRequest::jpeg(frame))?;
        let code = response.error_code();
        if code != PresentDataErrorCode::None {
            return Err(ServerError::PresentRejected {
                code,
                message: response.error_message,
            });
        }
        Ok(())
    }

    /// Keep the open channel alive. The server does not answer.
    pub fn heartbeat(&mut self) -> Result<()> {
        self.send(&HeartbeatMessage {})
    }

    /// Close the connection; the server releases the channel.
    pub fn close(self) {
        self.writer.get_ref().close();
    }

    fn send<M: Name>(&mut self, message: &M) -> Result<()> {
        self.writer
            .send(&M::full_name(), &message.encode_to_vec())
            .map_err(Into::into)
    }

    fn recv<M: Name + Default>(&mut self) -> Result<M> {
        let frame = self.reader.read_frame()?;
        let expected = M::full_name();
        if frame.name != expected {
            return Err(ServerError::UnexpectedResponse {
                expected: M::NAME,
                got: frame.name,
            });
        }
        Ok(M::decode(frame.body)?)
    }
}

impl std::fmt::Debug for PresenterAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenterAgent")
            .field("peer", &self.peer)
            .field("channel", &self.channel)
            .finish()
    }
}
