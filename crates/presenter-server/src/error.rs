use crate::messages::{OpenChannelErrorCode, PresentDataErrorCode};

/// How a failure affects the connection it happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Socket, framing or payload decoding failed; the connection is closed.
    Transport,
    /// The peer broke the message protocol; logged and the connection closed.
    Protocol,
    /// A request was refused; answered on the same connection, which stays open.
    Application,
    /// A channel went quiet and was unregistered.
    ResourceTimeout,
}

/// Errors that can occur in server and agent operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] presenter_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] presenter_frame::FrameError),

    /// A message body could not be decoded.
    #[error("payload decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// A registry or runtime operation was refused.
    #[error("channel error: {0}")]
    Channel(#[from] presenter_channel::ChannelError),

    /// A frame arrived with a message name the server does not handle.
    #[error("unknown message {0:?}")]
    UnknownMessage(String),

    /// An open-channel request named an unknown content type.
    #[error("unsupported content type {0}")]
    UnsupportedContentType(i32),

    /// The peer answered with a different message than expected.
    #[error("expected {expected}, got {got}")]
    UnexpectedResponse { expected: &'static str, got: String },

    /// The server refused to open a channel.
    #[error("open channel refused ({code:?}): {message}")]
    OpenRejected {
        code: OpenChannelErrorCode,
        message: String,
    },

    /// The server refused an image.
    #[error("present image refused ({code:?}): {message}")]
    PresentRejected {
        code: PresentDataErrorCode,
        message: String,
    },

    /// The peer stopped reading and its queued replies outgrew the limit.
    #[error("peer stopped reading, {pending} reply bytes queued")]
    Stalled { pending: usize },

    /// The channel saw no frame or heartbeat within the timeout.
    #[error("channel {channel} heartbeat expired")]
    HeartbeatExpired { channel: String },

    /// The server thread panicked.
    #[error("server thread panicked")]
    ThreadPanicked,
}

impl ServerError {
    /// Classify this error by its effect on the connection.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transport(_)
            | Self::Frame(_)
            | Self::Decode(_)
            | Self::Stalled { .. }
            | Self::ThreadPanicked => ErrorClass::Transport,
            Self::UnknownMessage(_)
            | Self::UnsupportedContentType(_)
            | Self::UnexpectedResponse { .. } => ErrorClass::Protocol,
            Self::Channel(_) | Self::OpenRejected { .. } | Self::PresentRejected { .. } => {
                ErrorClass::Application
            }
            Self::HeartbeatExpired { .. } => ErrorClass::ResourceTimeout,
        }
    }

    /// True when the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Frame(err) if err.is_disconnect())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use presenter_channel::ChannelError;
    use presenter_frame::FrameError;

    #[test]
    fn classifies_by_connection_effect() {
        assert_eq!(
            ServerError::from(FrameError::MalformedFrame("x".into())).class(),
            ErrorClass::Transport
        );
        assert_eq!(
            ServerError::Stalled { pending: 1 }.class(),
            ErrorClass::Transport
        );
        assert_eq!(
            ServerError::UnknownMessage("x".into()).class(),
            ErrorClass::Protocol
        );
        assert_eq!(
            ServerError::from(ChannelError::Busy("cam1".into())).class(),
            ErrorClass::Application
        );
        assert_eq!(
            ServerError::HeartbeatExpired {
                channel: "cam1".into()
            }
            .class(),
            ErrorClass::ResourceTimeout
        );
    }

    #[test]
    fn disconnect_detection() {
        assert!(ServerError::from(FrameError::ConnectionClosed).is_disconnect());
        assert!(ServerError::from(FrameError::IncompleteFrame).is_disconnect());
        assert!(!ServerError::UnsupportedContentType(7).is_disconnect());
    }
}
