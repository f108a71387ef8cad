/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header or name is invalid (bad length arithmetic, non-UTF-8 name).
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The message name does not fit the 1-byte name length.
    #[error("message name too long ({len} bytes, max {max})")]
    NameTooLong { len: usize, max: usize },

    /// The frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream closed with a partially received frame pending.
    #[error("connection closed (incomplete frame)")]
    IncompleteFrame,

    /// The stream closed cleanly between frames.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors that mean the peer went away rather than misbehaved.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::IncompleteFrame | Self::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
