/// Errors raised by channel registration, binding and publishing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The name is empty once surrounding whitespace is trimmed.
    #[error("channel name can not be empty")]
    EmptyName,

    /// The name exceeds the maximum length.
    #[error("channel name {name:?} is longer than {max} characters")]
    NameTooLong { name: String, max: usize },

    /// The name contains characters outside `[0-9A-Za-z/]`.
    #[error("channel name {0:?} contains invalid characters")]
    InvalidCharacter(String),

    /// The live channel limit has been reached.
    #[error("only {max} channels are supported")]
    TooManyChannels { max: usize },

    /// A channel with the same name is already registered.
    #[error("channel {0} already exists")]
    AlreadyExists(String),

    /// No channel with this name is registered.
    #[error("channel {0} does not exist")]
    NoSuchChannel(String),

    /// The channel is already bound to a producer connection.
    #[error("channel {0} is busy")]
    Busy(String),

    /// The connection has no channel bound to it.
    #[error("connection {0} has no open channel")]
    NotBound(u64),

    /// The channel runtime was closed by unregister, expiry or shutdown.
    #[error("channel {0} is closed")]
    Closed(String),

    /// The feeder thread for a video channel could not be started.
    #[error("failed to start feeder for channel {channel}: {reason}")]
    Feeder { channel: String, reason: String },
}

impl ChannelError {
    /// True for rejections of the channel name itself.
    pub fn is_invalid_name(&self) -> bool {
        matches!(
            self,
            Self::EmptyName | Self::NameTooLong { .. } | Self::InvalidCharacter(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
