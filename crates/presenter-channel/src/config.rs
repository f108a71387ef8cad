use std::time::Duration;

/// Per-channel mailbox behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// How long a video publish waits for the previous frame to be consumed
    /// before replacing it.
    pub publish_timeout: Duration,
    /// Sliding window used for the frames-per-second estimate.
    pub fps_window: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_millis(500),
            fps_window: Duration::from_secs(1),
        }
    }
}

/// Registry limits and expiry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of live channels.
    pub max_channels: usize,
    /// Bound channels idle for longer than this are unregistered.
    pub heartbeat_timeout: Duration,
    /// Configuration handed to every runtime the registry creates.
    pub runtime: RuntimeConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_channels: 10,
            heartbeat_timeout: Duration::from_secs(100),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Wait bounds for the consumer read API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// How long `get_channel_state` waits for a video frame.
    pub video_wait: Duration,
    /// How long `next_image` long-polls for a newer image.
    pub image_wait: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            video_wait: Duration::from_secs(2),
            image_wait: Duration::from_secs(10),
        }
    }
}
