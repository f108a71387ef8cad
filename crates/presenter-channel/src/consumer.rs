use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::config::ConsumerConfig;
use crate::error::{ChannelError, Result};
use crate::registry::{ChannelInfo, ChannelRegistry};
use crate::runtime::{Annotation, MediaKind, VideoFrame};

/// Whether a channel has something to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    /// A frame is included.
    Ok,
    /// The channel exists but has no frame yet.
    Loading,
    /// The channel does not exist.
    Error,
}

/// Snapshot of a channel for viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelState {
    pub name: String,
    pub media_kind: Option<MediaKind>,
    #[serde(skip)]
    pub image: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Annotation>>,
    pub status: ChannelStatus,
}

impl ChannelState {
    fn empty(name: &str, media_kind: Option<MediaKind>, status: ChannelStatus) -> Self {
        Self {
            name: name.to_string(),
            media_kind,
            image: None,
            fps: None,
            width: None,
            height: None,
            annotations: None,
            status,
        }
    }

    fn with_frame(name: &str, media_kind: MediaKind, frame: VideoFrame, fps: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            media_kind: Some(media_kind),
            image: Some(frame.data),
            fps,
            width: Some(frame.width),
            height: Some(frame.height),
            annotations: Some(frame.annotations),
            status: ChannelStatus::Ok,
        }
    }
}

/// A newer image returned by [`ConsumerApi::next_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpdate {
    pub generation: u64,
    pub frame: VideoFrame,
}

/// Result of a channel management request, with a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManageOutcome {
    pub success: bool,
    pub message: String,
}

impl ManageOutcome {
    fn success() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Read side of the registry for viewers and the management front end.
#[derive(Debug, Clone)]
pub struct ConsumerApi {
    registry: Arc<ChannelRegistry>,
    config: ConsumerConfig,
}

impl ConsumerApi {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self::with_config(registry, ConsumerConfig::default())
    }

    pub fn with_config(registry: Arc<ChannelRegistry>, config: ConsumerConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn list_channels(&self) -> Vec<ChannelInfo> {
        self.registry.list_channels()
    }

    /// Current content of a channel.
    ///
    /// Image channels answer from the stored image immediately. Bound video
    /// channels wait up to `video_wait` and consume the pending frame.
    pub fn get_channel_state(&self, name: &str) -> ChannelState {
        if !self.registry.is_channel_exist(name) {
            return ChannelState::empty(name, None, ChannelStatus::Error);
        }

        if let Some(stored) = self.registry.stored_image(name) {
            return ChannelState::with_frame(name, MediaKind::Image, stored.frame, None);
        }

        let media_kind = self.registry.media_kind(name);
        match self.registry.runtime_for_channel(name) {
            Some(runtime) if runtime.kind() == MediaKind::Video => {
                match runtime.poll(self.config.video_wait) {
                    Some(polled) => ChannelState::with_frame(
                        name,
                        MediaKind::Video,
                        polled.frame,
                        Some(polled.fps),
                    ),
                    None => ChannelState::empty(name, media_kind, ChannelStatus::Loading),
                }
            }
            _ => ChannelState::empty(name, media_kind, ChannelStatus::Loading),
        }
    }

    /// Long-poll for an image newer than `since_generation`.
    ///
    /// Returns immediately when the stored image is already newer; otherwise
    /// waits up to `image_wait` on the bound image runtime. `Ok(None)` means
    /// nothing newer arrived.
    pub fn next_image(&self, name: &str, since_generation: u64) -> Result<Option<ImageUpdate>> {
        let deadline = Instant::now() + self.config.image_wait;
        loop {
            if !self.registry.is_channel_exist(name) {
                return Err(ChannelError::NoSuchChannel(name.to_string()));
            }
            // Images are stored before the runtime generation moves, so a
            // generation read here can never miss a store checked below.
            let runtime = self
                .registry
                .runtime_for_channel(name)
                .filter(|runtime| runtime.kind() == MediaKind::Image);
            let seen = runtime.as_ref().map(|runtime| runtime.generation());

            if let Some(stored) = self.registry.stored_image(name) {
                if stored.generation > since_generation {
                    return Ok(Some(ImageUpdate {
                        generation: stored.generation,
                        frame: stored.frame,
                    }));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let (Some(runtime), Some(seen)) = (runtime, seen) else {
                return Ok(None);
            };
            if remaining.is_zero() || runtime.wait_newer(seen, remaining).is_none() {
                return Ok(None);
            }
        }
    }

    /// Register a channel on behalf of the management front end.
    pub fn add_channel(&self, name: &str) -> ManageOutcome {
        match self.registry.register(name) {
            Ok(name) => {
                info!(channel = %name, "add channel succeed");
                ManageOutcome::success()
            }
            Err(err) => {
                info!(channel = %name.trim(), error = %err, "add channel failed");
                ManageOutcome::error(add_failure_message(&err))
            }
        }
    }

    /// Unregister a comma-separated list of channels.
    ///
    /// Producers bound to removed channels stay connected but unbound; their
    /// next frame is answered with an error.
    pub fn delete_channels(&self, names: &str) -> ManageOutcome {
        if names.trim().is_empty() {
            return ManageOutcome::error("Channel name should not be empty");
        }
        let released = self.registry.unregister_many(names);
        info!(names = %names, released = released.len(), "delete channels succeed");
        ManageOutcome::success()
    }
}

fn add_failure_message(err: &ChannelError) -> String {
    match err {
        ChannelError::EmptyName => "Channel name can not be empty".to_string(),
        ChannelError::NameTooLong { max, .. } => {
            format!("Length of channel name should be at most {max}")
        }
        ChannelError::InvalidCharacter(_) => "Channel name only support 0-9, a-z, A-Z /".to_string(),
        ChannelError::TooManyChannels { max } => format!("Only supports up to {max} channels"),
        ChannelError::AlreadyExists(name) => format!("Channel {name} already exist"),
        other => other.to_string(),
    }
}
