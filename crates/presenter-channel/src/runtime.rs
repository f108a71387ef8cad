use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::error::{ChannelError, Result};

/// What a producer feeds into a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still images; the latest one is kept and re-read by every consumer.
    Image,
    /// A frame stream handed to consumers one frame at a time.
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labelled rectangle in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub label: String,
}

/// One image payload with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Encoded image bytes (JPEG).
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub annotations: Vec<Annotation>,
}

impl VideoFrame {
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            annotations: Vec::new(),
        }
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }
}

/// A frame handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledFrame {
    pub frame: VideoFrame,
    /// Publishes seen within the fps window when this frame was published.
    pub fps: u32,
    /// Publish sequence number of this frame within its runtime.
    pub generation: u64,
}

#[derive(Debug)]
struct Slot {
    frame: Option<VideoFrame>,
    /// Frame handed over by `offer`, waiting for the feeder thread.
    incoming: Option<VideoFrame>,
    fps: u32,
    generation: u64,
    publish_times: VecDeque<Instant>,
    last_activity: Instant,
    dropped_frames: u64,
    closed: bool,
}

/// Synchronization point between one producer and its consumers.
///
/// For [`MediaKind::Video`] this is a single-slot mailbox: a publish waits
/// (up to `publish_timeout`) while the previous frame is unconsumed, and a
/// poll empties the slot. For [`MediaKind::Image`] publishes overwrite and
/// polls read without consuming.
///
/// A socket loop must not wait on a full video slot, so it hands frames over
/// with [`offer`](Self::offer) and a per-channel feeder thread
/// ([`spawn_feeder`](Self::spawn_feeder)) performs the waiting publish.
#[derive(Debug)]
pub struct ChannelRuntime {
    name: String,
    kind: MediaKind,
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl ChannelRuntime {
    pub fn new(
        name: impl Into<String>,
        kind: MediaKind,
        config: RuntimeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            kind,
            config,
            clock,
            slot: Mutex::new(Slot {
                frame: None,
                incoming: None,
                fps: 0,
                generation: 0,
                publish_times: VecDeque::new(),
                last_activity: now,
                dropped_frames: 0,
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Hand a frame to consumers.
    ///
    /// Video: if the slot still holds an unconsumed frame, waits for a poll to
    /// drain it. When `publish_timeout` passes first, the stale frame is
    /// dropped and replaced. Image: overwrites immediately.
    ///
    /// Fails with [`ChannelError::Closed`] once the runtime is closed,
    /// including while waiting.
    pub fn publish(&self, frame: VideoFrame) -> Result<u64> {
        let mut slot = self.slot.lock();
        if slot.closed {
            return Err(ChannelError::Closed(self.name.clone()));
        }

        if self.kind == MediaKind::Video && slot.frame.is_some() {
            let deadline = Instant::now() + self.config.publish_timeout;
            while slot.frame.is_some() && !slot.closed {
                if self.changed.wait_until(&mut slot, deadline).timed_out() {
                    break;
                }
            }
            if slot.closed {
                return Err(ChannelError::Closed(self.name.clone()));
            }
            if slot.frame.is_some() {
                slot.dropped_frames += 1;
                warn!(
                    channel = %self.name,
                    dropped = slot.dropped_frames,
                    "consumer did not drain frame in time, replacing it"
                );
            }
        }

        let now = self.clock.now();
        let window = self.config.fps_window;
        slot.publish_times.push_back(now);
        while let Some(oldest) = slot.publish_times.front() {
            if now.saturating_duration_since(*oldest) < window {
                break;
            }
            slot.publish_times.pop_front();
        }
        slot.fps = slot.publish_times.len() as u32;
        slot.generation += 1;
        slot.last_activity = now;
        slot.frame = Some(frame);
        let generation = slot.generation;
        drop(slot);

        self.changed.notify_all();
        Ok(generation)
    }

    /// Hand a frame to the feeder thread without waiting.
    ///
    /// A frame the feeder has not picked up yet is superseded and counted as
    /// dropped. Fails with [`ChannelError::Closed`] once the runtime is closed.
    pub fn offer(&self, frame: VideoFrame) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.closed {
            return Err(ChannelError::Closed(self.name.clone()));
        }
        if slot.incoming.replace(frame).is_some() {
            slot.dropped_frames += 1;
            debug!(
                channel = %self.name,
                dropped = slot.dropped_frames,
                "feeder still busy, superseding queued frame"
            );
        }
        slot.last_activity = self.clock.now();
        drop(slot);

        self.changed.notify_all();
        Ok(())
    }

    /// Move offered frames into the mailbox until the runtime closes.
    ///
    /// Each frame goes through [`publish`](Self::publish), so the feeder (not
    /// the caller of `offer`) is the one that waits on a full slot.
    pub fn feed(&self) {
        loop {
            let frame = {
                let mut slot = self.slot.lock();
                loop {
                    if slot.closed {
                        return;
                    }
                    if let Some(frame) = slot.incoming.take() {
                        break frame;
                    }
                    self.changed.wait(&mut slot);
                }
            };
            if self.publish(frame).is_err() {
                return;
            }
        }
    }

    /// Run [`feed`](Self::feed) on a dedicated `feed-<channel>` thread.
    ///
    /// The thread exits once the runtime is closed.
    pub fn spawn_feeder(self: &Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        let runtime = Arc::clone(self);
        std::thread::Builder::new()
            .name(format!("feed-{}", self.name))
            .spawn(move || {
                runtime.feed();
                debug!(channel = %runtime.name, "feeder stopped");
            })
    }

    /// Wait up to `timeout` for a frame.
    ///
    /// Video polls take the frame out of the slot and wake a waiting
    /// publisher. Image polls return a copy of the current image. Returns
    /// `None` on timeout or once the runtime is closed.
    pub fn poll(&self, timeout: Duration) -> Option<PolledFrame> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.frame.is_none() && !slot.closed {
            if self.changed.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        if slot.closed {
            return None;
        }

        let polled = match self.kind {
            MediaKind::Video => slot.frame.take().map(|frame| PolledFrame {
                frame,
                fps: slot.fps,
                generation: slot.generation,
            }),
            MediaKind::Image => slot.frame.clone().map(|frame| PolledFrame {
                frame,
                fps: slot.fps,
                generation: slot.generation,
            }),
        };
        let drained = self.kind == MediaKind::Video && polled.is_some();
        drop(slot);

        if drained {
            self.changed.notify_all();
        }
        polled
    }

    /// Long-poll for a frame newer than `generation`.
    ///
    /// Never consumes: video frames stay in the slot for `poll`. Returns
    /// `None` on timeout or close.
    pub fn wait_newer(&self, generation: u64, timeout: Duration) -> Option<PolledFrame> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        loop {
            if slot.closed {
                return None;
            }
            if slot.generation > generation {
                if let Some(frame) = slot.frame.clone() {
                    return Some(PolledFrame {
                        frame,
                        fps: slot.fps,
                        generation: slot.generation,
                    });
                }
            }
            if self.changed.wait_until(&mut slot, deadline).timed_out() {
                return None;
            }
        }
    }

    /// Record producer liveness without publishing.
    pub fn heartbeat(&self) {
        self.slot.lock().last_activity = self.clock.now();
    }

    /// Time since the last publish or heartbeat.
    pub fn idle_for(&self) -> Duration {
        let last = self.slot.lock().last_activity;
        self.clock.now().saturating_duration_since(last)
    }

    /// Publishes within the fps window ending now.
    pub fn fps(&self) -> u32 {
        let now = self.clock.now();
        let slot = self.slot.lock();
        slot.publish_times
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.config.fps_window)
            .count() as u32
    }

    /// Number of frames published so far.
    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Video frames replaced before any consumer saw them.
    pub fn dropped_frames(&self) -> u64 {
        self.slot.lock().dropped_frames
    }

    /// True while a frame is waiting in the slot.
    pub fn has_frame(&self) -> bool {
        self.slot.lock().frame.is_some()
    }

    /// Close the runtime and wake every waiter.
    ///
    /// Idempotent. Pending frames are discarded.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        if slot.closed {
            return;
        }
        slot.closed = true;
        slot.frame = None;
        slot.incoming = None;
        drop(slot);

        debug!(channel = %self.name, kind = %self.kind, "channel runtime closed");
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }
}
