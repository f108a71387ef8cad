use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::error::{ChannelError, Result};
use crate::name::validate_channel_name;
use crate::runtime::{ChannelRuntime, MediaKind, VideoFrame};

/// Identifies one producer connection for the lifetime of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Summary row for channel listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub busy: bool,
    /// Media kind of the most recent producer, if any opened the channel.
    pub media_kind: Option<MediaKind>,
}

/// A channel removed by the heartbeat sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredChannel {
    pub name: String,
    pub connection: ConnectionId,
}

/// The last image published on an image channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub frame: VideoFrame,
    /// Increases with every stored image; never reused within a channel.
    pub generation: u64,
}

#[derive(Debug)]
struct ChannelEntry {
    name: String,
    media_kind: Option<MediaKind>,
    image: Option<StoredImage>,
    image_generation: u64,
}

#[derive(Debug, Clone)]
struct ChannelResource {
    connection: ConnectionId,
    runtime: Arc<ChannelRuntime>,
}

#[derive(Debug, Default)]
struct Bindings {
    by_name: HashMap<String, ChannelResource>,
    by_connection: HashMap<ConnectionId, String>,
}

impl Bindings {
    fn remove_name(&mut self, name: &str) -> Option<ChannelResource> {
        let resource = self.by_name.remove(name)?;
        self.by_connection.remove(&resource.connection);
        Some(resource)
    }

    fn remove_connection(&mut self, connection: ConnectionId) -> Option<(String, ChannelResource)> {
        let name = self.by_connection.remove(&connection)?;
        let resource = self.by_name.remove(&name)?;
        Some((name, resource))
    }
}

/// Table of live channels and their producer bindings.
///
/// Two locks: the channel list and the binding tables. When both are needed
/// the list is taken first. Neither is held while a runtime blocks in
/// `publish` or `poll`.
#[derive(Debug)]
pub struct ChannelRegistry {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    channels: Mutex<Vec<ChannelEntry>>,
    bindings: Mutex<Bindings>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an empty registry whose runtimes read time from `clock`.
    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            channels: Mutex::new(Vec::new()),
            bindings: Mutex::new(Bindings::default()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new, unbound channel. Returns the normalized name.
    pub fn register(&self, name: &str) -> Result<String> {
        let name = validate_channel_name(name)?;
        let mut channels = self.channels.lock();
        if channels.len() >= self.config.max_channels {
            return Err(ChannelError::TooManyChannels {
                max: self.config.max_channels,
            });
        }
        if channels.iter().any(|entry| entry.name == name) {
            return Err(ChannelError::AlreadyExists(name));
        }
        channels.push(ChannelEntry {
            name: name.clone(),
            media_kind: None,
            image: None,
            image_generation: 0,
        });
        info!(channel = %name, live = channels.len(), "channel registered");
        Ok(name)
    }

    /// Remove a channel and close its runtime.
    ///
    /// Idempotent. Returns the producer connection that was bound, so the
    /// caller can close it.
    pub fn unregister(&self, name: &str) -> Option<ConnectionId> {
        let name = name.trim();
        let (removed, resource) = {
            let mut channels = self.channels.lock();
            let before = channels.len();
            channels.retain(|entry| entry.name != name);
            let removed = before != channels.len();
            let resource = self.bindings.lock().remove_name(name);
            (removed, resource)
        };

        if removed {
            info!(channel = %name, "channel unregistered");
        }
        resource.map(|resource| {
            resource.runtime.close();
            resource.connection
        })
    }

    /// Unregister every name in a comma-separated list.
    ///
    /// Blank entries are skipped. Returns the connections that were bound to
    /// removed channels.
    pub fn unregister_many(&self, names: &str) -> Vec<ConnectionId> {
        names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter_map(|name| self.unregister(name))
            .collect()
    }

    /// Build a runtime for `name` using this registry's config and clock.
    pub fn create_runtime(&self, name: &str, kind: MediaKind) -> Arc<ChannelRuntime> {
        Arc::new(ChannelRuntime::new(
            name,
            kind,
            self.config.runtime,
            Arc::clone(&self.clock),
        ))
    }

    /// Bind a producer connection and its runtime to a registered channel.
    ///
    /// Fails with `NoSuchChannel` if the channel is not registered and `Busy`
    /// if another producer holds it. If `connection` already fed a different
    /// channel, that binding is released first. Video runtimes get a feeder
    /// thread that lives until the runtime is closed.
    pub fn bind_resource(
        &self,
        name: &str,
        connection: ConnectionId,
        media_kind: MediaKind,
        runtime: Arc<ChannelRuntime>,
    ) -> Result<()> {
        let previous = {
            let mut channels = self.channels.lock();
            let entry = channels
                .iter_mut()
                .find(|entry| entry.name == name)
                .ok_or_else(|| ChannelError::NoSuchChannel(name.to_string()))?;

            let mut bindings = self.bindings.lock();
            if bindings.by_name.contains_key(name) {
                return Err(ChannelError::Busy(name.to_string()));
            }

            let previous = bindings.remove_connection(connection);
            bindings.by_name.insert(
                name.to_string(),
                ChannelResource {
                    connection,
                    runtime: Arc::clone(&runtime),
                },
            );
            bindings.by_connection.insert(connection, name.to_string());
            entry.media_kind = Some(media_kind);
            previous
        };

        if let Some((previous_name, resource)) = previous {
            debug!(channel = %previous_name, %connection, "released previous binding");
            resource.runtime.close();
        }

        if runtime.kind() == MediaKind::Video {
            if let Err(err) = runtime.spawn_feeder() {
                warn!(channel = %name, error = %err, "failed to start feeder");
                self.release_connection(connection);
                return Err(ChannelError::Feeder {
                    channel: name.to_string(),
                    reason: err.to_string(),
                });
            }
        }
        info!(channel = %name, %connection, kind = %media_kind, "channel bound");
        Ok(())
    }

    /// Drop the binding owned by `connection`, closing its runtime.
    ///
    /// The channel stays registered (and keeps its stored image). Returns the
    /// channel name that was bound.
    pub fn release_connection(&self, connection: ConnectionId) -> Option<String> {
        let (name, resource) = self.bindings.lock().remove_connection(connection)?;
        resource.runtime.close();
        info!(channel = %name, %connection, "channel released");
        Some(name)
    }

    /// Channel currently fed by `connection`.
    pub fn lookup_by_connection(&self, connection: ConnectionId) -> Option<String> {
        self.bindings.lock().by_connection.get(&connection).cloned()
    }

    pub fn runtime_for_connection(&self, connection: ConnectionId) -> Option<Arc<ChannelRuntime>> {
        let bindings = self.bindings.lock();
        let name = bindings.by_connection.get(&connection)?;
        bindings
            .by_name
            .get(name)
            .map(|resource| Arc::clone(&resource.runtime))
    }

    pub fn runtime_for_channel(&self, name: &str) -> Option<Arc<ChannelRuntime>> {
        self.bindings
            .lock()
            .by_name
            .get(name)
            .map(|resource| Arc::clone(&resource.runtime))
    }

    /// Publish a frame on the channel bound to `connection`.
    ///
    /// Never waits: video frames are offered to the channel's feeder thread,
    /// which does the bounded wait on the mailbox. Images are stored on the
    /// channel, so they outlive the producer connection, and published
    /// directly since an image publish only overwrites.
    pub fn publish(&self, connection: ConnectionId, frame: VideoFrame) -> Result<MediaKind> {
        let runtime = self
            .runtime_for_connection(connection)
            .ok_or(ChannelError::NotBound(connection.0))?;

        match runtime.kind() {
            MediaKind::Video => {
                runtime.offer(frame)?;
            }
            MediaKind::Image => {
                if runtime.is_closed() {
                    return Err(ChannelError::Closed(runtime.name().to_string()));
                }
                // Store first: consumers read the runtime generation before
                // the stored image.
                self.store_image(runtime.name(), frame.clone());
                runtime.publish(frame)?;
            }
        }
        Ok(runtime.kind())
    }

    fn store_image(&self, name: &str, frame: VideoFrame) {
        let mut channels = self.channels.lock();
        if let Some(entry) = channels.iter_mut().find(|entry| entry.name == name) {
            entry.image_generation += 1;
            entry.image = Some(StoredImage {
                frame,
                generation: entry.image_generation,
            });
        }
    }

    /// Reset the idle timer of the channel bound to `connection`.
    ///
    /// Returns false when the connection has no channel.
    pub fn heartbeat(&self, connection: ConnectionId) -> bool {
        match self.runtime_for_connection(connection) {
            Some(runtime) => {
                runtime.heartbeat();
                true
            }
            None => false,
        }
    }

    /// Forget the stored image of a channel.
    pub fn clear_channel_image(&self, name: &str) {
        let mut channels = self.channels.lock();
        if let Some(entry) = channels.iter_mut().find(|entry| entry.name == name) {
            entry.image = None;
        }
    }

    /// The last image stored on a channel.
    pub fn stored_image(&self, name: &str) -> Option<StoredImage> {
        self.channels
            .lock()
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.image.clone())
    }

    /// Media kind of the most recent producer that opened `name`.
    pub fn media_kind(&self, name: &str) -> Option<MediaKind> {
        self.channels
            .lock()
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.media_kind)
    }

    /// Unregister every bound channel idle past the heartbeat timeout.
    pub fn expire_idle(&self) -> Vec<ExpiredChannel> {
        let timeout = self.config.heartbeat_timeout;
        self.idle_bindings(timeout)
            .into_iter()
            .filter(|candidate| self.expire_if_idle(candidate, timeout))
            .collect()
    }

    fn idle_bindings(&self, timeout: Duration) -> Vec<ExpiredChannel> {
        self.bindings
            .lock()
            .by_name
            .iter()
            .filter(|(_, resource)| resource.runtime.idle_for() > timeout)
            .map(|(name, resource)| ExpiredChannel {
                name: name.clone(),
                connection: resource.connection,
            })
            .collect()
    }

    /// Unregister `candidate` if it is still bound to the same connection and
    /// still idle. The check and the removal share one critical section, so a
    /// producer that re-bound or spoke since the scan keeps its channel.
    fn expire_if_idle(&self, candidate: &ExpiredChannel, timeout: Duration) -> bool {
        let resource = {
            let mut channels = self.channels.lock();
            let mut bindings = self.bindings.lock();
            match bindings.by_name.get(&candidate.name) {
                Some(resource)
                    if resource.connection == candidate.connection
                        && resource.runtime.idle_for() > timeout => {}
                _ => return false,
            }
            channels.retain(|entry| entry.name != candidate.name);
            bindings.remove_name(&candidate.name)
        };

        info!(
            channel = %candidate.name,
            connection = %candidate.connection,
            timeout_secs = timeout.as_secs(),
            "heartbeat timeout, unregistering channel"
        );
        if let Some(resource) = resource {
            resource.runtime.close();
        }
        true
    }

    /// Close every runtime and drop all bindings. Channels stay registered.
    pub fn close_all(&self) -> Vec<ConnectionId> {
        let drained: Vec<ChannelResource> = {
            let mut bindings = self.bindings.lock();
            bindings.by_connection.clear();
            bindings.by_name.drain().map(|(_, resource)| resource).collect()
        };
        for resource in &drained {
            resource.runtime.close();
        }
        drained.into_iter().map(|resource| resource.connection).collect()
    }

    /// All registered channels in registration order.
    pub fn list_channels(&self) -> Vec<ChannelInfo> {
        let channels = self.channels.lock();
        let bindings = self.bindings.lock();
        channels
            .iter()
            .map(|entry| ChannelInfo {
                name: entry.name.clone(),
                busy: bindings.by_name.contains_key(&entry.name),
                media_kind: entry.media_kind,
            })
            .collect()
    }

    pub fn is_channel_exist(&self, name: &str) -> bool {
        self.channels.lock().iter().any(|entry| entry.name == name)
    }

    pub fn is_channel_busy(&self, name: &str) -> bool {
        self.bindings.lock().by_name.contains_key(name)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }
}
