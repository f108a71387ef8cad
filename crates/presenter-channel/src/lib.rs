//! Named channels between producer connections and consumers.
//!
//! A [`ChannelRegistry`] owns the table of live channels and which producer
//! connection currently feeds each one. Every bound channel gets a
//! [`ChannelRuntime`]: a single-slot mailbox for video (the producer waits
//! for the consumer to drain the previous frame) or an overwrite cell for
//! images. [`ConsumerApi`] is the read side used by viewers.
//!
//! All waits are bounded condition-variable waits; closing a runtime wakes
//! every thread blocked on it.

pub mod clock;
pub mod config;
pub mod consumer;
pub mod error;
pub mod name;
pub mod registry;
pub mod runtime;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConsumerConfig, RegistryConfig, RuntimeConfig};
pub use consumer::{ChannelState, ChannelStatus, ConsumerApi, ImageUpdate, ManageOutcome};
pub use error::{ChannelError, Result};
pub use name::{validate_channel_name, MAX_CHANNEL_NAME_LEN};
pub use registry::{ChannelInfo, ChannelRegistry, ConnectionId, ExpiredChannel, StoredImage};
pub use runtime::{Annotation, ChannelRuntime, MediaKind, PolledFrame, VideoFrame};
