//! Presenter socket server.
//!
//! [`PresenterServer`] runs a single-threaded readiness loop: it accepts
//! producer connections, assembles frames with a per-connection
//! [`FrameReader`](presenter_frame::FrameReader), hands each frame to the
//! [`MessageRouter`], and tears connections down on hang-up, protocol errors
//! or heartbeat expiry. [`PresenterAgent`] is the matching producer client.

pub mod agent;
pub mod error;
pub mod messages;
pub mod router;
pub mod server;

pub use agent::{AgentConfig, PresenterAgent};
pub use error::{ErrorClass, Result, ServerError};
pub use messages::{
    ChannelContentType, Coordinate, HeartbeatMessage, ImageFormat, OpenChannelErrorCode,
    OpenChannelRequest, OpenChannelResponse, PresentDataErrorCode, PresentImageRequest,
    PresentImageResponse, RectangleAttr,
};
pub use router::{MessageRouter, Reply, RouteAction, RouterConfig};
pub use server::{PresenterServer, ServerConfig, ServerHandle, ShutdownHandle};
