use std::sync::Arc;

use presenter_channel::{validate_channel_name, ChannelError, ChannelRegistry, ConnectionId};
use presenter_frame::Frame;
use prost::Message;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::messages::{
    ChannelContentType, HeartbeatMessage, ImageFormat, OpenChannelErrorCode, OpenChannelRequest,
    OpenChannelResponse, PresentDataErrorCode, PresentImageRequest, PresentImageResponse,
    HEARTBEAT_MESSAGE, OPEN_CHANNEL_REQUEST, OPEN_CHANNEL_RESPONSE, PRESENT_IMAGE_REQUEST,
    PRESENT_IMAGE_RESPONSE,
};

/// Router behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Register unknown channels named in an open-channel request.
    pub auto_register: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            auto_register: true,
        }
    }
}

/// An encoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub name: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    fn open(code: OpenChannelErrorCode, message: impl Into<String>) -> Self {
        Self {
            name: OPEN_CHANNEL_RESPONSE,
            body: OpenChannelResponse::new(code, message).encode_to_vec(),
        }
    }

    fn present(code: PresentDataErrorCode, message: impl Into<String>) -> Self {
        Self {
            name: PRESENT_IMAGE_RESPONSE,
            body: PresentImageResponse::new(code, message).encode_to_vec(),
        }
    }
}

/// What the event loop should do after a frame was handled.
#[derive(Debug)]
pub enum RouteAction {
    /// Send the reply; the connection stays open.
    Reply(Reply),
    /// Nothing to send.
    Silent,
    /// Send the reply, then close the connection.
    ReplyAndClose(Reply, ServerError),
    /// Close the connection without replying.
    Close(ServerError),
}

/// Maps incoming frames to registry operations and responses.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    registry: Arc<ChannelRegistry>,
    config: RouterConfig,
}

impl MessageRouter {
    pub fn new(registry: Arc<ChannelRegistry>, config: RouterConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Handle one complete frame from `connection`.
    ///
    /// Never blocks: video frames are handed to the channel's feeder thread.
    pub fn dispatch(&self, connection: ConnectionId, frame: &Frame) -> RouteAction {
        match frame.name.as_str() {
            OPEN_CHANNEL_REQUEST => self.open_channel(connection, frame),
            PRESENT_IMAGE_REQUEST => self.present_image(connection, frame),
            HEARTBEAT_MESSAGE => self.heartbeat(connection, frame),
            other => RouteAction::Close(ServerError::UnknownMessage(other.to_string())),
        }
    }

    fn open_channel(&self, connection: ConnectionId, frame: &Frame) -> RouteAction {
        let request = match OpenChannelRequest::decode(frame.body.clone()) {
            Ok(request) => request,
            Err(err) => {
                return RouteAction::ReplyAndClose(
                    Reply::open(
                        OpenChannelErrorCode::Other,
                        "Unknown err open channel unknown channel.",
                    ),
                    err.into(),
                )
            }
        };

        let raw_name = request.channel_name.trim();
        let kind = match ChannelContentType::try_from(request.content_type) {
            Ok(content_type) => content_type.into(),
            Err(_) => {
                return RouteAction::ReplyAndClose(
                    Reply::open(
                        OpenChannelErrorCode::Other,
                        format!("Unknown err open channel {raw_name}."),
                    ),
                    ServerError::UnsupportedContentType(request.content_type),
                )
            }
        };

        let name = match validate_channel_name(raw_name) {
            Ok(name) => name,
            Err(err) => {
                info!(%connection, channel = %raw_name, error = %err, "open channel refused");
                return RouteAction::Reply(Reply::open(OpenChannelErrorCode::Other, err.to_string()));
            }
        };

        if !self.registry.is_channel_exist(&name) {
            if !self.config.auto_register {
                info!(%connection, channel = %name, "open channel refused, channel not registered");
                return RouteAction::Reply(Reply::open(
                    OpenChannelErrorCode::NoSuchChannel,
                    format!("channel {name} not exist."),
                ));
            }
            match self.registry.register(&name) {
                Ok(_) | Err(ChannelError::AlreadyExists(_)) => {}
                // Registered concurrently while the table was at its limit.
                Err(ChannelError::TooManyChannels { .. })
                    if self.registry.is_channel_exist(&name) => {}
                Err(err) => {
                    warn!(%connection, channel = %name, error = %err, "auto-register failed");
                    return RouteAction::Reply(Reply::open(
                        OpenChannelErrorCode::Other,
                        err.to_string(),
                    ));
                }
            }
        }

        let runtime = self.registry.create_runtime(&name, kind);
        match self.registry.bind_resource(&name, connection, kind, runtime) {
            Ok(()) => {
                self.registry.clear_channel_image(&name);
                RouteAction::Reply(Reply::open(OpenChannelErrorCode::None, "open channel succeed"))
            }
            Err(ChannelError::Busy(_)) => {
                info!(%connection, channel = %name, "open channel refused, channel busy");
                RouteAction::Reply(Reply::open(
                    OpenChannelErrorCode::AlreadyOpened,
                    format!("channel {name} is busy."),
                ))
            }
            Err(ChannelError::NoSuchChannel(_)) => RouteAction::Reply(Reply::open(
                OpenChannelErrorCode::NoSuchChannel,
                format!("channel {name} not exist."),
            )),
            Err(err) => RouteAction::Reply(Reply::open(
                OpenChannelErrorCode::Other,
                format!("Unknown err open channel {name}: {err}."),
            )),
        }
    }

    fn present_image(&self, connection: ConnectionId, frame: &Frame) -> RouteAction {
        let request = match PresentImageRequest::decode(frame.body.clone()) {
            Ok(request) => request,
            Err(err) => {
                return RouteAction::ReplyAndClose(
                    Reply::present(PresentDataErrorCode::Other, "Present data not known error."),
                    err.into(),
                )
            }
        };

        if ImageFormat::try_from(request.format).is_err() {
            info!(%connection, format = request.format, "image format not supported");
            return RouteAction::Reply(Reply::present(
                PresentDataErrorCode::UnsupportedFormat,
                "Present data not support format.",
            ));
        }

        match self.registry.publish(connection, request.to_frame()) {
            Ok(_) => RouteAction::Reply(Reply::present(PresentDataErrorCode::None, "Present data ok")),
            Err(err) => {
                debug!(%connection, error = %err, "present image refused");
                RouteAction::Reply(Reply::present(
                    PresentDataErrorCode::Other,
                    "Present data not known error.",
                ))
            }
        }
    }

    fn heartbeat(&self, connection: ConnectionId, frame: &Frame) -> RouteAction {
        if let Err(err) = HeartbeatMessage::decode(frame.body.clone()) {
            return RouteAction::Close(err.into());
        }
        if !self.registry.heartbeat(connection) {
            debug!(%connection, "heartbeat on connection without channel");
        }
        RouteAction::Silent
    }
}
