//! Protobuf payloads exchanged with producer agents.
//!
//! Each payload travels in a frame whose name is the fully qualified message
//! name, e.g. `ascend.presenter.proto.OpenChannelRequest`.

use bytes::Bytes;
use presenter_channel::{Annotation, MediaKind, VideoFrame};

/// Protobuf package of every presenter message.
pub const PACKAGE: &str = "ascend.presenter.proto";

pub const OPEN_CHANNEL_REQUEST: &str = "ascend.presenter.proto.OpenChannelRequest";
pub const OPEN_CHANNEL_RESPONSE: &str = "ascend.presenter.proto.OpenChannelResponse";
pub const PRESENT_IMAGE_REQUEST: &str = "ascend.presenter.proto.PresentImageRequest";
pub const PRESENT_IMAGE_RESPONSE: &str = "ascend.presenter.proto.PresentImageResponse";
pub const HEARTBEAT_MESSAGE: &str = "ascend.presenter.proto.HeartbeatMessage";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ChannelContentType {
    Image = 0,
    Video = 1,
}

impl From<ChannelContentType> for MediaKind {
    fn from(value: ChannelContentType) -> Self {
        match value {
            ChannelContentType::Image => MediaKind::Image,
            ChannelContentType::Video => MediaKind::Video,
        }
    }
}

impl From<MediaKind> for ChannelContentType {
    fn from(value: MediaKind) -> Self {
        match value {
            MediaKind::Image => ChannelContentType::Image,
            MediaKind::Video => ChannelContentType::Video,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum OpenChannelErrorCode {
    None = 0,
    NoSuchChannel = 1,
    AlreadyOpened = 2,
    Other = -1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ImageFormat {
    Jpeg = 0,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PresentDataErrorCode {
    None = 0,
    UnsupportedType = 1,
    UnsupportedFormat = 2,
    Other = -1,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OpenChannelRequest {
    #[prost(string, tag = "1")]
    pub channel_name: String,
    #[prost(enumeration = "ChannelContentType", tag = "2")]
    pub content_type: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OpenChannelResponse {
    #[prost(enumeration = "OpenChannelErrorCode", tag = "1")]
    pub error_code: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Coordinate {
    #[prost(uint32, tag = "1")]
    pub x: u32,
    #[prost(uint32, tag = "2")]
    pub y: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RectangleAttr {
    #[prost(message, optional, tag = "1")]
    pub left_top: Option<Coordinate>,
    #[prost(message, optional, tag = "2")]
    pub right_bottom: Option<Coordinate>,
    #[prost(string, tag = "3")]
    pub label_text: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PresentImageRequest {
    #[prost(enumeration = "ImageFormat", tag = "1")]
    pub format: i32,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub height: u32,
    #[prost(bytes = "bytes", tag = "4")]
    pub data: Bytes,
    #[prost(message, repeated, tag = "5")]
    pub rectangle_list: Vec<RectangleAttr>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PresentImageResponse {
    #[prost(enumeration = "PresentDataErrorCode", tag = "1")]
    pub error_code: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HeartbeatMessage {}

macro_rules! impl_name {
    ($($ty:ident),* $(,)?) => {
        $(
            impl prost::Name for $ty {
                const NAME: &'static str = stringify!($ty);
                const PACKAGE: &'static str = PACKAGE;
            }
        )*
    };
}

impl_name!(
    OpenChannelRequest,
    OpenChannelResponse,
    PresentImageRequest,
    PresentImageResponse,
    HeartbeatMessage,
    RectangleAttr,
    Coordinate,
);

impl From<&RectangleAttr> for Annotation {
    fn from(rect: &RectangleAttr) -> Self {
        let left_top = rect.left_top.clone().unwrap_or_default();
        let right_bottom = rect.right_bottom.clone().unwrap_or_default();
        Annotation {
            left: left_top.x,
            top: left_top.y,
            right: right_bottom.x,
            bottom: right_bottom.y,
            label: rect.label_text.clone(),
        }
    }
}

impl From<&Annotation> for RectangleAttr {
    fn from(annotation: &Annotation) -> Self {
        RectangleAttr {
            left_top: Some(Coordinate {
                x: annotation.left,
                y: annotation.top,
            }),
            right_bottom: Some(Coordinate {
                x: annotation.right,
                y: annotation.bottom,
            }),
            label_text: annotation.label.clone(),
        }
    }
}

impl PresentImageRequest {
    /// A JPEG request carrying `frame`.
    pub fn jpeg(frame: &VideoFrame) -> Self {
        Self {
            format: ImageFormat::Jpeg as i32,
            width: frame.width,
            height: frame.height,
            data: frame.data.clone(),
            rectangle_list: frame.annotations.iter().map(RectangleAttr::from).collect(),
        }
    }

    /// The frame this request publishes.
    pub fn to_frame(&self) -> VideoFrame {
        VideoFrame::new(self.data.clone(), self.width, self.height)
            .with_annotations(self.rectangle_list.iter().map(Annotation::from).collect())
    }
}

impl OpenChannelResponse {
    pub fn new(code: OpenChannelErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code: code as i32,
            error_message: message.into(),
        }
    }
}

impl PresentImageResponse {
    pub fn new(code: PresentDataErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code: code as i32,
            error_message: message.into(),
        }
    }
}
