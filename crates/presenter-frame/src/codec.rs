use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: total length (4) + name length (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Longest message name the 1-byte name length can describe.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Default maximum total frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Default number of frames one non-blocking pump may yield.
pub const DEFAULT_PUMP_BUDGET: usize = 64;

/// A named message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type name, e.g. `ascend.presenter.proto.HeartbeatMessage`.
    pub name: String,
    /// Serialized message body.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(name: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    /// The total wire size of this frame (header + name + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.name.len() + self.body.len()
    }
}

/// Parsed fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame length, header included.
    pub total_len: u32,
    /// Length of the UTF-8 name that follows the header.
    pub name_len: u8,
}

impl FrameHeader {
    /// Parse the first [`HEADER_SIZE`] bytes of `src`.
    ///
    /// Returns `None` if fewer bytes are available.
    pub fn parse(src: &[u8]) -> Option<Self> {
        if src.len() < HEADER_SIZE {
            return None;
        }
        let total_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        Some(Self {
            total_len,
            name_len: src[4],
        })
    }

    /// Body length implied by the header.
    ///
    /// Fails with `MalformedFrame` when the total length cannot even hold the
    /// header and the name, and with `FrameTooLarge` above `max_frame`.
    pub fn body_len(&self, max_frame: usize) -> Result<usize> {
        let total = self.total_len as usize;
        if total > max_frame {
            return Err(FrameError::FrameTooLarge {
                size: total,
                max: max_frame,
            });
        }
        let prefix = HEADER_SIZE + self.name_len as usize;
        total.checked_sub(prefix).ok_or_else(|| {
            FrameError::MalformedFrame(format!(
                "total length {total} shorter than header and name ({prefix})"
            ))
        })
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────┬──────────────┬──────────────────┐
/// │ Total length │ Name len │ Name         │ Body             │
/// │ (4B BE)      │ (1B)     │ (UTF-8)      │ (remaining)      │
/// └──────────────┴──────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_frame(name: &str, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(FrameError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    let total = HEADER_SIZE + name.len() + body.len();
    if total > u32::MAX as usize {
        return Err(FrameError::FrameTooLarge {
            size: total,
            max: u32::MAX as usize,
        });
    }
    dst.reserve(total);
    dst.put_u32(total as u32);
    dst.put_u8(name.len() as u8);
    dst.put_slice(name.as_bytes());
    dst.put_slice(body);
    Ok(())
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet; the
/// buffer is left untouched in that case. On success, consumes the frame bytes
/// from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_frame: usize) -> Result<Option<Frame>> {
    let Some(header) = FrameHeader::parse(src) else {
        return Ok(None); // Need more data
    };

    let body_len = header.body_len(max_frame)?;
    let name_len = header.name_len as usize;
    if src.len() < header.total_len as usize {
        return Ok(None); // Need more data
    }

    let name = std::str::from_utf8(&src[HEADER_SIZE..HEADER_SIZE + name_len])
        .map_err(|err| FrameError::MalformedFrame(format!("message name is not UTF-8: {err}")))?
        .to_string();

    src.advance(HEADER_SIZE + name_len);
    let body = src.split_to(body_len).freeze();

    Ok(Some(Frame { name, body }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum total frame size in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
    /// Frames a single non-blocking pump yields before handing control
    /// back. Default: 64.
    pub pump_budget: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            read_timeout: None,
            write_timeout: None,
            pump_budget: DEFAULT_PUMP_BUDGET,
        }
    }
}
