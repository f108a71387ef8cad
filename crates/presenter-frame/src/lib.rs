//! Length-prefixed, named-message framing.
//!
//! Every message on a presenter socket is framed as:
//! - a 4-byte big-endian total length (header + name + body)
//! - a 1-byte name length
//! - the UTF-8 message name
//! - an opaque body
//!
//! [`FrameReader`] tolerates arbitrary partial reads and only ever yields
//! complete frames; [`FrameWriter`] writes whole frames, either blocking or
//! through an outbound buffer drained as the socket allows.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, FrameHeader, DEFAULT_MAX_FRAME,
    DEFAULT_PUMP_BUDGET, HEADER_SIZE, MAX_NAME_LEN,
};
pub use error::{FrameError, Result};
pub use reader::{DecodeState, FrameDecoder, FrameReader, ReadStatus};
pub use writer::{FrameWriter, WriteStatus};
