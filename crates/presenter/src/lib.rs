//! Presenter relay: producers push JPEG frames over TCP, consumers watch them.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP acceptor, stream and readiness poller
//! - [`frame`]: name-tagged length-prefixed framing
//! - [`channel`]: channel registry, per-channel mailboxes and the consumer API
//! - [`server`]: socket event loop, message router and producer agent

/// Re-export transport types.
pub mod transport {
    pub use presenter_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use presenter_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use presenter_channel::*;
}

/// Re-export server types.
pub mod server {
    pub use presenter_server::*;
}
