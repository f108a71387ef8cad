//! TCP transport and readiness polling for the presenter relay.
//!
//! This is the lowest layer of the workspace:
//! - [`TcpAcceptor`] binds the producer-facing listening socket
//! - [`PresenterStream`] wraps one accepted (or dialed) connection
//! - [`Poller`] multiplexes readiness and hang-up events on top of `mio`
//!
//! Everything else builds on top of the [`PresenterStream`] type provided here.

pub mod error;
#[cfg(unix)]
pub mod poll;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
#[cfg(unix)]
pub use poll::{Event, Interest, Poller, Token};
pub use stream::PresenterStream;
pub use tcp::TcpAcceptor;
