//! Transport layer for modem communication.
//!
//! A [`Transport`] opens the byte stream the bridge talks over. The serial
//! port is the only physical transport; tests and embedders can hand the
//! bridge any other duplex stream via
//! [`Bridge::from_stream`](crate::Bridge::from_stream).

pub mod serial;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Something that can open a byte stream to a modem.
pub trait Transport: Send {
    /// The opened stream.
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Opens the stream.
    fn open(&mut self) -> BoxFuture<'_, Result<Self::Stream>>;

    /// Human-readable name of the endpoint, for logging.
    fn name(&self) -> &str;
}

pub use serial::{SerialConfig, SerialTransport};
