//! # insteon-plm
//!
//! An async driver for INSTEON PowerLinc Modems (PLMs) on a serial port.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Serialized command queue with NAK retries and timeouts
//! - Event-driven delivery of spontaneous modem frames and device messages
//! - Linking, link database and on/off workflows
//!
//! ## Quick Start
//!
//! ```no_run
//! use insteon_plm::{Address, Hub, TurnOn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), insteon_plm::Error> {
//!     let hub = Hub::open("/dev/ttyUSB0").await?;
//!
//!     let info = hub.bridge().get_info().await?;
//!     println!("Modem address: {}", info.address);
//!
//!     let lamp: Address = "112233".parse()?;
//!     hub.turn_on(lamp, TurnOn::default().level(50)).await?;
//!
//!     hub.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Each layer owns the one below it:
//!
//! - [`protocol`] - Frame codec and command codes
//! - [`bridge`] - Modem frames: ACK/NAK correlation and retries
//! - [`messenger`] - INSTEON messages to and from devices
//! - [`hub`] - Device operations and linking workflows
//! - [`event`] - Pending matches and broadcast subscriptions
//! - [`transport`] - Opening the serial port

pub mod bridge;
pub mod error;
pub mod event;
pub mod hub;
pub mod messenger;
pub mod products;
pub mod protocol;
pub mod queue;
pub mod rates;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use bridge::{Bridge, BridgeOptions, SendOptions};
pub use error::{AddressError, Error, ErrorKind, FrameError, Result};
pub use event::{EventDispatcher, MessageFilter, PendingMatch, Subscription};
pub use hub::{Hub, LinkOptions, Links, TurnOff, TurnOn};
pub use messenger::{Messenger, MessengerOptions};
pub use protocol::{Command, Frame, FrameBuffer, Payload};
pub use transport::{SerialConfig, SerialTransport, Transport, serial::list_ports};
pub use types::{
    Address, AllLinkCompleted, AllLinkRecord, BridgeConfig, BridgeInfo, DeviceIdentity,
    InsteonMessage, LinkRecord, LinkResult, LinkingMode, MessageFlags, OutboundMessage,
    ProductInfo,
};
