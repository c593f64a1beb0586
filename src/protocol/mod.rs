//! Modem serial protocol.
//!
//! This module contains the low-level wire types:
//! - Command codes
//! - Frame encoding/decoding and stream reassembly

pub mod command;
pub mod frame;

pub use command::Command;
pub use frame::{ACK, Frame, FrameBuffer, NAK, Payload, START, decode, encode};
