//! Data types for INSTEON entities.
//!
//! This module contains the core data structures used throughout the library:
//! - Device addresses
//! - Messages and message flags
//! - Link records and linking modes
//! - Modem information and configuration

pub mod address;
pub mod device;
pub mod link;
pub mod message;

pub use address::{ADDRESS_LEN, Address};
pub use device::{BridgeConfig, BridgeInfo, DeviceIdentity, LinkResult, ProductInfo};
pub use link::{AllLinkCompleted, AllLinkRecord, LinkRecord, LinkingMode};
pub use message::{
    InsteonMessage, MessageFlags, OutboundMessage, USERDATA_LEN, Userdata, checksum, commands,
};
