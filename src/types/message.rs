//! INSTEON messages carried inside modem frames.

use crate::error::{Error, Result};
use crate::types::Address;

/// Length of the extended message user data block.
pub const USERDATA_LEN: usize = 14;

/// A 14-byte extended message data block.
pub type Userdata = [u8; USERDATA_LEN];

const BROADCAST: u8 = 1 << 7;
const ALL_LINK: u8 = 1 << 6;
const ACK: u8 = 1 << 5;
const EXTENDED: u8 = 1 << 4;
const HOPS_MASK: u8 = 0b11;

/// Message flags byte.
///
/// ```text
/// bit 7     6       5   4        3..2           1..0
///     bcast allLink ack extended hopsRemaining  maxHops
/// ```
///
/// A message is *direct* when neither `broadcast` nor `all_link` is set;
/// see [`MessageFlags::direct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFlags {
    /// Broadcast message (or NAK of a direct message when `ack` is set).
    pub broadcast: bool,
    /// All-link message.
    pub all_link: bool,
    /// Acknowledgement.
    pub ack: bool,
    /// Extended message with a 14-byte data block.
    pub extended: bool,
    /// Hops left (0..=3).
    pub hops_remaining: u8,
    /// Maximum hops (0..=3).
    pub max_hops: u8,
}

impl Default for MessageFlags {
    fn default() -> Self {
        Self {
            broadcast: false,
            all_link: false,
            ack: false,
            extended: false,
            hops_remaining: 3,
            max_hops: 3,
        }
    }
}

impl MessageFlags {
    /// Unpacks a flags byte.
    #[must_use]
    pub const fn from_byte(bits: u8) -> Self {
        Self {
            broadcast: bits & BROADCAST != 0,
            all_link: bits & ALL_LINK != 0,
            ack: bits & ACK != 0,
            extended: bits & EXTENDED != 0,
            hops_remaining: (bits >> 2) & HOPS_MASK,
            max_hops: bits & HOPS_MASK,
        }
    }

    /// Packs the flags into a byte. Hop counts are masked to 2 bits.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        let mut bits = 0;
        if self.broadcast {
            bits |= BROADCAST;
        }
        if self.all_link {
            bits |= ALL_LINK;
        }
        if self.ack {
            bits |= ACK;
        }
        if self.extended {
            bits |= EXTENDED;
        }
        bits | ((self.hops_remaining & HOPS_MASK) << 2) | (self.max_hops & HOPS_MASK)
    }

    /// True when the message is neither broadcast nor all-link.
    #[must_use]
    pub const fn direct(self) -> bool {
        !self.broadcast && !self.all_link
    }

    /// Extended-length direct message flags.
    #[must_use]
    pub fn extended() -> Self {
        Self {
            extended: true,
            ..Self::default()
        }
    }
}

/// A message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsteonMessage {
    /// Sending device.
    pub from: Address,
    /// Destination device (or category/subcategory/firmware for some broadcasts).
    pub to: Address,
    /// Message flags.
    pub flags: MessageFlags,
    /// Command byte 1.
    pub cmd1: u8,
    /// Command byte 2.
    pub cmd2: u8,
    /// Extended data block, present for extended messages.
    pub userdata: Option<Userdata>,
}

/// Message commands (cmd1 values).
pub mod commands {
    pub const HEARTBEAT: u8 = 0x04;
    pub const DIMMING_COMPLETE: u8 = 0x06;
    pub const EXIT_LINKING: u8 = 0x08;
    pub const ENTER_LINKING: u8 = 0x09;
    pub const ENTER_UNLINKING: u8 = 0x0a;
    pub const PING: u8 = 0x0f;
    pub const ID_REQUEST: u8 = 0x10;
    pub const ON: u8 = 0x11;
    pub const ON_FAST: u8 = 0x12;
    pub const OFF: u8 = 0x13;
    pub const OFF_FAST: u8 = 0x14;
    pub const START_MANUAL_CHANGE: u8 = 0x17;
    pub const STOP_MANUAL_CHANGE: u8 = 0x18;
    pub const STATUS_REQUEST: u8 = 0x19;
    pub const GET_OP_FLAGS: u8 = 0x1f;
    pub const SET_OP_FLAGS: u8 = 0x20;
    pub const ON_WITH_RATE: u8 = 0x2e;
    pub const OFF_WITH_RATE: u8 = 0x2f;
    /// Same byte as `OFF_WITH_RATE`; sent as an extended message.
    pub const READ_WRITE_LINKS: u8 = 0x2f;
}

/// A message to send to a device.
///
/// Build one with [`OutboundMessage::new`] and the setters; defaults are
/// `cmd2 = 0` and standard direct flags with 3 hops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination device.
    pub to: Address,
    /// Message flags.
    pub flags: MessageFlags,
    /// Command byte 1.
    pub cmd1: u8,
    /// Command byte 2.
    pub cmd2: u8,
    /// Extended data block. The last byte is replaced by the checksum on the wire.
    pub userdata: Option<Userdata>,
}

impl OutboundMessage {
    /// Creates a standard direct message.
    #[must_use]
    pub fn new(to: Address, cmd1: u8) -> Self {
        Self {
            to,
            flags: MessageFlags::default(),
            cmd1,
            cmd2: 0,
            userdata: None,
        }
    }

    /// Parses the destination and creates a message.
    pub fn addressed(to: &str, cmd1: u8) -> Result<Self> {
        Ok(Self::new(to.parse()?, cmd1))
    }

    /// Sets cmd2.
    #[must_use]
    pub const fn cmd2(mut self, cmd2: u8) -> Self {
        self.cmd2 = cmd2;
        self
    }

    /// Sets the flags.
    #[must_use]
    pub const fn flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Marks the message extended.
    #[must_use]
    pub const fn extended(mut self) -> Self {
        self.flags.extended = true;
        self
    }

    /// Attaches a user data block, which makes the message extended.
    #[must_use]
    pub const fn userdata(mut self, userdata: Userdata) -> Self {
        self.userdata = Some(userdata);
        self
    }

    /// Attaches user data from a slice, which must be exactly 14 bytes.
    pub fn userdata_slice(self, data: &[u8]) -> Result<Self> {
        let block: Userdata = data.try_into().map_err(|_| {
            Error::validation(format!(
                "expected userdata to be {USERDATA_LEN} bytes, got {}",
                data.len()
            ))
        })?;
        Ok(self.userdata(block))
    }

    /// Applies defaults: userdata forces `extended`, and an extended message
    /// without userdata gets a zeroed block.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.userdata.is_some() {
            self.flags.extended = true;
        }
        if self.flags.extended && self.userdata.is_none() {
            self.userdata = Some([0; USERDATA_LEN]);
        }
        self
    }
}

/// Computes the extended message checksum over cmd1, cmd2 and the first 13
/// user data bytes.
#[must_use]
pub fn checksum(cmd1: u8, cmd2: u8, userdata: &[u8]) -> u8 {
    let sum = userdata
        .iter()
        .take(USERDATA_LEN - 1)
        .fold(cmd1.wrapping_add(cmd2), |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}
