//! All-link (pairing) data structures.

use crate::error::FrameError;
use crate::types::Address;
use crate::types::message::USERDATA_LEN;

/// Bit 6 of a link record flags byte marks the controller side.
pub(crate) const CONTROLLER_BIT: u8 = 1 << 6;

/// Bit 7 of a link record flags byte marks the record as in use.
pub(crate) const IN_USE_BIT: u8 = 1 << 7;

/// How the modem enters all-linking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkingMode {
    /// Modem role: `Some(true)` controller, `Some(false)` responder, `None`
    /// decided by which device enters linking mode first.
    pub controller: Option<bool>,
    /// Delete the link instead of creating it.
    pub remove: bool,
    /// All-link group.
    pub group: u8,
}

impl Default for LinkingMode {
    fn default() -> Self {
        Self {
            controller: None,
            remove: false,
            group: 1,
        }
    }
}

impl LinkingMode {
    /// Linking mode that deletes links in `group`.
    #[must_use]
    pub const fn remove(group: u8) -> Self {
        Self {
            controller: None,
            remove: true,
            group,
        }
    }

    /// Encodes the mode byte sent with start-all-linking.
    #[must_use]
    pub const fn code(self) -> u8 {
        if self.remove {
            0xff
        } else {
            match self.controller {
                None => 0x03,
                Some(true) => 0x01,
                Some(false) => 0x00,
            }
        }
    }

    /// Decodes a mode byte.
    pub const fn from_code(code: u8, group: u8) -> Result<Self, FrameError> {
        let (controller, remove) = match code {
            0x00 => (Some(false), false),
            0x01 => (Some(true), false),
            0x03 => (None, false),
            0xff => (None, true),
            value => {
                return Err(FrameError::InvalidValue {
                    field: "linking code",
                    value,
                });
            }
        };
        Ok(Self {
            controller,
            remove,
            group,
        })
    }
}

/// Result of an all-linking session, reported spontaneously by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllLinkCompleted {
    /// Modem was the controller.
    pub controller: bool,
    /// The link was deleted rather than created.
    pub removed: bool,
    /// All-link group.
    pub group: u8,
    /// The other device.
    pub address: Address,
    /// Device category.
    pub category: u8,
    /// Device subcategory.
    pub subcategory: u8,
    /// Device firmware version.
    pub firmware_version: u8,
}

impl AllLinkCompleted {
    pub(crate) const fn code(&self) -> u8 {
        if self.removed {
            0xff
        } else if self.controller {
            0x01
        } else {
            0x00
        }
    }
}

/// A record of the modem's own link database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllLinkRecord {
    /// Modem is the controller in this link.
    pub controller: bool,
    /// All-link group.
    pub group: u8,
    /// The linked device.
    pub address: Address,
    /// Three bytes of link data (device specific).
    pub link_data: [u8; 3],
}

/// A record read from a device's link database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRecord {
    /// Memory offset of the record.
    pub at: u16,
    /// Device is the controller in this link.
    pub controller: bool,
    /// All-link group; 0 marks the end of the database.
    pub group: u8,
    /// The linked device.
    pub address: Address,
}

impl LinkRecord {
    /// Decodes a record from a read/write-links reply data block.
    ///
    /// Layout:
    /// ```text
    /// [unused:1] [0x01:1] [at:2BE] [unused:1] [flags:1] [group:1] [address:3] [data:3] [checksum:1]
    /// ```
    pub fn from_userdata(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() != USERDATA_LEN {
            return Err(FrameError::InvalidLength {
                expected: USERDATA_LEN,
                got: data.len(),
            });
        }
        if data[1] != 0x01 {
            return Err(FrameError::InvalidValue {
                field: "link record marker",
                value: data[1],
            });
        }

        Ok(Self {
            at: u16::from_be_bytes([data[2], data[3]]),
            controller: data[5] & CONTROLLER_BIT != 0,
            group: data[6],
            address: Address::new([data[7], data[8], data[9]]),
        })
    }

    /// True for the sentinel record that ends a database listing.
    #[must_use]
    pub const fn is_end(&self) -> bool {
        self.group == 0
    }
}
