//! Modem and device information structures.

use crate::types::Address;

/// Modem identity, as returned by get-IM-info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeInfo {
    /// The modem's own address.
    pub address: Address,
    /// Device category.
    pub category: u8,
    /// Device subcategory.
    pub subcategory: u8,
    /// Firmware version.
    pub firmware_version: u8,
}

const AUTOMATIC_LINKING: u8 = 1 << 6;
const MONITOR_MODE: u8 = 1 << 5;
const AUTOMATIC_LED: u8 = 1 << 4;
const DEADMAN: u8 = 1 << 3;

/// Modem configuration flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeConfig {
    /// Disables automatic linking when the SET button is held.
    pub automatic_linking: bool,
    /// Monitor mode: report messages not addressed to the modem.
    pub monitor_mode: bool,
    /// Disables automatic LED operation.
    pub automatic_led: bool,
    /// Disables the host communications deadman timer.
    pub deadman: bool,
}

impl BridgeConfig {
    /// Unpacks a configuration byte.
    #[must_use]
    pub const fn from_byte(bits: u8) -> Self {
        Self {
            automatic_linking: bits & AUTOMATIC_LINKING != 0,
            monitor_mode: bits & MONITOR_MODE != 0,
            automatic_led: bits & AUTOMATIC_LED != 0,
            deadman: bits & DEADMAN != 0,
        }
    }

    /// Packs the configuration into a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        let mut bits = 0;
        if self.automatic_linking {
            bits |= AUTOMATIC_LINKING;
        }
        if self.monitor_mode {
            bits |= MONITOR_MODE;
        }
        if self.automatic_led {
            bits |= AUTOMATIC_LED;
        }
        if self.deadman {
            bits |= DEADMAN;
        }
        bits
    }
}

/// Product name lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductInfo {
    /// Marketing name.
    pub name: &'static str,
    /// Product (SKU) number; absent for category-level entries.
    pub product: Option<&'static str>,
}

/// Identity reported by a device in response to an ID request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Device category.
    pub category: u8,
    /// Device subcategory.
    pub subcategory: u8,
    /// Firmware version.
    pub firmware_version: u8,
    /// Product lookup, when the category/subcategory is known.
    pub product: Option<ProductInfo>,
}

/// A completed link, decorated with product information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkResult {
    /// Completion details reported by the modem.
    pub link: crate::types::AllLinkCompleted,
    /// Product lookup, when the category/subcategory is known.
    pub product: Option<ProductInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_bits() {
        let all = BridgeConfig::from_byte(0xff);
        assert!(all.automatic_linking && all.monitor_mode && all.automatic_led && all.deadman);
        assert_eq!(all.as_byte(), 0x78);

        let led = BridgeConfig {
            automatic_led: true,
            ..BridgeConfig::default()
        };
        assert_eq!(led.as_byte(), 0x10);
        assert_eq!(BridgeConfig::from_byte(0x10), led);
    }
}
