//! Device addresses.

use std::str::FromStr;

use crate::error::AddressError;

/// Length of a device address in bytes.
pub const ADDRESS_LEN: usize = 3;

/// A 3-byte INSTEON device address, written as 6 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Creates an address from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Returns the address as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses an address from 6 hex characters (either case).
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError {
            input: s.to_owned(),
        };

        if s.len() != ADDRESS_LEN * 2 {
            return Err(invalid());
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let address: Address = "F1f2F3".parse().unwrap();
        assert_eq!(address.as_bytes(), &[0xf1, 0xf2, 0xf3]);
        assert_eq!(address.to_string(), "f1f2f3");
    }

    #[test]
    fn test_case_insensitive_equality() {
        let upper: Address = "AABBCC".parse().unwrap();
        let lower: Address = "aabbcc".parse().unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!("ffff".parse::<Address>().is_err());
        assert!("fffffff".parse::<Address>().is_err());
        assert!("gg0000".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }
}
