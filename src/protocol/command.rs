//! Modem command bytes.
//!
//! Every frame exchanged with the modem starts with `0x02` followed by one of
//! these command bytes. Frames sent by the host are echoed back by the modem
//! with an ACK (`0x06`) or NAK (`0x15`) terminator appended; the four
//! spontaneous commands are only ever sent by the modem and carry no
//! terminator.

/// Modem command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    // Spontaneous, modem to host
    /// Standard-length message received from the bus.
    StandardMessageReceived = 0x50,
    /// Extended-length message received from the bus.
    ExtendedMessageReceived = 0x51,
    /// An all-linking session finished.
    AllLinkingCompleted = 0x53,
    /// One record of the modem link database.
    AllLinkRecordResponse = 0x57,

    // Host to modem, echoed with ACK/NAK
    /// Get modem address, category and firmware.
    GetInfo = 0x60,
    /// Send a message onto the bus.
    SendMessage = 0x62,
    /// Enter all-linking mode.
    StartAllLinking = 0x64,
    /// Leave all-linking mode.
    CancelAllLinking = 0x65,
    /// Erase the modem's configuration and link database.
    FactoryReset = 0x67,
    /// Request the first link database record.
    GetFirstAllLink = 0x69,
    /// Request the next link database record.
    GetNextAllLink = 0x6a,
    /// Write the configuration byte.
    SetConfig = 0x6b,
    /// Read the configuration byte.
    GetConfig = 0x73,
}

impl Command {
    /// Parses a command from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x50 => Some(Self::StandardMessageReceived),
            0x51 => Some(Self::ExtendedMessageReceived),
            0x53 => Some(Self::AllLinkingCompleted),
            0x57 => Some(Self::AllLinkRecordResponse),
            0x60 => Some(Self::GetInfo),
            0x62 => Some(Self::SendMessage),
            0x64 => Some(Self::StartAllLinking),
            0x65 => Some(Self::CancelAllLinking),
            0x67 => Some(Self::FactoryReset),
            0x69 => Some(Self::GetFirstAllLink),
            0x6a => Some(Self::GetNextAllLink),
            0x6b => Some(Self::SetConfig),
            0x73 => Some(Self::GetConfig),
            _ => None,
        }
    }

    /// Returns the command byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// True for commands the modem sends on its own, without a terminator.
    #[must_use]
    pub const fn is_spontaneous(self) -> bool {
        matches!(
            self,
            Self::StandardMessageReceived
                | Self::ExtendedMessageReceived
                | Self::AllLinkingCompleted
                | Self::AllLinkRecordResponse
        )
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        command.as_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trip() {
        for byte in 0..=u8::MAX {
            if let Some(command) = Command::from_byte(byte) {
                assert_eq!(command.as_byte(), byte);
            }
        }
        assert_eq!(Command::from_byte(0x01), None);
    }

    #[test]
    fn test_spontaneous() {
        assert!(Command::StandardMessageReceived.is_spontaneous());
        assert!(Command::AllLinkRecordResponse.is_spontaneous());
        assert!(!Command::SendMessage.is_spontaneous());
        assert!(!Command::GetNextAllLink.is_spontaneous());
    }
}
