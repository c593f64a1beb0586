//! Frame encoding and decoding for the PLM serial protocol.
//!
//! The wire format is self-delimiting only through knowledge of each
//! command's payload shape:
//! ```text
//! ┌──────┬─────────┬──────────────────────┬──────────────┐
//! │ 0x02 │ command │ command payload      │ 0x06 / 0x15  │
//! │ 1    │ 1       │ depends on command   │ 1 (optional) │
//! └──────┴─────────┴──────────────────────┴──────────────┘
//! ```
//! Host-originated commands come back from the modem as an echo followed by
//! ACK (`0x06`) or NAK (`0x15`). The spontaneous commands (messages received,
//! all-linking completed, link record response) have no terminator.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::protocol::Command;
use crate::types::link::{CONTROLLER_BIT, IN_USE_BIT};
use crate::types::{
    Address, AllLinkCompleted, AllLinkRecord, BridgeConfig, BridgeInfo, InsteonMessage,
    LinkingMode, MessageFlags, OutboundMessage, USERDATA_LEN, Userdata, checksum,
};

/// Start-of-frame marker.
pub const START: u8 = 0x02;

/// Positive acknowledgement terminator.
pub const ACK: u8 = 0x06;

/// Negative acknowledgement terminator.
pub const NAK: u8 = 0x15;

/// Offset of the user data block in a send-message frame body
/// (command, to:3, flags, cmd1, cmd2).
const SEND_USERDATA_OFFSET: usize = 7;

/// One modem frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command byte. Unknown commands are kept as-is with a raw payload.
    pub command: u8,
    /// `Some(true)` for ACK, `Some(false)` for NAK, `None` for spontaneous
    /// frames and frames built by the host.
    pub ack: Option<bool>,
    /// Command-specific payload.
    pub payload: Payload,
    /// Extra bytes found between the payload and the ACK/NAK terminator.
    pub data: Option<Bytes>,
}

impl Frame {
    /// Creates a frame with a payload.
    #[must_use]
    pub const fn new(command: Command, payload: Payload) -> Self {
        Self {
            command: command as u8,
            ack: None,
            payload,
            data: None,
        }
    }

    /// Creates a frame with no payload.
    #[must_use]
    pub const fn request(command: Command) -> Self {
        Self::new(command, Payload::None)
    }

    /// Returns the command if it is one of the known commands.
    #[must_use]
    pub const fn kind(&self) -> Option<Command> {
        Command::from_byte(self.command)
    }

    /// True if the modem acknowledged this frame.
    #[must_use]
    pub const fn is_ack(&self) -> bool {
        matches!(self.ack, Some(true))
    }

    /// Returns the received message carried by this frame, if any.
    #[must_use]
    pub const fn message(&self) -> Option<&InsteonMessage> {
        match &self.payload {
            Payload::StandardMessage(msg) | Payload::ExtendedMessage(msg) => Some(msg),
            _ => None,
        }
    }

    /// Encodes the frame, trailing data included. No terminator is written.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        encode(self)
    }
}

/// Command-indexed frame payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// No payload (requests, payload-less commands and unknown commands).
    None,
    /// `0x50` standard message received.
    StandardMessage(InsteonMessage),
    /// `0x51` extended message received.
    ExtendedMessage(InsteonMessage),
    /// `0x53` all-linking completed.
    AllLinkingCompleted(AllLinkCompleted),
    /// `0x57` modem link database record.
    AllLinkRecord(AllLinkRecord),
    /// `0x60` modem info.
    Info(BridgeInfo),
    /// `0x62` send message.
    SendMessage(OutboundMessage),
    /// `0x64` start all-linking.
    StartAllLinking(LinkingMode),
    /// `0x6B` set config.
    SetConfig(BridgeConfig),
    /// `0x73` get config.
    GetConfig(BridgeConfig),
}

impl Payload {
    fn read(command: u8, r: &mut Reader<'_>) -> Result<Self, FrameError> {
        let Some(command) = Command::from_byte(command) else {
            return Ok(Self::None);
        };

        Ok(match command {
            Command::StandardMessageReceived => Self::StandardMessage(read_received(r, false)?),
            Command::ExtendedMessageReceived => Self::ExtendedMessage(read_received(r, true)?),
            Command::AllLinkingCompleted => Self::AllLinkingCompleted(AllLinkCompleted::read(r)?),
            Command::AllLinkRecordResponse => Self::AllLinkRecord(AllLinkRecord::read(r)?),
            Command::GetInfo => Self::Info(BridgeInfo::read(r)?),
            Command::SendMessage => Self::SendMessage(OutboundMessage::read(r)?),
            Command::StartAllLinking => Self::StartAllLinking(LinkingMode::read(r)?),
            Command::SetConfig => Self::SetConfig(BridgeConfig::read(r)?),
            Command::GetConfig => {
                let config = BridgeConfig::read(r)?;
                let _spare: [u8; 2] = r.array()?;
                Self::GetConfig(config)
            }
            Command::CancelAllLinking
            | Command::FactoryReset
            | Command::GetFirstAllLink
            | Command::GetNextAllLink => Self::None,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        match self {
            Self::None => {}
            Self::StandardMessage(msg) => write_received(msg, false, buf),
            Self::ExtendedMessage(msg) => write_received(msg, true, buf),
            Self::AllLinkingCompleted(done) => done.write(buf),
            Self::AllLinkRecord(record) => record.write(buf),
            Self::Info(info) => info.write(buf),
            Self::SendMessage(msg) => msg.write(buf),
            Self::StartAllLinking(mode) => mode.write(buf),
            Self::SetConfig(config) => config.write(buf),
            Self::GetConfig(config) => {
                config.write(buf);
                buf.put_bytes(0, 2);
            }
        }
    }
}

/// Encodes a frame: start marker, command byte, payload.
#[must_use]
pub fn encode(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + SEND_USERDATA_OFFSET + USERDATA_LEN);
    buf.put_u8(START);
    buf.put_u8(frame.command);
    frame.payload.write(&mut buf);
    if let Some(data) = &frame.data {
        buf.put_slice(data);
    }
    buf.freeze()
}

/// Decodes one frame from the front of `buf`.
///
/// Bytes before the first start marker are skipped. On success returns the
/// frame and the number of bytes consumed, including skipped bytes.
///
/// # Errors
///
/// [`FrameError::Incomplete`] if the buffer ends before the frame does; any
/// other variant if the frame is malformed.
pub fn decode(buf: &[u8]) -> Result<(Frame, usize), FrameError> {
    let start = buf
        .iter()
        .position(|&b| b == START)
        .ok_or(FrameError::Incomplete)?;
    let body = &buf[start + 1..];

    let mut reader = Reader::new(body);
    let command = reader.u8()?;
    let payload = match Payload::read(command, &mut reader) {
        Err(FrameError::Incomplete) => return Err(short_extended_send(body)),
        result => result?,
    };

    let spontaneous = Command::from_byte(command).is_some_and(Command::is_spontaneous);
    let (ack, data) = if spontaneous {
        (None, None)
    } else {
        let (ack, data) = read_terminator(&mut reader, &payload, body)?;
        (Some(ack), data)
    };

    let frame = Frame {
        command,
        ack,
        payload,
        data,
    };
    Ok((frame, start + 1 + reader.consumed()))
}

/// Reads up to the ACK/NAK terminator.
///
/// Bytes between the payload and the terminator are returned as trailing
/// data. An extended send echo is the exception: its 14-byte block must be
/// followed directly by the terminator.
fn read_terminator(
    r: &mut Reader<'_>,
    payload: &Payload,
    body: &[u8],
) -> Result<(bool, Option<Bytes>), FrameError> {
    if matches!(payload, Payload::SendMessage(msg) if msg.flags.extended) {
        return match r.u8()? {
            ACK => Ok((true, None)),
            NAK => Ok((false, None)),
            found => {
                // Report the block length the modem actually sent.
                let block = &body[SEND_USERDATA_OFFSET..];
                match block.iter().position(|&b| b == ACK || b == NAK) {
                    Some(got) => Err(FrameError::InvalidLength {
                        expected: USERDATA_LEN,
                        got,
                    }),
                    None => Err(FrameError::MissingTerminator { found }),
                }
            }
        };
    }

    let mut data = BytesMut::new();
    let ack = loop {
        match r.u8()? {
            ACK => break true,
            NAK => break false,
            byte => data.put_u8(byte),
        }
    };
    Ok((ack, (!data.is_empty()).then(|| data.freeze())))
}

/// Classifies a send echo that ran out of bytes.
///
/// An extended block cut short by its own terminator is a length error
/// rather than a partial frame: the terminator is either the last byte
/// buffered or is followed by the next frame's start marker.
fn short_extended_send(body: &[u8]) -> FrameError {
    let extended = body.first() == Some(&Command::SendMessage.as_byte())
        && body.get(4).is_some_and(|&flags| MessageFlags::from_byte(flags).extended);
    if !extended || body.len() <= SEND_USERDATA_OFFSET {
        return FrameError::Incomplete;
    }

    let block = &body[SEND_USERDATA_OFFSET..];
    let terminated = |i: usize| {
        matches!(block[i], ACK | NAK) && (i + 1 == block.len() || block[i + 1] == START)
    };
    match (0..block.len()).find(|&i| terminated(i)) {
        Some(got) => FrameError::InvalidLength {
            expected: USERDATA_LEN,
            got,
        },
        None => FrameError::Incomplete,
    }
}

/// Streaming frame decoder over an accumulation buffer.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: BytesMut,
}

impl FrameBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Appends received bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete frame.
    ///
    /// Returns `Ok(Some(frame))` and trims the consumed bytes, or `Ok(None)`
    /// if more data is needed. Bytes before the first start marker are
    /// discarded.
    ///
    /// On a malformed frame only its start marker is dropped, so the next call
    /// resynchronises on the following `0x02`. The buffer is deliberately not
    /// left intact here: keeping the bad frame would fail the same way on
    /// every later call.
    pub fn decode(&mut self) -> Result<Option<Frame>, FrameError> {
        match self.buffer.iter().position(|&b| b == START) {
            Some(0) => {}
            Some(skip) => {
                tracing::trace!("discarding {}", hex::encode(&self.buffer[..skip]));
                self.buffer.advance(skip);
            }
            None => {
                if !self.buffer.is_empty() {
                    tracing::trace!("discarding {}", hex::encode(&self.buffer));
                    self.buffer.clear();
                }
                return Ok(None);
            }
        }

        match decode(&self.buffer) {
            Ok((frame, consumed)) => {
                self.buffer.advance(consumed);
                Ok(Some(frame))
            }
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => {
                if let Some(start) = self.buffer.iter().position(|&b| b == START) {
                    self.buffer.advance(start + 1);
                }
                Err(e)
            }
        }
    }

    /// Returns the bytes not yet decoded.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Bounds-checked reader; running out of bytes is [`FrameError::Incomplete`].
struct Reader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    fn consumed(&self) -> usize {
        self.len - self.buf.remaining()
    }

    fn u8(&mut self) -> Result<u8, FrameError> {
        if !self.buf.has_remaining() {
            return Err(FrameError::Incomplete);
        }
        Ok(self.buf.get_u8())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        if self.buf.remaining() < N {
            return Err(FrameError::Incomplete);
        }
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    fn address(&mut self) -> Result<Address, FrameError> {
        self.array().map(Address::new)
    }

    fn flags(&mut self) -> Result<MessageFlags, FrameError> {
        self.u8().map(MessageFlags::from_byte)
    }
}

/// One wire layout per payload type.
trait Wire: Sized {
    fn read(r: &mut Reader<'_>) -> Result<Self, FrameError>;
    fn write(&self, buf: &mut BytesMut);
}

fn read_received(r: &mut Reader<'_>, extended: bool) -> Result<InsteonMessage, FrameError> {
    let from = r.address()?;
    let to = r.address()?;
    let flags = r.flags()?;
    let cmd1 = r.u8()?;
    let cmd2 = r.u8()?;
    let userdata = if extended {
        Some(r.array::<USERDATA_LEN>()?)
    } else {
        None
    };
    Ok(InsteonMessage {
        from,
        to,
        flags,
        cmd1,
        cmd2,
        userdata,
    })
}

fn write_received(msg: &InsteonMessage, extended: bool, buf: &mut BytesMut) {
    buf.put_slice(msg.from.as_bytes());
    buf.put_slice(msg.to.as_bytes());
    buf.put_u8(msg.flags.as_byte());
    buf.put_u8(msg.cmd1);
    buf.put_u8(msg.cmd2);
    if extended {
        buf.put_slice(&msg.userdata.unwrap_or([0; USERDATA_LEN]));
    }
}

impl Wire for OutboundMessage {
    fn read(r: &mut Reader<'_>) -> Result<Self, FrameError> {
        let to = r.address()?;
        let flags = r.flags()?;
        let cmd1 = r.u8()?;
        let cmd2 = r.u8()?;
        let userdata = if flags.extended {
            Some(r.array::<USERDATA_LEN>()?)
        } else {
            None
        };
        Ok(Self {
            to,
            flags,
            cmd1,
            cmd2,
            userdata,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(self.to.as_bytes());
        buf.put_u8(self.flags.as_byte());
        buf.put_u8(self.cmd1);
        buf.put_u8(self.cmd2);
        if self.flags.extended {
            let data: Userdata = self.userdata.unwrap_or([0; USERDATA_LEN]);
            buf.put_slice(&data[..USERDATA_LEN - 1]);
            buf.put_u8(checksum(self.cmd1, self.cmd2, &data));
        }
    }
}

impl Wire for AllLinkCompleted {
    fn read(r: &mut Reader<'_>) -> Result<Self, FrameError> {
        let code = r.u8()?;
        Ok(Self {
            controller: code == 0x01,
            removed: code == 0xff,
            group: r.u8()?,
            address: r.address()?,
            category: r.u8()?,
            subcategory: r.u8()?,
            firmware_version: r.u8()?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.code());
        buf.put_u8(self.group);
        buf.put_slice(self.address.as_bytes());
        buf.put_u8(self.category);
        buf.put_u8(self.subcategory);
        buf.put_u8(self.firmware_version);
    }
}

impl Wire for AllLinkRecord {
    fn read(r: &mut Reader<'_>) -> Result<Self, FrameError> {
        let flags = r.u8()?;
        Ok(Self {
            controller: flags & CONTROLLER_BIT != 0,
            group: r.u8()?,
            address: r.address()?,
            link_data: r.array()?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        let mut flags = IN_USE_BIT;
        if self.controller {
            flags |= CONTROLLER_BIT;
        }
        buf.put_u8(flags);
        buf.put_u8(self.group);
        buf.put_slice(self.address.as_bytes());
        buf.put_slice(&self.link_data);
    }
}

impl Wire for BridgeInfo {
    fn read(r: &mut Reader<'_>) -> Result<Self, FrameError> {
        Ok(Self {
            address: r.address()?,
            category: r.u8()?,
            subcategory: r.u8()?,
            firmware_version: r.u8()?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(self.address.as_bytes());
        buf.put_u8(self.category);
        buf.put_u8(self.subcategory);
        buf.put_u8(self.firmware_version);
    }
}

impl Wire for LinkingMode {
    fn read(r: &mut Reader<'_>) -> Result<Self, FrameError> {
        let code = r.u8()?;
        let group = r.u8()?;
        Self::from_code(code, group)
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.code());
        buf.put_u8(self.group);
    }
}

impl Wire for BridgeConfig {
    fn read(r: &mut Reader<'_>) -> Result<Self, FrameError> {
        r.u8().map(Self::from_byte)
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.as_byte());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn read_one(bytes: &[u8]) -> Frame {
        let (frame, consumed) = decode(bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        frame
    }

    fn assert_symmetric(frame: Frame) {
        let mut bytes = frame.encode().to_vec();
        bytes.push(ACK);
        let expected = Frame {
            ack: Some(true),
            ..frame
        };
        assert_eq!(read_one(&bytes), expected);
    }

    #[test]
    fn test_write_get_info() {
        let bytes = Frame::request(Command::GetInfo).encode();
        assert_eq!(&bytes[..], &[START, 0x60]);
    }

    #[test]
    fn test_read_get_info() {
        let frame = read_one(&[START, 0x60, 0xf1, 0xf2, 0xf3, 0x01, 0x02, 0x03, ACK]);
        assert_eq!(
            frame,
            Frame {
                command: 0x60,
                ack: Some(true),
                payload: Payload::Info(BridgeInfo {
                    address: addr("f1f2f3"),
                    category: 0x01,
                    subcategory: 0x02,
                    firmware_version: 0x03,
                }),
                data: None,
            }
        );
    }

    #[test]
    fn test_trailing_bytes_before_terminator() {
        let frame = read_one(&[START, 0x60, 0xf1, 0xf2, 0xf3, 0x01, 0x02, 0x03, 0xaa, 0xbb, ACK]);
        assert!(frame.is_ack());
        assert!(matches!(frame.payload, Payload::Info(info) if info.firmware_version == 0x03));
        assert_eq!(frame.data, Some(Bytes::from_static(&[0xaa, 0xbb])));

        let frame = read_one(&[START, 0x6b, 0x10, 0x99, NAK]);
        assert_eq!(frame.ack, Some(false));
        assert_eq!(frame.payload, Payload::SetConfig(BridgeConfig::from_byte(0x10)));
        assert_eq!(frame.data, Some(Bytes::from_static(&[0x99])));
    }

    #[test]
    fn test_write_get_config() {
        let bytes = Frame::request(Command::GetConfig).encode();
        assert_eq!(&bytes[..], &[START, 0x73]);
    }

    #[test]
    fn test_read_get_config() {
        let frame = read_one(&[START, 0x73, 0xff, 0x00, 0x00, ACK]);
        assert_eq!(
            frame.payload,
            Payload::GetConfig(BridgeConfig {
                automatic_linking: true,
                monitor_mode: true,
                automatic_led: true,
                deadman: true,
            })
        );
        assert!(frame.is_ack());
    }

    #[test]
    fn test_send_standard_symmetric() {
        assert_symmetric(Frame::new(
            Command::SendMessage,
            Payload::SendMessage(OutboundMessage::new(addr("f1f2f3"), 0x01).cmd2(0x02)),
        ));
    }

    #[test]
    fn test_send_extended_checksum() {
        let mut userdata = [0xee; USERDATA_LEN];
        let msg = OutboundMessage::new(addr("f1f2f3"), 0x01)
            .cmd2(0x02)
            .userdata(userdata)
            .normalized();
        let bytes = Frame::new(Command::SendMessage, Payload::SendMessage(msg.clone())).encode();

        assert_eq!(bytes.len(), 2 + SEND_USERDATA_OFFSET - 1 + USERDATA_LEN);
        assert_eq!(bytes[5], 0x1f);
        assert_eq!(*bytes.last().unwrap(), 0xe7);

        // Precomputed checksum value
        userdata[13] = 0xe7;
        assert_symmetric(Frame::new(
            Command::SendMessage,
            Payload::SendMessage(msg.userdata(userdata)),
        ));
    }

    #[test]
    fn test_read_standard_received() {
        let frame = read_one(&[
            START, 0x50, 0xf1, 0xf2, 0xf3, 0xe1, 0xe2, 0xe3, 0x0f, 0x01, 0x02,
        ]);
        assert_eq!(frame.ack, None);
        assert_eq!(
            frame.message(),
            Some(&InsteonMessage {
                from: addr("f1f2f3"),
                to: addr("e1e2e3"),
                flags: MessageFlags::from_byte(0x0f),
                cmd1: 0x01,
                cmd2: 0x02,
                userdata: None,
            })
        );
    }

    #[test]
    fn test_read_extended_received() {
        let userdata = [
            0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xd5,
        ];
        let mut bytes = vec![
            START, 0x51, 0xf1, 0xf2, 0xf3, 0xe1, 0xe2, 0xe3, 0x0f, 0x01, 0x02,
        ];
        bytes.extend_from_slice(&userdata);

        let frame = read_one(&bytes);
        let msg = frame.message().unwrap();
        assert_eq!(msg.from, addr("f1f2f3"));
        assert_eq!(msg.userdata, Some(userdata));
        assert!(matches!(frame.payload, Payload::ExtendedMessage(_)));
    }

    #[test]
    fn test_spontaneous_frames_symmetric() {
        let frames = [
            Frame::new(
                Command::StandardMessageReceived,
                Payload::StandardMessage(InsteonMessage {
                    from: addr("010203"),
                    to: addr("040506"),
                    flags: MessageFlags::from_byte(0x2b),
                    cmd1: 0x11,
                    cmd2: 0xff,
                    userdata: None,
                }),
            ),
            Frame::new(
                Command::ExtendedMessageReceived,
                Payload::ExtendedMessage(InsteonMessage {
                    from: addr("010203"),
                    to: addr("040506"),
                    flags: MessageFlags::from_byte(0x1b),
                    cmd1: 0x2f,
                    cmd2: 0x00,
                    userdata: Some([0x06; USERDATA_LEN]),
                }),
            ),
            Frame::new(
                Command::AllLinkingCompleted,
                Payload::AllLinkingCompleted(AllLinkCompleted {
                    controller: true,
                    removed: false,
                    group: 1,
                    address: addr("aabbcc"),
                    category: 0x02,
                    subcategory: 0x2a,
                    firmware_version: 0x45,
                }),
            ),
            Frame::new(
                Command::AllLinkRecordResponse,
                Payload::AllLinkRecord(AllLinkRecord {
                    controller: false,
                    group: 3,
                    address: addr("aabbcc"),
                    link_data: [0xff, 0x1c, 0x01],
                }),
            ),
        ];

        for frame in frames {
            assert_eq!(read_one(&frame.encode()), frame);
        }
    }

    #[test]
    fn test_terminated_frames_symmetric() {
        assert_symmetric(Frame::new(
            Command::GetInfo,
            Payload::Info(BridgeInfo {
                address: addr("0a0b0c"),
                category: 0x03,
                subcategory: 0x15,
                firmware_version: 0x9e,
            }),
        ));
        assert_symmetric(Frame::new(
            Command::GetConfig,
            Payload::GetConfig(BridgeConfig::from_byte(0x28)),
        ));
        assert_symmetric(Frame::new(
            Command::SetConfig,
            Payload::SetConfig(BridgeConfig::from_byte(0x50)),
        ));
        assert_symmetric(Frame::new(
            Command::StartAllLinking,
            Payload::StartAllLinking(LinkingMode::default()),
        ));
        assert_symmetric(Frame::new(
            Command::StartAllLinking,
            Payload::StartAllLinking(LinkingMode::remove(4)),
        ));
        assert_symmetric(Frame::new(
            Command::StartAllLinking,
            Payload::StartAllLinking(LinkingMode {
                controller: Some(false),
                remove: false,
                group: 9,
            }),
        ));
        for command in [
            Command::CancelAllLinking,
            Command::FactoryReset,
            Command::GetFirstAllLink,
            Command::GetNextAllLink,
        ] {
            assert_symmetric(Frame::request(command));
        }
    }

    #[test]
    fn test_start_all_linking_codes_on_wire() {
        let mode = LinkingMode {
            controller: Some(true),
            remove: false,
            group: 1,
        };
        let bytes = Frame::new(Command::StartAllLinking, Payload::StartAllLinking(mode)).encode();
        assert_eq!(&bytes[..], &[START, 0x64, 0x01, 0x01]);

        let bytes = Frame::new(
            Command::StartAllLinking,
            Payload::StartAllLinking(LinkingMode::remove(2)),
        )
        .encode();
        assert_eq!(&bytes[..], &[START, 0x64, 0xff, 0x02]);
    }

    #[test]
    fn test_nak() {
        let frame = read_one(&[START, 0x6a, NAK]);
        assert_eq!(frame.ack, Some(false));
        assert_eq!(frame.payload, Payload::None);
        assert_eq!(frame.kind(), Some(Command::GetNextAllLink));
    }

    #[test]
    fn test_skips_leading_garbage() {
        let bytes = [0xaa, 0x15, 0x06, START, 0x65, ACK];
        let (frame, consumed) = decode(&bytes).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(frame.kind(), Some(Command::CancelAllLinking));
    }

    #[test]
    fn test_unknown_command_captures_raw() {
        let frame = read_one(&[START, 0x01, 0xde, 0xad, NAK]);
        assert_eq!(frame.command, 0x01);
        assert_eq!(frame.kind(), None);
        assert_eq!(frame.ack, Some(false));
        assert_eq!(frame.payload, Payload::None);
        assert_eq!(frame.data, Some(Bytes::from_static(&[0xde, 0xad])));
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(decode(&[]), Err(FrameError::Incomplete));
        assert_eq!(decode(&[0x00, 0x01]), Err(FrameError::Incomplete));
        assert_eq!(decode(&[START]), Err(FrameError::Incomplete));
        assert_eq!(decode(&[START, 0x60, 0xf1]), Err(FrameError::Incomplete));
        assert_eq!(decode(&[START, 0x65]), Err(FrameError::Incomplete));
        assert_eq!(
            decode(&[START, 0x51, 0xf1, 0xf2, 0xf3, 0xe1, 0xe2, 0xe3, 0x1f, 0x2f, 0x00, 0x00]),
            Err(FrameError::Incomplete)
        );
    }

    #[test]
    fn test_extended_block_short_is_malformed() {
        let mut bytes = vec![START, 0x62, 0xf1, 0xf2, 0xf3, 0x1f, 0x2f, 0x00];
        bytes.extend_from_slice(&[0xee; 10]);
        bytes.push(ACK);
        bytes.extend_from_slice(&[0x11; 5]);

        assert_eq!(
            decode(&bytes),
            Err(FrameError::InvalidLength {
                expected: USERDATA_LEN,
                got: 10
            })
        );
    }

    #[test]
    fn test_extended_block_short_at_end_of_input() {
        let mut bytes = vec![START, 0x62, 0xf1, 0xf2, 0xf3, 0x1f, 0x2f, 0x00];
        bytes.extend_from_slice(&[0xee; 10]);
        bytes.push(ACK);

        let expected = Err(FrameError::InvalidLength {
            expected: USERDATA_LEN,
            got: 10,
        });
        assert_eq!(decode(&bytes), expected);

        bytes.extend_from_slice(&[START, 0x65]);
        assert_eq!(decode(&bytes), expected);
    }

    #[test]
    fn test_extended_block_partial_is_incomplete() {
        let mut bytes = vec![START, 0x62, 0xf1, 0xf2, 0xf3, 0x1f, 0x2f, 0x00];
        bytes.extend_from_slice(&[0xee; 10]);
        assert_eq!(decode(&bytes), Err(FrameError::Incomplete));
    }

    #[test]
    fn test_extended_block_long_is_malformed() {
        let mut bytes = vec![START, 0x62, 0xf1, 0xf2, 0xf3, 0x1f, 0x2f, 0x00];
        bytes.extend_from_slice(&[0xee; 16]);
        bytes.push(ACK);

        assert_eq!(
            decode(&bytes),
            Err(FrameError::InvalidLength {
                expected: USERDATA_LEN,
                got: 16
            })
        );
    }

    #[test]
    fn test_missing_terminator() {
        let mut bytes = vec![START, 0x62, 0xf1, 0xf2, 0xf3, 0x1f, 0x2f, 0x00];
        bytes.extend_from_slice(&[0xee; 15]);

        let err = decode(&bytes).unwrap_err();
        assert_eq!(err, FrameError::MissingTerminator { found: 0xee });
        assert!(!err.is_incomplete());
    }

    #[test]
    fn test_frame_buffer_partial() {
        let mut buffer = FrameBuffer::new();
        buffer.feed(&[START, 0x60, 0xf1, 0xf2]);
        assert_eq!(buffer.decode().unwrap(), None);
        assert_eq!(buffer.buffered(), 4);

        buffer.feed(&[0xf3, 0x01, 0x02, 0x03, ACK]);
        let frame = buffer.decode().unwrap().unwrap();
        assert_eq!(frame.kind(), Some(Command::GetInfo));
        assert_eq!(buffer.buffered(), 0);
    }

    #[test]
    fn test_frame_buffer_multiple_frames() {
        let mut buffer = FrameBuffer::new();
        buffer.feed(&[START, 0x65, ACK, START, 0x69, NAK, START, 0x73]);

        let first = buffer.decode().unwrap().unwrap();
        assert_eq!(first.kind(), Some(Command::CancelAllLinking));
        let second = buffer.decode().unwrap().unwrap();
        assert_eq!(second.kind(), Some(Command::GetFirstAllLink));
        assert_eq!(second.ack, Some(false));
        assert_eq!(buffer.decode().unwrap(), None);
        assert_eq!(buffer.pending(), &[START, 0x73]);
    }

    #[test]
    fn test_frame_buffer_resyncs_after_malformed() {
        let mut malformed = vec![START, 0x62, 0xf1, 0xf2, 0xf3, 0x1f, 0x2f, 0x00];
        malformed.extend_from_slice(&[0xee; 15]);

        let mut buffer = FrameBuffer::new();
        buffer.feed(&[0x00]);
        buffer.feed(&malformed);
        buffer.feed(&[START, 0x65, ACK]);

        assert!(buffer.decode().is_err());
        assert_eq!(buffer.pending()[0], 0x62);

        let frame = buffer.decode().unwrap().unwrap();
        assert_eq!(frame.kind(), Some(Command::CancelAllLinking));
        assert_eq!(buffer.buffered(), 0);
    }

    #[test]
    fn test_frame_buffer_discards_noise() {
        let mut buffer = FrameBuffer::new();
        buffer.feed(&[0xaa; 64]);
        assert_eq!(buffer.decode().unwrap(), None);
        assert_eq!(buffer.buffered(), 0);

        buffer.feed(&[0x11, 0x22, START, 0x65]);
        assert_eq!(buffer.decode().unwrap(), None);
        assert_eq!(buffer.pending(), &[START, 0x65]);

        buffer.feed(&[ACK]);
        let frame = buffer.decode().unwrap().unwrap();
        assert_eq!(frame.kind(), Some(Command::CancelAllLinking));
    }
}
