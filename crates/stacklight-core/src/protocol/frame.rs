//! Frame encoding/decoding
//!
//! Every frame on the bus is exactly 10 bytes:
//! - 6 bytes: payload
//! - 2 bytes: CRC16 of the payload (low byte first)
//! - 2 bytes: fixed suffix `00 00`
//!
//! Command payload: `01 06 00 C2 00 <opcode>`
//! Query payload:   `FF 03 <start register, BE> <register count, BE>`

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;

use super::{crc::crc16, CommandKind, ProtocolError};

/// Total frame length on the wire
pub const FRAME_LEN: usize = 10;

/// Bytes covered by the CRC
pub const PAYLOAD_LEN: usize = 6;

/// Fixed prefix of every command frame
pub const COMMAND_PREFIX: [u8; 5] = [0x01, 0x06, 0x00, 0xC2, 0x00];

/// Fixed trailer of every frame
pub const FRAME_SUFFIX: [u8; 2] = [0x00, 0x00];

/// Broadcast address used by the device query
pub const QUERY_ADDRESS: u8 = 0xFF;

/// Read holding registers
pub const QUERY_FUNCTION: u8 = 0x03;

/// First register read by the device query
pub const QUERY_START_REGISTER: u16 = 0x003F;

/// Register count requested by the device query
pub const QUERY_REGISTER_COUNT: u16 = 0x0000;

/// A single 10-byte bus frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Seal a 6-byte payload with its CRC and the fixed suffix
    pub fn from_payload(payload: [u8; PAYLOAD_LEN]) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[..PAYLOAD_LEN].copy_from_slice(&payload);
        LittleEndian::write_u16(&mut bytes[6..8], crc16(&payload));
        bytes[8..].copy_from_slice(&FRAME_SUFFIX);
        Self { bytes }
    }

    /// Build the command frame for a light action
    pub fn command(kind: CommandKind) -> Self {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..5].copy_from_slice(&COMMAND_PREFIX);
        payload[5] = kind.opcode();
        Self::from_payload(payload)
    }

    /// Build the device query frame
    pub fn query() -> Self {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = QUERY_ADDRESS;
        payload[1] = QUERY_FUNCTION;
        BigEndian::write_u16(&mut payload[2..4], QUERY_START_REGISTER);
        BigEndian::write_u16(&mut payload[4..6], QUERY_REGISTER_COUNT);
        Self::from_payload(payload)
    }

    /// Decode and verify a frame from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() != FRAME_LEN {
            return Err(ProtocolError::InvalidResponse);
        }
        if data[8..] != FRAME_SUFFIX {
            return Err(ProtocolError::InvalidResponse);
        }

        let actual = LittleEndian::read_u16(&data[6..8]);
        let expected = crc16(&data[..PAYLOAD_LEN]);
        if actual != expected {
            return Err(ProtocolError::CrcMismatch { expected, actual });
        }

        let mut bytes = [0u8; FRAME_LEN];
        bytes.copy_from_slice(data);
        Ok(Self { bytes })
    }

    /// Raw bytes as sent on the wire
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    /// The 6 bytes covered by the CRC
    pub fn payload(&self) -> &[u8] {
        &self.bytes[..PAYLOAD_LEN]
    }

    /// CRC16 carried in bytes 6 and 7
    pub fn crc(&self) -> u16 {
        LittleEndian::read_u16(&self.bytes[6..8])
    }

    /// Light action carried by a command frame
    pub fn command_kind(&self) -> Option<CommandKind> {
        if self.bytes[..5] != COMMAND_PREFIX {
            return None;
        }
        CommandKind::try_from(self.bytes[5]).ok()
    }

    /// Whether this is the device query frame
    pub fn is_query(&self) -> bool {
        *self == Self::query()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.bytes))
    }
}

/// Render bytes as space separated upper-case hex (`01 06 00 C2`)
pub fn to_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
