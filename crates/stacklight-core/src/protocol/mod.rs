//! RS-485 Tower Protocol
//!
//! Implements the fixed 10-byte frame protocol spoken by signal tower
//! controllers, plus the Modbus-style device query.
//!
//! All frames carry a Modbus CRC16 over their first 6 bytes.

pub mod commands;
mod connection;
pub mod crc;
mod error;
pub mod frame;
pub mod serial;
pub mod sim;
mod transport;

pub use commands::{CommandKind, Light, Pattern};
pub use connection::{
    query_devices, receive_data, send_command, send_data, Controller, QueryResponse, QueryTiming,
    ResponseSource,
};
pub use crc::crc16;
pub use error::ProtocolError;
pub use frame::{Frame, FRAME_LEN};
pub use serial::{list_ports, PortInfo, SerialPortTransport};
pub use sim::SimTransport;
pub use transport::{LineConfig, Session, Transport};

/// Default baud rate of tower controllers
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// How long to wait for the transmit queue to drain, in milliseconds
pub const TX_DRAIN_TIMEOUT_MS: u64 = 100;

/// Pause between sending a query and listening for the reply, in milliseconds
pub const SETTLE_DELAY_MS: u64 = 10;

/// How long a query waits for the first reply byte, in milliseconds
pub const RESPONSE_TIMEOUT_MS: u64 = 1000;

/// Maximum bytes captured from one query reply
pub const RESPONSE_CAPACITY: usize = 256;

/// Reply bytes shown in log lines
pub const HEX_LOG_LIMIT: usize = 64;
