//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the tower controller
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The line (or its transport) is already open
    #[error("Serial line already open")]
    AlreadyOpen,

    /// The line has not been opened, or was closed
    #[error("Serial line not open")]
    NotOpen,

    /// Driver install, configuration or pin assignment failed
    #[error("Serial driver error: {0}")]
    DriverError(String),

    /// Fewer bytes were accepted than requested
    #[error("Partial write: wrote {written} of {expected} bytes")]
    PartialWrite {
        /// Bytes the line accepted
        written: usize,
        /// Bytes in the buffer
        expected: usize,
    },

    /// Transmit queue did not drain in time
    #[error("Timed out waiting for transmit to drain")]
    TxTimeout,

    /// Neither the timed read nor the buffered fallback returned bytes
    #[error("No response from device")]
    NoResponse,

    /// Bad input such as an empty buffer or zero baud rate
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Frame has the wrong length or suffix
    #[error("Invalid frame")]
    InvalidResponse,

    /// Frame CRC does not match its payload
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// CRC computed over the payload
        expected: u16,
        /// CRC carried in the frame
        actual: u16,
    },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        ProtocolError::DriverError(e.to_string())
    }
}
