//! Serial transport abstraction
//!
//! [`Transport`] is the seam between the protocol layer and a physical
//! half-duplex line. [`Session`] owns a transport and enforces the
//! open/closed lifecycle: every I/O call on a closed session fails with
//! [`ProtocolError::NotOpen`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{frame::to_hex, ProtocolError, DEFAULT_BAUD_RATE};

/// Serial line parameters supplied at open time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Port identifier (e.g. "/dev/ttyUSB0" or "COM3")
    pub port: String,
    /// TX pin, for adapters that expose pin routing
    pub tx_pin: Option<u32>,
    /// RX pin, for adapters that expose pin routing
    pub rx_pin: Option<u32>,
    /// Baud rate
    pub baud_rate: u32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            tx_pin: Some(16),
            rx_pin: Some(15),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl LineConfig {
    /// Create a config for a port with default pins
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if self.port.trim().is_empty() {
            return Err(ProtocolError::InvalidArgument("empty port name".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ProtocolError::InvalidArgument("baud rate must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// A half-duplex serial line (8N1, no flow control)
pub trait Transport: Send {
    /// Configure and open the line. Must leave the transport closed on error.
    fn open(&mut self, config: &LineConfig) -> Result<(), ProtocolError>;

    /// Whether the line is currently open
    fn is_open(&self) -> bool;

    /// Blocking write; returns the number of bytes accepted
    fn write(&mut self, data: &[u8]) -> Result<usize, ProtocolError>;

    /// Block until the transmit queue is empty, or fail with `TxTimeout`
    fn wait_tx_drained(&mut self, timeout: Duration) -> Result<(), ProtocolError>;

    /// Wait up to `timeout` for at least one byte; `Ok(0)` on timeout
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError>;

    /// Bytes received but not yet read
    fn buffered_len(&mut self) -> Result<usize, ProtocolError>;

    /// Discard received but unread bytes
    fn flush_input(&mut self) -> Result<(), ProtocolError>;

    /// Release the line. Safe to call when already closed.
    fn close(&mut self);
}

/// An open serial line owned by one caller at a time
pub struct Session<T: Transport> {
    transport: T,
    config: LineConfig,
    open: bool,
}

impl<T: Transport> Session<T> {
    /// Open `transport` with `config`
    pub fn open(transport: T, config: LineConfig) -> Result<Self, ProtocolError> {
        let mut session = Self::closed(transport);
        session.reopen(config)?;
        Ok(session)
    }

    /// Wrap a transport without opening it. Every I/O call fails with
    /// `NotOpen` until [`Session::reopen`] succeeds.
    pub fn closed(transport: T) -> Self {
        Self {
            transport,
            config: LineConfig::default(),
            open: false,
        }
    }

    /// Open the line again after [`Session::close`] or a failed open
    pub fn reopen(&mut self, config: LineConfig) -> Result<(), ProtocolError> {
        if self.open || self.transport.is_open() {
            return Err(ProtocolError::AlreadyOpen);
        }
        config.validate()?;

        info!(
            port = %config.port,
            tx_pin = ?config.tx_pin,
            rx_pin = ?config.rx_pin,
            baud = config.baud_rate,
            "opening RS-485 line (8N1, no flow control)"
        );

        if let Err(e) = self.transport.open(&config) {
            self.transport.close();
            return Err(e);
        }

        info!("RS-485 ready on {} at {} baud", config.port, config.baud_rate);
        self.config = config;
        self.open = true;
        Ok(())
    }

    /// Line parameters this session was opened with
    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// Whether the line is open
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> Result<(), ProtocolError> {
        if self.open {
            Ok(())
        } else {
            Err(ProtocolError::NotOpen)
        }
    }

    /// Write the whole buffer; a short write is an error
    pub fn write(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        self.ensure_open()?;
        if data.is_empty() {
            return Err(ProtocolError::InvalidArgument("empty write buffer".to_string()));
        }

        let written = self.transport.write(data)?;
        debug!("wrote {}/{} bytes: {}", written, data.len(), to_hex(data));
        if written != data.len() {
            return Err(ProtocolError::PartialWrite {
                written,
                expected: data.len(),
            });
        }
        Ok(written)
    }

    /// Wait for the transmitter to drain. A timeout is logged, not returned:
    /// the bytes may still leave the wire after the deadline.
    pub fn wait_tx_drained(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        match self.transport.wait_tx_drained(timeout) {
            Ok(()) => Ok(()),
            Err(ProtocolError::TxTimeout) => {
                warn!("timeout waiting for TX done after {}ms", timeout.as_millis());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Read up to `max_len` bytes, waiting up to `timeout` for the first one.
    /// Returns an empty vec on timeout.
    pub fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
        self.ensure_open()?;
        if max_len == 0 {
            return Err(ProtocolError::InvalidArgument("zero length read".to_string()));
        }

        let mut buf = vec![0u8; max_len];
        let n = self.transport.read(&mut buf, timeout)?;
        buf.truncate(n);
        if n == 0 {
            debug!("receive timeout after {}ms", timeout.as_millis());
        }
        Ok(buf)
    }

    /// Bytes waiting in the receive buffer
    pub fn buffered_len(&mut self) -> Result<usize, ProtocolError> {
        self.ensure_open()?;
        self.transport.buffered_len()
    }

    /// Discard everything in the receive buffer
    pub fn flush_input(&mut self) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        self.transport.flush_input()
    }

    /// Release the line. Later operations fail with `NotOpen`.
    pub fn close(&mut self) {
        if self.open {
            self.transport.close();
            self.open = false;
            info!("RS-485 line {} closed", self.config.port);
        }
    }

    /// The wrapped transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The wrapped transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Close the session and hand back the transport
    pub fn into_inner(mut self) -> T {
        self.close();
        self.transport
    }
}
