//! Command dispatch and device query
//!
//! The free functions here run one exchange on an open [`Session`] and
//! report the exact error. [`Controller`] wraps them behind the boolean
//! surface the UI layer calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{
    frame::{to_hex, QUERY_ADDRESS},
    CommandKind, Frame, LineConfig, ProtocolError, Session, Transport, HEX_LOG_LIMIT,
    RESPONSE_CAPACITY, RESPONSE_TIMEOUT_MS, SETTLE_DELAY_MS, TX_DRAIN_TIMEOUT_MS,
};

/// Timing of a send or query exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTiming {
    /// How long to wait for the transmitter to drain (non-fatal)
    #[serde(rename = "tx_drain_timeout_ms", with = "millis")]
    pub tx_drain_timeout: Duration,
    /// Pause after transmit before listening, so the device can start replying
    #[serde(rename = "settle_delay_ms", with = "millis")]
    pub settle_delay: Duration,
    /// How long the timed read waits for the first response byte
    #[serde(rename = "response_timeout_ms", with = "millis")]
    pub response_timeout: Duration,
}

impl Default for QueryTiming {
    fn default() -> Self {
        Self {
            tx_drain_timeout: Duration::from_millis(TX_DRAIN_TIMEOUT_MS),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            response_timeout: Duration::from_millis(RESPONSE_TIMEOUT_MS),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Which read produced the response bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseSource {
    /// The timed read returned data
    TimedRead,
    /// The timed read came back empty, but bytes had been buffered by the
    /// time it returned
    BufferedFallback,
}

/// Raw bytes captured from a device query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Bytes exactly as read, not validated
    pub bytes: Vec<u8>,
    /// Which read produced them
    pub source: ResponseSource,
}

impl QueryResponse {
    /// Hex dump for log lines, truncated to the first 64 bytes
    pub fn hex(&self) -> String {
        let shown = self.bytes.len().min(HEX_LOG_LIMIT);
        let mut hex = to_hex(&self.bytes[..shown]);
        if self.bytes.len() > shown {
            hex.push_str(" ...");
        }
        hex
    }
}

/// Write a frame and wait for it to leave the transmitter
fn transmit<T: Transport>(
    session: &mut Session<T>,
    frame: &Frame,
    drain_timeout: Duration,
) -> Result<(), ProtocolError> {
    session.write(frame.as_ref())?;
    session.wait_tx_drained(drain_timeout)
}

/// Send a light command. No retry is attempted.
pub fn send_command<T: Transport>(
    session: &mut Session<T>,
    kind: CommandKind,
    timing: &QueryTiming,
) -> Result<Frame, ProtocolError> {
    let frame = Frame::command(kind);
    transmit(session, &frame, timing.tx_drain_timeout)?;
    info!("Command sent: 0x{:02X} ({}), full cmd: {}", kind.opcode(), kind, frame);
    Ok(frame)
}

/// Send an arbitrary byte buffer
pub fn send_data<T: Transport>(
    session: &mut Session<T>,
    data: &[u8],
    timing: &QueryTiming,
) -> Result<(), ProtocolError> {
    if !session.is_open() {
        return Err(ProtocolError::NotOpen);
    }
    if data.is_empty() {
        return Err(ProtocolError::InvalidArgument("empty data buffer".to_string()));
    }
    session.write(data)?;
    session.wait_tx_drained(timing.tx_drain_timeout)
}

/// Single timed read, without flushing stale input first
pub fn receive_data<T: Transport>(
    session: &mut Session<T>,
    max_len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, ProtocolError> {
    session.read(max_len, timeout)
}

/// Query the bus for attached devices and capture the raw reply
pub fn query_devices<T: Transport>(
    session: &mut Session<T>,
    timing: &QueryTiming,
) -> Result<QueryResponse, ProtocolError> {
    let frame = Frame::query();
    debug!("Query frame CRC: 0x{:04X}", frame.crc());

    transmit(session, &frame, timing.tx_drain_timeout)?;
    info!("Query command sent: {}", frame);

    // Drop anything left over from an earlier exchange
    session.flush_input()?;
    std::thread::sleep(timing.settle_delay);

    info!(
        "Waiting for response (timeout: {}ms)...",
        timing.response_timeout.as_millis()
    );
    let bytes = session.read(RESPONSE_CAPACITY, timing.response_timeout)?;
    if !bytes.is_empty() {
        let response = QueryResponse {
            bytes,
            source: ResponseSource::TimedRead,
        };
        info!("Received {} bytes: {}", response.bytes.len(), response.hex());
        return Ok(response);
    }

    // A byte can land between the timed read giving up and now. Drain it
    // with exactly one zero-timeout read.
    let buffered = session.buffered_len()?;
    if buffered > 0 {
        warn!("Timeout but found {} bytes in buffer, trying to read...", buffered);
        let bytes = session.read(buffered.min(RESPONSE_CAPACITY), Duration::ZERO)?;
        if !bytes.is_empty() {
            let response = QueryResponse {
                bytes,
                source: ResponseSource::BufferedFallback,
            };
            info!("Read {} bytes from buffer: {}", response.bytes.len(), response.hex());
            return Ok(response);
        }
    }

    warn!(
        "No response received (timeout after {}ms). Check that the device is powered, \
         the baud rate matches (current: {}), the device answers address 0x{:02X}, \
         the transceiver direction control works and TX/RX are not swapped",
        timing.response_timeout.as_millis(),
        session.config().baud_rate,
        QUERY_ADDRESS
    );
    Err(ProtocolError::NoResponse)
}

/// Boolean front end for a UI layer: every failure becomes `false` plus a
/// log line, nothing panics.
pub struct Controller<T: Transport> {
    session: Session<T>,
    timing: QueryTiming,
    last_response: Option<QueryResponse>,
}

impl<T: Transport> Controller<T> {
    /// Controller with default timing. The line stays closed until [`Controller::init`].
    pub fn new(transport: T) -> Self {
        Self::with_timing(transport, QueryTiming::default())
    }

    /// Controller with custom timing for every send and query
    pub fn with_timing(transport: T, timing: QueryTiming) -> Self {
        Self {
            session: Session::closed(transport),
            timing,
            last_response: None,
        }
    }

    /// Open the line. Fails when already initialized.
    pub fn init(&mut self, config: LineConfig) -> bool {
        if self.session.is_open() {
            warn!("RS485 already initialized");
            return false;
        }
        let port = config.port.clone();
        match self.session.reopen(config) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to initialize RS485 on {}: {}", port, e);
                false
            }
        }
    }

    /// Close the line. Idempotent.
    pub fn deinit(&mut self) {
        if self.session.is_open() {
            self.session.close();
            info!("RS485 deinitialized");
        }
    }

    /// Whether the line is open
    pub fn is_initialized(&self) -> bool {
        self.session.is_open()
    }

    /// The underlying session
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// The underlying session, for direct exchanges
    pub fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    /// Timing used by every send and query
    pub fn timing(&self) -> &QueryTiming {
        &self.timing
    }

    /// Send a light command
    pub fn send_command(&mut self, kind: CommandKind) -> bool {
        match send_command(&mut self.session, kind, &self.timing) {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to send command {}: {}", kind, e);
                false
            }
        }
    }

    /// Send raw bytes
    pub fn send_data(&mut self, data: &[u8]) -> bool {
        match send_data(&mut self.session, data, &self.timing) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send data: {}", e);
                false
            }
        }
    }

    /// Query for devices; the reply is kept in [`Controller::last_response`]
    pub fn query_devices(&mut self) -> bool {
        self.last_response = None;
        match query_devices(&mut self.session, &self.timing) {
            Ok(response) => {
                self.last_response = Some(response);
                true
            }
            Err(ProtocolError::NoResponse) => false,
            Err(e) => {
                error!("Device query failed: {}", e);
                false
            }
        }
    }

    /// Bytes captured by the most recent successful query
    pub fn last_response(&self) -> Option<&QueryResponse> {
        self.last_response.as_ref()
    }
}
