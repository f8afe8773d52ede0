//! Simulated RS-485 line
//!
//! A scripted in-memory [`Transport`] for tests and demo mode. No time
//! passes on the simulated line: timed reads return immediately, and the
//! timeouts they were given are recorded for inspection instead.
//!
//! The handle is cheap to clone and all clones share one line, so a test
//! can keep a copy after handing the transport to a [`Session`](super::Session).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{crc::crc16, Frame, LineConfig, ProtocolError, Transport};

/// Modbus address the simulated tower answers from
pub const SIM_DEVICE_ADDRESS: u8 = 0x01;

#[derive(Default)]
struct SimState {
    open: bool,
    open_count: usize,
    config: Option<LineConfig>,
    fail_open: Option<String>,
    write_limit: Option<usize>,
    drain_times_out: bool,
    tower: bool,
    written: Vec<Vec<u8>>,
    /// Bytes received and waiting to be read
    rx_buffer: VecDeque<u8>,
    /// Replies that arrive when the next timed read starts listening
    arrivals: VecDeque<Vec<u8>>,
    /// Bytes that arrive just after a timed read gives up
    late: Option<Vec<u8>>,
    read_timeouts: Vec<Duration>,
    drain_timeouts: Vec<Duration>,
    flushes: usize,
    discarded: usize,
}

/// Scripted serial line
#[derive(Clone, Default)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    /// A silent line: accepts writes, never answers
    pub fn new() -> Self {
        Self::default()
    }

    /// A line with one tower attached. Command frames are echoed back
    /// (as a Modbus write-single-register reply would be) and the device
    /// query is answered with an empty register read.
    pub fn tower() -> Self {
        let sim = Self::new();
        sim.state().tower = true;
        sim
    }

    /// Canned reply the simulated tower sends to the device query
    pub fn query_reply() -> Vec<u8> {
        let mut reply = vec![SIM_DEVICE_ADDRESS, 0x03, 0x00];
        let crc = crc16(&reply);
        reply.extend_from_slice(&crc.to_le_bytes());
        reply
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not wedge the other clones
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `open` fail with a driver error
    pub fn fail_open(self, reason: impl Into<String>) -> Self {
        self.state().fail_open = Some(reason.into());
        self
    }

    /// Accept at most `limit` bytes per write
    pub fn limit_writes(self, limit: usize) -> Self {
        self.state().write_limit = Some(limit);
        self
    }

    /// Never report the transmit queue as drained
    pub fn drain_timeout(self) -> Self {
        self.state().drain_times_out = true;
        self
    }

    /// Bytes already sitting in the receive buffer (left over from an
    /// earlier exchange)
    pub fn with_stale_input(self, data: &[u8]) -> Self {
        self.state().rx_buffer.extend(data.iter().copied());
        self
    }

    /// Queue a reply that arrives once the next timed read starts
    pub fn respond_with(&self, data: &[u8]) {
        self.state().arrivals.push_back(data.to_vec());
    }

    /// Queue a reply that lands in the receive buffer just after the next
    /// timed read times out
    pub fn respond_late(&self, data: &[u8]) {
        self.state().late = Some(data.to_vec());
    }

    /// Every write, as accepted by the line
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    /// Most recent write, if any
    pub fn last_written(&self) -> Option<Vec<u8>> {
        self.state().written.last().cloned()
    }

    /// Timeouts passed to each `read`, in call order
    pub fn read_timeouts(&self) -> Vec<Duration> {
        self.state().read_timeouts.clone()
    }

    /// Timeouts passed to each `wait_tx_drained`, in call order
    pub fn drain_timeouts(&self) -> Vec<Duration> {
        self.state().drain_timeouts.clone()
    }

    /// Number of `flush_input` calls and bytes they discarded
    pub fn flushes(&self) -> (usize, usize) {
        let state = self.state();
        (state.flushes, state.discarded)
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    /// Config from the most recent successful `open`
    pub fn config(&self) -> Option<LineConfig> {
        self.state().config.clone()
    }
}

impl Transport for SimTransport {
    fn open(&mut self, config: &LineConfig) -> Result<(), ProtocolError> {
        let mut state = self.state();
        if state.open {
            return Err(ProtocolError::AlreadyOpen);
        }
        if let Some(reason) = state.fail_open.take() {
            return Err(ProtocolError::DriverError(reason));
        }
        state.open = true;
        state.open_count += 1;
        state.config = Some(config.clone());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        let mut state = self.state();
        if !state.open {
            return Err(ProtocolError::NotOpen);
        }

        let accepted = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        state.written.push(data[..accepted].to_vec());

        if state.tower && accepted == data.len() {
            if let Ok(frame) = Frame::from_bytes(data) {
                if frame.is_query() {
                    state.arrivals.push_back(Self::query_reply());
                } else if frame.command_kind().is_some() {
                    state.rx_buffer.extend(data.iter().copied());
                }
            }
        }
        Ok(accepted)
    }

    fn wait_tx_drained(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        let mut state = self.state();
        if !state.open {
            return Err(ProtocolError::NotOpen);
        }
        state.drain_timeouts.push(timeout);
        if state.drain_times_out {
            return Err(ProtocolError::TxTimeout);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError> {
        let mut state = self.state();
        if !state.open {
            return Err(ProtocolError::NotOpen);
        }
        state.read_timeouts.push(timeout);

        if let Some(reply) = state.arrivals.pop_front() {
            state.rx_buffer.extend(reply);
        }

        if state.rx_buffer.is_empty() {
            if let Some(late) = state.late.take() {
                state.rx_buffer.extend(late);
            }
            return Ok(0);
        }

        let n = buf.len().min(state.rx_buffer.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx_buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn buffered_len(&mut self) -> Result<usize, ProtocolError> {
        let state = self.state();
        if !state.open {
            return Err(ProtocolError::NotOpen);
        }
        Ok(state.rx_buffer.len())
    }

    fn flush_input(&mut self) -> Result<(), ProtocolError> {
        let mut state = self.state();
        if !state.open {
            return Err(ProtocolError::NotOpen);
        }
        state.flushes += 1;
        state.discarded += state.rx_buffer.len();
        state.rx_buffer.clear();
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.open = false;
        state.rx_buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandKind;

    fn open(sim: &SimTransport) -> SimTransport {
        let mut line = sim.clone();
        line.open(&LineConfig::default()).unwrap();
        line
    }

    #[test]
    fn test_clones_share_state() {
        let sim = SimTransport::new();
        let mut line = open(&sim);
        assert!(sim.is_open());
        line.write(&[1, 2, 3]).unwrap();
        assert_eq!(sim.last_written(), Some(vec![1, 2, 3]));
        line.close();
        assert!(!sim.is_open());
    }

    #[test]
    fn test_write_limit() {
        let sim = SimTransport::new().limit_writes(4);
        let mut line = open(&sim);
        assert_eq!(line.write(&[0; 10]).unwrap(), 4);
        assert_eq!(sim.written(), vec![vec![0; 4]]);
    }

    #[test]
    fn test_arrivals_survive_flush() {
        let sim = SimTransport::new().with_stale_input(&[0xAA]);
        let mut line = open(&sim);
        sim.respond_with(&[0x01, 0x02]);
        line.flush_input().unwrap();
        assert_eq!(sim.flushes(), (1, 1));

        let mut buf = [0u8; 8];
        assert_eq!(line.read(&mut buf, Duration::from_millis(50)).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x01, 0x02]);
        assert_eq!(sim.read_timeouts(), vec![Duration::from_millis(50)]);
    }

    #[test]
    fn test_late_bytes_become_buffered() {
        let sim = SimTransport::new();
        let mut line = open(&sim);
        sim.respond_late(&[0x05]);

        let mut buf = [0u8; 8];
        assert_eq!(line.read(&mut buf, Duration::from_millis(1000)).unwrap(), 0);
        assert_eq!(line.buffered_len().unwrap(), 1);
        assert_eq!(line.read(&mut buf, Duration::ZERO).unwrap(), 1);
        assert_eq!(buf[0], 0x05);
    }

    #[test]
    fn test_tower_echoes_commands_and_answers_query() {
        let sim = SimTransport::tower();
        let mut line = open(&sim);

        let command = Frame::command(CommandKind::GreenOn);
        line.write(command.as_ref()).unwrap();
        assert_eq!(line.buffered_len().unwrap(), 10);

        line.write(Frame::query().as_ref()).unwrap();
        line.flush_input().unwrap();
        let mut buf = [0u8; 256];
        let n = line.read(&mut buf, Duration::from_millis(1000)).unwrap();
        assert_eq!(&buf[..n], SimTransport::query_reply().as_slice());
    }

    #[test]
    fn test_fail_open_is_one_shot() {
        let sim = SimTransport::new().fail_open("no such port");
        let mut line = sim.clone();
        assert!(matches!(
            line.open(&LineConfig::default()),
            Err(ProtocolError::DriverError(_))
        ));
        assert!(!sim.is_open());
        line.open(&LineConfig::default()).unwrap();
        assert_eq!(sim.open_count(), 1);
    }
}
