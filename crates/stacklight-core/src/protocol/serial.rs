//! Serial port handling
//!
//! Host-side RS-485 transport over the `serialport` crate, plus port
//! discovery for USB-serial adapters.

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{LineConfig, ProtocolError, Transport};

/// Interval between `bytes_to_read` / `bytes_to_write` polls
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self::named(info.port_name),
        }
    }
}

/// Sort key placing RS-485 dongles first: ttyUSB* (numeric), then
/// ttyACM* (numeric), then everything else by name.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyUSB"), (1u8, "ttyACM")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (2, 0, basename.to_string())
}

/// Merge API-reported ports with device nodes found by name. API entries
/// win on duplicates.
fn merge_ports(reported: Vec<PortInfo>, nodes: impl IntoIterator<Item = String>) -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for port in reported {
        map.entry(port.name.clone()).or_insert(port);
    }
    for name in nodes {
        map.entry(name.clone()).or_insert_with(|| PortInfo::named(name));
    }

    let mut ports: Vec<PortInfo> = map.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// /dev/ttyUSB* and /dev/ttyACM* nodes, which udev-less systems may not
/// report through the serialport API
#[cfg(target_os = "linux")]
fn scan_dev_nodes() -> Vec<String> {
    let Ok(entries) = fs::read_dir("/dev") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with("ttyUSB") || name.starts_with("ttyACM"))
        .map(|name| format!("/dev/{}", name))
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn scan_dev_nodes() -> Vec<String> {
    Vec::new()
}

/// List available serial ports in a stable order
pub fn list_ports() -> Vec<PortInfo> {
    let reported = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    merge_ports(reported, scan_dev_nodes())
}

/// RS-485 line backed by a host serial port
#[derive(Default)]
pub struct SerialPortTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortTransport {
    /// Transport with no port open yet
    pub fn new() -> Self {
        Self { port: None }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, ProtocolError> {
        self.port.as_mut().ok_or(ProtocolError::NotOpen)
    }
}

impl Transport for SerialPortTransport {
    fn open(&mut self, config: &LineConfig) -> Result<(), ProtocolError> {
        if self.port.is_some() {
            return Err(ProtocolError::AlreadyOpen);
        }

        // Pin routing is fixed by the adapter on a host port
        debug!(
            "opening {} (tx pin {:?}, rx pin {:?} routed by adapter)",
            config.port, config.tx_pin, config.rx_pin
        );

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(POLL_INTERVAL)
            .open()?;

        self.port = Some(port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        let port = self.port()?;
        let mut written = 0;
        while written < data.len() {
            match port.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    warn!("write timed out after {}/{} bytes", written, data.len());
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(written)
    }

    fn wait_tx_drained(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        let port = self.port()?;
        let start = Instant::now();
        loop {
            if port.bytes_to_write()? == 0 {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(ProtocolError::TxTimeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError> {
        let port = self.port()?;
        let start = Instant::now();

        // Poll bytes_to_read() rather than block in read(), so a zero
        // timeout checks exactly once.
        let available = loop {
            let available = port.bytes_to_read()? as usize;
            if available > 0 || start.elapsed() >= timeout {
                break available;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if available == 0 {
            return Ok(0);
        }

        let to_read = available.min(buf.len());
        match port.read(&mut buf[..to_read]) {
            Ok(n) => Ok(n),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn buffered_len(&mut self) -> Result<usize, ProtocolError> {
        Ok(self.port()?.bytes_to_read()? as usize)
    }

    fn flush_input(&mut self) -> Result<(), ProtocolError> {
        self.port()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }
}
