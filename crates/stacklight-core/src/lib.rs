//! # Stacklight Core Library
//!
//! Core functionality for driving RS-485 signal towers (stack lights).

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Fixed 10-byte command frames with Modbus CRC16
//! - Device query with timed read and buffered-data fallback
//! - An owned serial session over the `serialport` crate
//! - A scripted simulated line for tests and demo mode
//!
//! ## Example
//!
//! ```rust,no_run
//! use stacklight_core::protocol::{CommandKind, Controller, LineConfig, SerialPortTransport};
//!
//! let mut tower = Controller::new(SerialPortTransport::new());
//! if tower.init(LineConfig::new("/dev/ttyUSB0", 9600)) {
//!     tower.send_command(CommandKind::GreenOn);
//!     if tower.query_devices() {
//!         println!("{:?}", tower.last_response());
//!     }
//!     tower.deinit();
//! }
//! ```

pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        CommandKind, Controller, Frame, LineConfig, ProtocolError, QueryResponse, QueryTiming,
        SerialPortTransport, Session, SimTransport, Transport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
