//! Settings file and command line overrides
//!
//! ```json
//! {
//!   "line": { "port": "/dev/ttyUSB0", "tx_pin": 16, "rx_pin": 15, "baud_rate": 9600 },
//!   "timing": { "tx_drain_timeout_ms": 100, "settle_delay_ms": 10, "response_timeout_ms": 1000 }
//! }
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use stacklight_core::protocol::{LineConfig, QueryTiming};
use std::path::Path;
use std::time::Duration;

use crate::args::AppArgs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub line: LineConfig,
    pub timing: QueryTiming,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid settings in {}", path.display()))
    }

    /// Settings file (if any) with command line flags applied on top
    pub fn resolve(args: &AppArgs) -> anyhow::Result<Self> {
        let mut settings = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(port) = &args.port {
            settings.line.port = port.clone();
        }
        if let Some(baud_rate) = args.baud_rate {
            settings.line.baud_rate = baud_rate;
        }
        if args.tx_pin.is_some() {
            settings.line.tx_pin = args.tx_pin;
        }
        if args.rx_pin.is_some() {
            settings.line.rx_pin = args.rx_pin;
        }
        if let Some(ms) = args.settle_ms {
            settings.timing.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = args.timeout_ms {
            settings.timing.response_timeout = Duration::from_millis(ms);
        }

        Ok(settings)
    }
}
