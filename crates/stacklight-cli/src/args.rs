use anyhow::{anyhow, bail, Context};
use std::ffi::OsString;
use std::path::PathBuf;
use stacklight_core::protocol::CommandKind;

pub const HELP: &str = "\
stacklight - drive an RS-485 signal tower

USAGE:
  stacklight [OPTIONS] <COMMAND>

COMMANDS:
  send <kind>           Send a light command. Kinds: red-on, yellow-on,
                        green-on, red-slow, yellow-slow, green-slow,
                        red-burst, yellow-burst, green-burst, off
  query                 Query the bus for attached devices
  list-ports            List serial ports
  frames                Print the encoded frame of every command

OPTIONS:
  -h, --help            Prints help information
  -p, --port <name>     Serial port (default: /dev/ttyUSB0)
  -b, --baud <rate>     Baud rate (default: 9600)
  --tx-pin <n>          TX pin, for adapters with pin routing
  --rx-pin <n>          RX pin, for adapters with pin routing
  --settle-ms <ms>      Delay between query and read (default: 10)
  --timeout-ms <ms>     Query response timeout (default: 1000)
  --config <file>       Load line and timing settings from a JSON file
  --demo                Talk to a simulated tower instead of a serial port
  --json                Print the result as JSON
  -v, --verbose         Debug output
  -vv, --trace          Trace output (every byte written)
";

/// Verbosity level for log output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    pub fn filter(&self) -> &'static str {
        match self {
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Help,
    Send(CommandKind),
    Query,
    ListPorts,
    Frames,
}

#[derive(Debug)]
pub struct AppArgs {
    pub action: Action,
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub tx_pin: Option<u32>,
    pub rx_pin: Option<u32>,
    pub settle_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub config: Option<PathBuf>,
    pub demo: bool,
    pub json: bool,
    pub verbosity: Verbosity,
}

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}

pub fn parse_args() -> anyhow::Result<AppArgs> {
    parse_args_from(std::env::args_os().skip(1).collect())
}

pub fn parse_args_from(args: Vec<OsString>) -> anyhow::Result<AppArgs> {
    let mut pargs = pico_args::Arguments::from_vec(args);

    if pargs.contains(["-h", "--help"]) {
        return Ok(AppArgs::help());
    }

    // Consume both spellings so neither is left over as unknown
    let trace = pargs.contains("--trace") | pargs.contains("-vv");
    let verbosity = if trace {
        Verbosity::Trace
    } else if pargs.contains(["-v", "--verbose"]) {
        Verbosity::Debug
    } else {
        Verbosity::Info
    };

    let mut parsed = AppArgs {
        action: Action::Help,
        port: pargs.opt_value_from_str(["-p", "--port"])?,
        baud_rate: pargs.opt_value_from_str(["-b", "--baud"])?,
        tx_pin: pargs.opt_value_from_str("--tx-pin")?,
        rx_pin: pargs.opt_value_from_str("--rx-pin")?,
        settle_ms: pargs.opt_value_from_str("--settle-ms")?,
        timeout_ms: pargs.opt_value_from_str("--timeout-ms")?,
        config: pargs.opt_value_from_os_str("--config", parse_path)?,
        demo: pargs.contains("--demo"),
        json: pargs.contains("--json"),
        verbosity,
    };

    let free: Vec<String> = pargs
        .finish()
        .into_iter()
        .map(|arg| {
            arg.into_string()
                .map_err(|arg| anyhow!("argument is not valid UTF-8: {:?}", arg))
        })
        .collect::<anyhow::Result<_>>()?;

    if let Some(flag) = free.iter().find(|arg| arg.starts_with('-')) {
        bail!("unknown option '{}'", flag);
    }

    let mut free = free.into_iter();
    parsed.action = match free.next().as_deref() {
        None => bail!("missing command"),
        Some("send") => {
            let kind = free.next().context("send needs a command kind")?;
            Action::Send(kind.parse()?)
        }
        Some("query") => Action::Query,
        Some("list-ports") => Action::ListPorts,
        Some("frames") => Action::Frames,
        Some("help") => Action::Help,
        Some(other) => bail!("unknown command '{}'", other),
    };

    if let Some(extra) = free.next() {
        bail!("unexpected argument '{}'", extra);
    }

    Ok(parsed)
}

impl AppArgs {
    fn help() -> Self {
        Self {
            action: Action::Help,
            port: None,
            baud_rate: None,
            tx_pin: None,
            rx_pin: None,
            settle_ms: None,
            timeout_ms: None,
            config: None,
            demo: false,
            json: false,
            verbosity: Verbosity::Info,
        }
    }
}
