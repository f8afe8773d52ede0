//! Stacklight command line tool
//!
//! Sends one light command or one device query per invocation and prints a
//! log line (or JSON) describing the outcome.
//!
//! Usage:
//!   stacklight --port /dev/ttyUSB0 send green-on
//!   stacklight --demo --json query

mod args;
mod config;

use serde::Serialize;
use stacklight_core::protocol::{
    list_ports, CommandKind, Controller, Frame, QueryResponse, SerialPortTransport, SimTransport,
    Transport,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use args::{Action, AppArgs, Verbosity};
use config::Settings;

/// Result of one exchange, as printed with `--json`
#[derive(Debug, Serialize)]
struct Outcome {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<CommandKind>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<QueryResponse>,
}

fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = match args::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {:#}\n\n{}", e, args::HELP);
            return ExitCode::from(2);
        }
    };

    init_logging(args.verbosity);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &AppArgs) -> anyhow::Result<bool> {
    match args.action {
        Action::Help => {
            print!("{}", args::HELP);
            Ok(true)
        }
        Action::ListPorts => {
            let ports = list_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                match (port.vid, port.pid) {
                    (Some(vid), Some(pid)) => println!(
                        "{}  [{:04x}:{:04x}] {}",
                        port.name,
                        vid,
                        pid,
                        port.product.as_deref().unwrap_or("")
                    ),
                    _ => println!("{}", port.name),
                }
            }
            Ok(true)
        }
        Action::Frames => {
            for kind in CommandKind::ALL {
                println!("{:<13} {}", kind.name(), Frame::command(kind));
            }
            println!("{:<13} {}", "query", Frame::query());
            Ok(true)
        }
        Action::Send(kind) => exchange(Exchange::Send(kind), args),
        Action::Query => exchange(Exchange::Query, args),
    }
}

/// What one invocation puts on the line
#[derive(Debug, Clone, Copy)]
enum Exchange {
    Send(CommandKind),
    Query,
}

fn exchange(what: Exchange, args: &AppArgs) -> anyhow::Result<bool> {
    let settings = Settings::resolve(args)?;
    if args.demo {
        run_exchange(Controller::with_timing(SimTransport::tower(), settings.timing), what, settings, args)
    } else {
        run_exchange(
            Controller::with_timing(SerialPortTransport::new(), settings.timing),
            what,
            settings,
            args,
        )
    }
}

fn run_exchange<T: Transport>(
    mut tower: Controller<T>,
    what: Exchange,
    settings: Settings,
    args: &AppArgs,
) -> anyhow::Result<bool> {
    // The controller has already logged why
    if !tower.init(settings.line) {
        return Ok(false);
    }

    let outcome = match what {
        Exchange::Send(kind) => Outcome {
            action: "send",
            command: Some(kind),
            success: tower.send_command(kind),
            response: None,
        },
        Exchange::Query => {
            let success = tower.query_devices();
            Outcome {
                action: "query",
                command: None,
                success,
                response: tower.last_response().cloned(),
            }
        }
    };
    tower.deinit();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match (&outcome.command, &outcome.response) {
            (Some(kind), _) if outcome.success => println!("Sent {} (0x{:02X})", kind, kind.opcode()),
            (Some(kind), _) => println!("Command {} not sent", kind),
            (None, Some(response)) => {
                println!("Response ({} bytes): {}", response.bytes.len(), response.hex())
            }
            (None, None) => println!("No devices found"),
        }
    }

    Ok(outcome.success)
}
