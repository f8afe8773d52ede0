//! Tower commands
//!
//! Defines the light actions understood by the signal tower controller.
//! Each action is a single opcode carried in byte 5 of a command frame.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ProtocolError;

/// Light actions for the tower controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    /// Red steady on (0x11)
    RedOn,
    /// Yellow steady on (0x12)
    YellowOn,
    /// Green steady on (0x13)
    GreenOn,
    /// Red slow flash (0x21)
    RedSlow,
    /// Yellow slow flash (0x22)
    YellowSlow,
    /// Green slow flash (0x23)
    GreenSlow,
    /// Red burst flash (0x31)
    RedBurst,
    /// Yellow burst flash (0x32)
    YellowBurst,
    /// Green burst flash (0x33)
    GreenBurst,
    /// All lights off (0x60)
    #[serde(rename = "off")]
    LightOff,
}

/// Lamp addressed by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Light {
    /// Low nibble 1
    Red,
    /// Low nibble 2
    Yellow,
    /// Low nibble 3
    Green,
}

/// How the addressed lamp is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pattern {
    /// High nibble 1
    Steady,
    /// High nibble 2
    SlowFlash,
    /// High nibble 3
    BurstFlash,
    /// All lamps dark (0x60)
    Off,
}

/// Opcode table, keyed by command kind
const OPCODES: [(CommandKind, u8, &str); 10] = [
    (CommandKind::RedOn, 0x11, "red-on"),
    (CommandKind::YellowOn, 0x12, "yellow-on"),
    (CommandKind::GreenOn, 0x13, "green-on"),
    (CommandKind::RedSlow, 0x21, "red-slow"),
    (CommandKind::YellowSlow, 0x22, "yellow-slow"),
    (CommandKind::GreenSlow, 0x23, "green-slow"),
    (CommandKind::RedBurst, 0x31, "red-burst"),
    (CommandKind::YellowBurst, 0x32, "yellow-burst"),
    (CommandKind::GreenBurst, 0x33, "green-burst"),
    (CommandKind::LightOff, 0x60, "off"),
];

impl CommandKind {
    /// Every command, in opcode order
    pub const ALL: [CommandKind; 10] = [
        CommandKind::RedOn,
        CommandKind::YellowOn,
        CommandKind::GreenOn,
        CommandKind::RedSlow,
        CommandKind::YellowSlow,
        CommandKind::GreenSlow,
        CommandKind::RedBurst,
        CommandKind::YellowBurst,
        CommandKind::GreenBurst,
        CommandKind::LightOff,
    ];

    fn entry(&self) -> &'static (CommandKind, u8, &'static str) {
        // OPCODES is declared in the same order as the enum
        &OPCODES[*self as usize]
    }

    /// Get the opcode byte sent on the wire
    pub fn opcode(&self) -> u8 {
        self.entry().1
    }

    /// Get the short name used on the command line and in logs
    pub fn name(&self) -> &'static str {
        self.entry().2
    }

    /// Lamp this command drives, `None` for [`CommandKind::LightOff`]
    pub fn light(&self) -> Option<Light> {
        match self.opcode() & 0x0F {
            0x1 => Some(Light::Red),
            0x2 => Some(Light::Yellow),
            0x3 => Some(Light::Green),
            _ => None,
        }
    }

    /// Drive pattern encoded in the high nibble of the opcode
    pub fn pattern(&self) -> Pattern {
        match self.opcode() >> 4 {
            0x1 => Pattern::Steady,
            0x2 => Pattern::SlowFlash,
            0x3 => Pattern::BurstFlash,
            _ => Pattern::Off,
        }
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = ProtocolError;

    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        OPCODES
            .iter()
            .find(|(_, op, _)| *op == opcode)
            .map(|(kind, _, _)| *kind)
            .ok_or_else(|| ProtocolError::InvalidArgument(format!("unknown opcode 0x{:02X}", opcode)))
    }
}

impl FromStr for CommandKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        OPCODES
            .iter()
            .find(|(_, _, name)| *name == wanted || (wanted == "light-off" && *name == "off"))
            .map(|(kind, _, _)| *kind)
            .ok_or_else(|| ProtocolError::InvalidArgument(format!("unknown command '{}'", s)))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
