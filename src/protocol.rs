use std::fmt;

use crate::types::Function;
use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 3310;

/// The only AC unit this client addresses.
pub const UNIT: u32 = 1;

pub const LINE_TERMINATOR: &str = "\r\n";

pub const ACK: &str = "ACK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Id,
    Info,
    Set,
    Chn,
    Get,
    Login,
    Logout,
    Cfg,
    Limits,
    Discover,
}

impl Command {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Command::Id => "ID",
            Command::Info => "INFO",
            Command::Set => "SET",
            Command::Chn => "CHN",
            Command::Get => "GET",
            Command::Login => "LOGIN",
            Command::Logout => "LOGOUT",
            Command::Cfg => "CFG",
            Command::Limits => "LIMITS",
            Command::Discover => "DISCOVER",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "ID" => Some(Command::Id),
            "INFO" => Some(Command::Info),
            "SET" => Some(Command::Set),
            "CHN" => Some(Command::Chn),
            "GET" => Some(Command::Get),
            "LOGIN" => Some(Command::Login),
            "LOGOUT" => Some(Command::Logout),
            "CFG" => Some(Command::Cfg),
            "LIMITS" => Some(Command::Limits),
            "DISCOVER" => Some(Command::Discover),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

/// One decoded `COMMAND[,unit]:FUNCTION,VALUE` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: Command,
    pub unit: Option<u32>,
    pub function: Function,
    pub value: String,
}

impl Message {
    /// Items of a bracketed LIMITS payload: `[AUTO,COOL]` -> `["AUTO", "COOL"]`.
    pub fn limits_values(&self) -> Result<Vec<String>> {
        let inner = self
            .value
            .strip_prefix('[')
            .and_then(|v| v.strip_suffix(']'))
            .ok_or_else(|| {
                Error::Protocol(format!("LIMITS payload not bracketed: {}", self.value))
            })?;
        Ok(inner
            .split(',')
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Render back to a wire line (without terminator).
    pub fn encode(&self) -> String {
        match self.unit {
            Some(unit) => format!(
                "{},{unit}:{},{}",
                self.command, self.function, self.value
            ),
            None => format!("{}:{},{}", self.command, self.function, self.value),
        }
    }
}

/// A successfully decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Empty line or bare `ACK`: valid, carries no state.
    Ack,
    Message(Message),
}

pub fn decode(line: &str) -> Result<Frame> {
    if line.is_empty() || line == ACK {
        return Ok(Frame::Ack);
    }

    let (head, body) = line
        .split_once(':')
        .ok_or_else(|| malformed(line, "missing ':'"))?;

    let (command_str, unit) = match head.split_once(',') {
        Some((command, unit)) => (command, Some(parse_unit(line, unit)?)),
        None => (head, None),
    };
    let command =
        Command::from_wire_str(command_str).ok_or_else(|| malformed(line, "unknown command"))?;

    let (function_str, value) = body
        .split_once(',')
        .ok_or_else(|| malformed(line, "missing value"))?;
    let function =
        Function::from_wire_str(function_str).ok_or_else(|| malformed(line, "unknown function"))?;

    if value.is_empty() || !value.bytes().all(is_payload_byte) {
        return Err(malformed(line, "invalid value"));
    }

    Ok(Frame::Message(Message {
        command,
        unit,
        function,
        value: value.to_string(),
    }))
}

pub fn encode_set(function: Function, value: &str) -> String {
    format!("SET,{UNIT}:{function},{value}")
}

pub fn encode_get(function: Function) -> String {
    format!("GET,{UNIT}:{function}")
}

pub fn encode_keepalive() -> String {
    encode_get(Function::OnOff)
}

pub fn encode_limits_query() -> String {
    "LIMITS:*".to_string()
}

fn parse_unit(line: &str, unit: &str) -> Result<u32> {
    if unit.is_empty() || !unit.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(line, "invalid unit index"));
    }
    unit.parse().map_err(|_| malformed(line, "invalid unit index"))
}

fn is_payload_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || matches!(b, b',' | b'[' | b']')
}

fn malformed(line: &str, reason: &str) -> Error {
    Error::Protocol(format!("{reason}: {line:?}"))
}
