//! Text commands understood by the programmer and by the interactive prompt.
//!
//! Every line sent to the device ends with `!`. The device answers with any
//! number of lines and finishes an action with a line containing `<`; it shows
//! `>` once when it is ready for the first command.

use std::str::FromStr;

use common::*;

use crate::rom::WriteCommand;

pub const READY_MARKER: char = '>';
pub const DONE_MARKER: char = '<';
pub const TERMINATOR: char = '!';

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("'{command}' expects {expected}")]
    Arguments { command: &'static str, expected: &'static str },
    #[error("'{0}' is not a hex number")]
    Hex(String),
    #[error("opcode 0x{0:X} out of range, expected 00 to FF")]
    OpcodeStart(u16),
    #[error("opcodes 0x{start:02X} + 0x{len:X} run past 0xFF")]
    OpcodeRange { start: u16, len: u16 },
}

/// Opcodes `start..start + len`, never past 0xFF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpcodeRange {
    start: u8,
    len: u16,
}

impl OpcodeRange {
    pub fn new(start: u16, len: u16) -> Result<OpcodeRange, ProtocolError> {
        let start_byte = u8::try_from(start).map_err(|_| ProtocolError::OpcodeStart(start))?;
        if start as usize + len as usize > OPCODE_COUNT {
            return Err(ProtocolError::OpcodeRange { start, len });
        }
        Ok(OpcodeRange { start: start_byte, len })
    }

    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn len(&self) -> u16 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn opcodes(&self) -> impl Iterator<Item = u8> {
        let start = self.start as u16;
        (start..start + self.len).map(|op| op as u8)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `CL`
    Clear,
    /// `RD AAAA LLLL`
    Read { address: u16, length: u16 },
    /// `SH II LL`
    Show(OpcodeRange),
    /// `WR AAAA VV VV VV VV VV VV VV VV`
    Write(WriteCommand),
    /// `W0`, `W1`, `W2`
    Program(ChipIndex),
    /// `FL`
    ProgramAll,
    /// `QT`
    Stop,
    /// `Q`, `QUIT`
    Quit,
    /// `?`, `HELP`
    Help,
    /// Anything else, passed to the device untouched.
    Raw(String),
}

fn hex(token: &str) -> Result<u16, ProtocolError> {
    let digits = token.strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u16::from_str_radix(digits, 16).map_err(|_| ProtocolError::Hex(token.to_owned()))
}

fn hex_byte(token: &str) -> Result<u8, ProtocolError> {
    u8::try_from(hex(token)?).map_err(|_| ProtocolError::Hex(token.to_owned()))
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let line = line.strip_suffix(TERMINATOR).unwrap_or(line).trim_end();

        let mut tokens = line.split_whitespace();
        let name = match tokens.next() {
            Some(name) => name.to_ascii_uppercase(),
            None => return Ok(Command::Raw(String::new())),
        };
        let args: Vec<&str> = tokens.collect();

        let command = match (name.as_str(), args.as_slice()) {
            ("CL", []) => Command::Clear,
            ("RD", [address, length]) => Command::Read {
                address: hex(address)?,
                length: hex(length)?,
            },
            ("RD", _) => return Err(ProtocolError::Arguments { command: "RD", expected: "AAAA LLLL" }),
            ("SH", [start, len]) => Command::Show(OpcodeRange::new(hex(start)?, hex(len)?)?),
            ("SH", _) => return Err(ProtocolError::Arguments { command: "SH", expected: "II LL" }),
            ("WR", [address, data @ ..]) if data.len() == STEPS_PER_OPCODE => {
                let mut bytes = [0; STEPS_PER_OPCODE];
                for (b, token) in bytes.iter_mut().zip(data.iter()) {
                    *b = hex_byte(token)?;
                }
                Command::Write(WriteCommand { address: hex(address)?, data: bytes })
            }
            ("WR", _) => return Err(ProtocolError::Arguments { command: "WR", expected: "AAAA and 8 bytes" }),
            ("W0", []) => Command::Program(ChipIndex::Chip0),
            ("W1", []) => Command::Program(ChipIndex::Chip1),
            ("W2", []) => Command::Program(ChipIndex::Chip2),
            ("FL", []) => Command::ProgramAll,
            ("QT", []) => Command::Stop,
            ("Q", []) | ("QUIT", []) => Command::Quit,
            ("?", []) | ("HELP", []) => Command::Help,
            _ => Command::Raw(line.to_owned()),
        };

        Ok(command)
    }
}

impl Command {
    /// The line sent to the programmer for commands it carries out itself.
    pub fn device_line(&self) -> Option<String> {
        match self {
            Command::Clear => Some(format!("CL {}", TERMINATOR)),
            Command::Read { address, length } => {
                Some(format!("RD {:04X} {:04X} {}", address, length, TERMINATOR))
            }
            Command::Write(write) => Some(write.to_string()),
            Command::Stop => Some(format!("QT {}", TERMINATOR)),
            Command::Raw(text) if !text.is_empty() => Some(format!("{} {}", text, TERMINATOR)),
            _ => None,
        }
    }
}

pub fn is_ready(line: &str) -> bool {
    line.contains(READY_MARKER)
}

pub fn is_done(line: &str) -> bool {
    line.contains(DONE_MARKER)
}
