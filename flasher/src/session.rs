use slog::Logger;

use common::ChipIndex;
use strum::IntoEnumIterator;
use ucode::MicrocodeTable;

use crate::protocol::{is_done, is_ready};
use crate::rom::{encode, WriteCommand};
use crate::transport::{Transport, TransportError};

/// A connection to the programmer that has shown its ready prompt. Commands
/// go out one at a time; each waits for the device's `<` before returning.
pub struct Programmer<T: Transport> {
    transport: T,
    log: Logger,
}

fn text(line: Vec<u8>) -> Result<String, TransportError> {
    String::from_utf8(line).map_err(|e| TransportError::Malformed(e.into_bytes()))
}

impl<T: Transport> Programmer<T> {
    /// Waits for the ready prompt. Lines before it are returned so the
    /// caller can show the device banner.
    pub fn connect(mut transport: T, log: Logger) -> Result<(Programmer<T>, Vec<String>), TransportError> {
        let mut banner = Vec::new();
        loop {
            let line = text(transport.receive_line()?)?;
            trace!(log, "device"; "line" => &line);
            if is_ready(&line) {
                break;
            }
            banner.push(line);
        }
        debug!(log, "programmer ready");

        Ok((Programmer { transport, log }, banner))
    }

    /// Sends one line and collects the device's answer, not counting the
    /// closing `<` line.
    pub fn execute(&mut self, line: &str) -> Result<Vec<String>, TransportError> {
        trace!(self.log, "send"; "line" => line);
        self.transport.send(line.as_bytes())?;
        self.transport.send(b"\n")?;

        let mut response = Vec::new();
        loop {
            let line = text(self.transport.receive_line()?)?;
            trace!(self.log, "device"; "line" => &line);
            if is_done(&line) {
                break;
            }
            response.push(line);
        }
        Ok(response)
    }

    pub fn write(&mut self, command: &WriteCommand) -> Result<Vec<String>, TransportError> {
        self.execute(&command.to_string())
    }

    /// Programs the 256 opcodes of one chip and returns how many writes went out.
    pub fn program_chip(&mut self, chip: ChipIndex, table: &MicrocodeTable) -> Result<usize, TransportError> {
        info!(self.log, "programming"; "chip" => chip.index(), "base" => format!("{:04X}", chip.base_address()));

        let mut count = 0;
        for command in encode(chip, table) {
            let response = self.write(&command)?;
            for line in response {
                warn!(self.log, "device"; "address" => format!("{:04X}", command.address), "line" => line);
            }
            count += 1;
        }

        info!(self.log, "programmed"; "chip" => chip.index(), "writes" => count);
        Ok(count)
    }

    pub fn program_all(&mut self, table: &MicrocodeTable) -> Result<usize, TransportError> {
        let mut count = 0;
        for chip in ChipIndex::iter() {
            count += self.program_chip(chip, table)?;
        }
        Ok(count)
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}
