use std::collections::VecDeque;

use itertools::Itertools;

use crate::protocol::{Command, DONE_MARKER, READY_MARKER};
use crate::transport::{strip_line_end, Transport, TransportError};

/// In-memory stand-in for the programmer: 8 KiB of EEPROM behind the same
/// text protocol, answering every command with a `<` line.
pub struct SimulatedDevice {
    memory: Vec<u8>,
    input: Vec<u8>,
    output: VecDeque<Vec<u8>>,
    received: Vec<String>,
    stopped: bool,
}

impl SimulatedDevice {
    pub const MEMORY_SIZE: usize = 0x2000;
    const BYTES_PER_DUMP_LINE: usize = 16;

    pub fn new() -> Self {
        let mut device = SimulatedDevice {
            memory: vec![0; SimulatedDevice::MEMORY_SIZE],
            input: Vec::new(),
            output: VecDeque::new(),
            received: Vec::new(),
            stopped: false,
        };
        device.respond("EEPROM programmer (simulated)");
        device.respond(&READY_MARKER.to_string());
        device
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Every line the device has executed, in order.
    pub fn received(&self) -> &[String] {
        &self.received
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn respond(&mut self, line: &str) {
        self.output.push_back(line.as_bytes().to_vec());
    }

    fn execute(&mut self, line: &str) {
        self.received.push(line.to_owned());

        match line.parse::<Command>() {
            Ok(Command::Write(write)) => {
                let start = write.address as usize;
                match self.memory.get_mut(start..start + write.data.len()) {
                    Some(cells) => cells.copy_from_slice(&write.data),
                    None => self.respond(&format!("address {:04X} out of range", write.address)),
                }
            }
            Ok(Command::Clear) => {
                self.memory.iter_mut().for_each(|b| *b = 0);
            }
            Ok(Command::Read { address, length }) => {
                let start = (address as usize).min(self.memory.len());
                let end = (start + length as usize).min(self.memory.len());
                let lines: Vec<String> = self.memory[start..end]
                    .chunks(SimulatedDevice::BYTES_PER_DUMP_LINE)
                    .enumerate()
                    .map(|(i, chunk)| {
                        format!("{:04X}: {}",
                            start + i * SimulatedDevice::BYTES_PER_DUMP_LINE,
                            chunk.iter().map(|b| format!("{:02X}", b)).join(" "))
                    })
                    .collect();
                for line in lines {
                    self.respond(&line);
                }
            }
            Ok(Command::Stop) => {
                self.respond("stopped");
                self.stopped = true;
            }
            _ => self.respond(&format!("unknown command: {}", line)),
        }

        self.respond(&DONE_MARKER.to_string());
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        SimulatedDevice::new()
    }
}

impl Transport for SimulatedDevice {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.stopped {
            return Err(TransportError::Closed);
        }

        for &b in bytes {
            if b == b'\n' {
                let mut line = std::mem::take(&mut self.input);
                strip_line_end(&mut line);
                let line = String::from_utf8(line).map_err(|e| TransportError::Malformed(e.into_bytes()))?;
                self.execute(line.trim());
            } else {
                self.input.push(b);
            }
        }
        Ok(())
    }

    fn receive_line(&mut self) -> Result<Vec<u8>, TransportError> {
        self.output.pop_front().ok_or(TransportError::Closed)
    }
}
