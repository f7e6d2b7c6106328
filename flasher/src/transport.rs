use std::io::{self, BufRead, BufReader, Write};
use std::time::Duration;

use serialport::SerialPort;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("programmer closed the connection")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),
    #[error("programmer sent a line that is not text: {0:02x?}")]
    Malformed(Vec<u8>),
}

/// Byte channel to the programmer. Nothing here knows about the command set.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Next line from the programmer with the line ending stripped. Blocks
    /// until a whole line has arrived.
    fn receive_line(&mut self) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(bytes)
    }

    fn receive_line(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).receive_line()
    }
}

pub(crate) fn strip_line_end(line: &mut Vec<u8>) {
    while let Some(&b'\n') | Some(&b'\r') = line.last() {
        line.pop();
    }
}

pub struct SerialTransport {
    port: BufReader<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// How long one read waits before trying again. Waiting for the
    /// programmer itself has no limit.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

    pub fn open(path: &str, baud_rate: u32) -> Result<SerialTransport, TransportError> {
        let port = serialport::new(path, baud_rate)
            .timeout(SerialTransport::POLL_INTERVAL)
            .open()?;
        Ok(SerialTransport {
            port: BufReader::new(port),
        })
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port.get_mut();
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn receive_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut line = Vec::new();
        loop {
            match self.port.read_until(b'\n', &mut line) {
                Ok(0) if line.is_empty() => return Err(TransportError::Closed),
                Ok(_) => break,
                // bytes read before the timeout stay in `line`
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        strip_line_end(&mut line);
        Ok(line)
    }
}
