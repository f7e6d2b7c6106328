#[macro_use]
extern crate slog;

pub mod device;
pub mod protocol;
pub mod rom;
pub mod session;
pub mod transport;

pub use device::SimulatedDevice;
pub use protocol::{Command, OpcodeRange, ProtocolError};
pub use rom::{encode, encode_all, RomImage, WriteCommand};
pub use session::Programmer;
pub use transport::{SerialTransport, Transport, TransportError};
