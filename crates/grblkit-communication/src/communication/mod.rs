//! Transport-facing building blocks
//!
//! - [`Transport`]: the raw byte read/write collaborator
//! - [`LineReassembler`]: raw chunks to complete protocol lines
//! - [`SendBuffer`]: bookkeeping of the device receive buffer
//! - [`Clock`]: injectable time source for the poll loop
//! - [`PortRegistry`]: process-wide exclusivity of transport identifiers

pub mod clock;
pub mod line_reassembler;
pub mod port_registry;
pub mod send_buffer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use line_reassembler::LineReassembler;
pub use port_registry::{PortRegistry, PortReservation};
pub use send_buffer::{PendingCommand, SendBuffer, DEFAULT_RX_BUFFER_CAPACITY};

use grblkit_core::Result;

/// Raw byte transport to the device.
///
/// Implementations must never block in [`read`](Transport::read): when no
/// data is available they return an empty vector. Any `Err` from `read` or
/// `write` is treated as fatal to the connection.
pub trait Transport: Send {
    /// Read whatever bytes are currently available (possibly none)
    fn read(&mut self) -> Result<Vec<u8>>;

    /// Write all of `data` to the device
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Check whether the underlying handle is usable
    fn is_open(&self) -> bool;

    /// Identifier of the underlying device (e.g. "/dev/ttyUSB0")
    fn name(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self) -> Result<Vec<u8>> {
        (**self).read()
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
