//! The uniform transport contract and the factory that selects an
//! implementation from a parsed descriptor.

use std::time::Duration;

use crate::error::{Error, ReadStatus, Result};
use crate::resource::{ResourceDescriptor, ResourceKind};

/// Serial line parameters, adjustable through the ASRL attribute group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialParams {
    pub baud: u32,
    /// 5..=8
    pub data_bits: u8,
    /// Encoded as tenths: 10 = one, 15 = one-and-a-half, 20 = two.
    pub stop_bits: u8,
    /// 0 = none, 1 = odd, 2 = even, 3 = mark, 4 = space.
    pub parity: u8,
    /// 0 = none, 1 = XON/XOFF, 2 = RTS/CTS.
    pub flow_control: u8,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: 8,
            stop_bits: 10,
            parity: 0,
            flow_control: 0,
        }
    }
}

/// One instrument connection. Exactly one instance per session, owned by
/// the session and destroyed by `close`.
///
/// All operations are synchronous; blocking calls honor the supplied
/// timeout. `write` delivers end-of-message semantics per protocol and a
/// successful call reports the full input length.
pub trait Transport: Send {
    /// Acquire the underlying connection and run any protocol handshake.
    fn open(&mut self, rsrc: &ResourceDescriptor, timeout: Duration) -> Result<()>;

    /// Best-effort graceful teardown. Always releases OS resources.
    fn close(&mut self) -> Result<()>;

    /// Deliver all of `data` with end-of-message set on the final unit.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read up to `buf.len()` bytes, reporting how the read ended.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(usize, ReadStatus)>;

    /// Serial-poll equivalent: fetch the IEEE 488 status byte.
    fn read_stb(&mut self) -> Result<u8>;

    /// Device clear: reset the device's I/O buffers.
    fn clear(&mut self) -> Result<()>;

    /// Reconfigure the UART line. Only meaningful for ASRL transports.
    fn set_serial_params(&mut self, _params: &SerialParams) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// Termination character applied by transports that forward it on the
    /// wire (USBTMC IN requests). `None` disables it.
    fn set_term_char(&mut self, _term: Option<u8>) -> Result<()> {
        Ok(())
    }
}

/// Stand-in for a transport whose backing stack is compiled out or not
/// installed. Every operation deterministically reports `NotSupported`.
pub struct UnsupportedTransport;

impl Transport for UnsupportedTransport {
    fn open(&mut self, _rsrc: &ResourceDescriptor, _timeout: Duration) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn close(&mut self) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(Error::NotSupported)
    }

    fn read(&mut self, _buf: &mut [u8], _timeout: Duration) -> Result<(usize, ReadStatus)> {
        Err(Error::NotSupported)
    }

    fn read_stb(&mut self) -> Result<u8> {
        Err(Error::NotSupported)
    }

    fn clear(&mut self) -> Result<()> {
        Err(Error::NotSupported)
    }
}

/// Select a transport implementation for a parsed descriptor.
pub fn create(rsrc: &ResourceDescriptor) -> Box<dyn Transport> {
    match &rsrc.kind {
        ResourceKind::Tcpip { is_hislip: true, .. } => {
            Box::new(crate::hislip::HislipTransport::new())
        }
        ResourceKind::Tcpip { is_socket: true, .. } => {
            Box::new(crate::socket::SocketTransport::new())
        }
        ResourceKind::Tcpip { .. } => Box::new(crate::vxi11::Vxi11Transport::new()),
        #[cfg(feature = "usb")]
        ResourceKind::Usb { .. } => Box::new(crate::usbtmc::UsbtmcTransport::new()),
        #[cfg(not(feature = "usb"))]
        ResourceKind::Usb { .. } => Box::new(UnsupportedTransport),
        #[cfg(feature = "serial")]
        ResourceKind::Asrl { .. } => Box::new(crate::serial::SerialTransport::new()),
        #[cfg(not(feature = "serial"))]
        ResourceKind::Asrl { .. } => Box::new(UnsupportedTransport),
        ResourceKind::Gpib { .. } => Box::new(crate::gpib::GpibTransport::new()),
    }
}
