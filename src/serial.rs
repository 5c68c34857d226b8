//! ASRL transport over a local UART.
//!
//! `ASRL{n}::INSTR` maps to `COM{n}` on Windows and `/dev/ttyS{n-1}` on
//! POSIX; discovery additionally emits the explicit path form
//! (`ASRL/dev/ttyUSB0::INSTR`) which opens the named device directly.
//! Line defaults are 9600 baud 8N1 with no flow control, adjustable
//! through the ASRL attribute group.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{Error, ReadStatus, Result};
use crate::resource::{AsrlAddress, ResourceDescriptor, ResourceKind};
use crate::socket::parse_stb;
use crate::transport::{SerialParams, Transport};

const STB_TIMEOUT: Duration = Duration::from_millis(2000);

pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    params: SerialParams,
}

impl SerialTransport {
    pub fn new() -> Self {
        Self {
            port: None,
            params: SerialParams::default(),
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(Error::ConnectionLost)
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform device path for a numeric ASRL index.
///
/// Windows COM ports above 9 need the `\\.\` device-namespace prefix.
pub fn device_path(index: u32) -> String {
    #[cfg(windows)]
    {
        if index > 9 {
            format!(r"\\.\COM{}", index)
        } else {
            format!("COM{}", index)
        }
    }
    #[cfg(not(windows))]
    {
        format!("/dev/ttyS{}", index.saturating_sub(1))
    }
}

fn data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(Error::NotSupported),
    }
}

fn stop_bits(tenths: u8) -> Result<StopBits> {
    match tenths {
        10 => Ok(StopBits::One),
        20 => Ok(StopBits::Two),
        _ => Err(Error::NotSupported),
    }
}

fn parity(code: u8) -> Result<Parity> {
    match code {
        0 => Ok(Parity::None),
        1 => Ok(Parity::Odd),
        2 => Ok(Parity::Even),
        // Mark/space parity is not available through the serial stack.
        _ => Err(Error::NotSupported),
    }
}

fn flow_control(code: u8) -> Result<FlowControl> {
    match code {
        0 => Ok(FlowControl::None),
        1 => Ok(FlowControl::Software),
        2 => Ok(FlowControl::Hardware),
        _ => Err(Error::NotSupported),
    }
}

fn map_serial_error(err: serialport::Error) -> Error {
    match err.kind() {
        serialport::ErrorKind::NoDevice => Error::ResourceNotFound,
        serialport::ErrorKind::Io(kind) => std::io::Error::from(kind).into(),
        _ => Error::Io(err.to_string()),
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, rsrc: &ResourceDescriptor, timeout: Duration) -> Result<()> {
        let path = match &rsrc.kind {
            ResourceKind::Asrl { address: AsrlAddress::Index(n) } => device_path(*n),
            ResourceKind::Asrl { address: AsrlAddress::Path(p) } => p.clone(),
            _ => return Err(Error::InvalidResourceName(rsrc.raw.clone())),
        };

        let port = serialport::new(path.as_str(), self.params.baud)
            .data_bits(data_bits(self.params.data_bits)?)
            .stop_bits(stop_bits(self.params.stop_bits)?)
            .parity(parity(self.params.parity)?)
            .flow_control(flow_control(self.params.flow_control)?)
            .timeout(timeout)
            .open()
            .map_err(|err| {
                log::debug!("failed to open {}: {}", path, err);
                map_serial_error(err)
            })?;

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.port = None;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port()?;
        port.write_all(data)?;
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(usize, ReadStatus)> {
        let port = self.port()?;
        port.set_timeout(timeout).map_err(map_serial_error)?;

        let n = port.read(buf)?;
        if n == 0 {
            return Err(Error::Timeout);
        }

        let status = if buf[n - 1] == b'\n' {
            ReadStatus::TermChar
        } else if n == buf.len() {
            ReadStatus::MaxCount
        } else {
            ReadStatus::Complete
        };
        Ok((n, status))
    }

    fn read_stb(&mut self) -> Result<u8> {
        self.write(b"*STB?\n")?;
        let mut buf = [0u8; 64];
        let (n, _) = self.read(&mut buf, STB_TIMEOUT)?;
        parse_stb(&buf[..n])
    }

    fn clear(&mut self) -> Result<()> {
        self.write(b"*CLS\n")?;
        Ok(())
    }

    fn set_serial_params(&mut self, params: &SerialParams) -> Result<()> {
        // Validate before touching the line so a bad value leaves the old
        // configuration intact.
        let baud = params.baud;
        let bits = data_bits(params.data_bits)?;
        let stop = stop_bits(params.stop_bits)?;
        let par = parity(params.parity)?;
        let flow = flow_control(params.flow_control)?;

        if let Some(port) = self.port.as_mut() {
            port.set_baud_rate(baud).map_err(map_serial_error)?;
            port.set_data_bits(bits).map_err(map_serial_error)?;
            port.set_stop_bits(stop).map_err(map_serial_error)?;
            port.set_parity(par).map_err(map_serial_error)?;
            port.set_flow_control(flow).map_err(map_serial_error)?;
        }
        self.params = *params;
        Ok(())
    }
}
