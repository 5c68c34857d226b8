//! Raw SCPI-over-TCP transport for `TCPIP::host::port::SOCKET` resources.
//!
//! Plain byte stream with newline-terminated reads. Status byte and device
//! clear fall back to the IEEE 488.2 common commands `*STB?` / `*CLS`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Error, ReadStatus, Result};
use crate::net;
use crate::resource::{ResourceDescriptor, ResourceKind, SOCKET_DEFAULT_PORT};
use crate::transport::Transport;

/// Internal bound for the `*STB?` reply and similar short responses.
const STB_TIMEOUT: Duration = Duration::from_millis(5000);

pub struct SocketTransport {
    stream: Option<TcpStream>,
}

impl SocketTransport {
    pub fn new() -> Self {
        Self { stream: None }
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::ConnectionLost)
    }
}

impl Default for SocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SocketTransport {
    fn open(&mut self, rsrc: &ResourceDescriptor, timeout: Duration) -> Result<()> {
        let (host, port) = match &rsrc.kind {
            ResourceKind::Tcpip { host, port, .. } => (host.as_str(), *port),
            _ => return Err(Error::InvalidResourceName(rsrc.raw.clone())),
        };
        let port = if port == 0 { SOCKET_DEFAULT_PORT } else { port };

        self.stream = Some(net::connect_timeout(host, port, timeout)?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream()?;
        stream.write_all(data)?;
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(usize, ReadStatus)> {
        let stream = self.stream()?;
        net::set_read_timeout(stream, timeout)?;

        let n = stream.read(buf)?;
        if n == 0 {
            return Err(Error::ConnectionLost);
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
}

/// Parse a decimal `*STB?` reply; the low eight bits are the status byte.
pub(crate) fn parse_stb(reply: &[u8]) -> Result<u8> {
    let text = std::str::from_utf8(reply)
        .map_err(|_| Error::protocol("non-ASCII *STB? reply"))?
        .trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    let value: u16 = text
        .parse()
        .map_err(|_| Error::protocol(format!("unparsable *STB? reply: {:?}", text)))?;
    Ok((value & 0xFF) as u8)
}

#[cfg(test)]
mod tests {
    use super::parse_stb;

    #[test]
    fn stb_reply_forms() {
        assert_eq!(parse_stb(b"16\n").unwrap(), 16);
        assert_eq!(parse_stb(b"+4\r\n").unwrap(), 4);
        assert_eq!(parse_stb(b"0").unwrap(), 0);
        assert!(parse_stb(b"garbage").is_err());
    }
}
