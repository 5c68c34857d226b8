//! Blocking TCP plumbing shared by the LAN transports: resolve + connect
//! with a deadline, per-call receive timeouts, exact reads and drains.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Error, Result};

/// Resolve `host:port` and connect with a bounded timeout.
///
/// `TCP_NODELAY` is set on the resulting stream; instrument traffic is
/// small, latency-sensitive request/response.
pub fn connect_timeout(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::ResourceNotFound)?
        .collect();
    if addrs.is_empty() {
        return Err(Error::ResourceNotFound);
    }

    let mut last_err = Error::ConnectionLost;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                log::debug!("connected to {}", addr);
                return Ok(stream);
            }
            Err(err) => last_err = err.into(),
        }
    }
    Err(last_err)
}

/// Apply a receive timeout for the duration of the next read calls.
/// A zero timeout blocks indefinitely.
pub fn set_read_timeout(stream: &TcpStream, timeout: Duration) -> Result<()> {
    let timeout = if timeout.is_zero() { None } else { Some(timeout) };
    stream.set_read_timeout(timeout)?;
    Ok(())
}

/// Read exactly `buf.len()` bytes under the stream's current timeout.
pub fn read_exact(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf)?;
    Ok(())
}

/// Read and throw away exactly `len` bytes.
pub fn discard(stream: &mut TcpStream, mut len: u64) -> Result<()> {
    let mut scratch = [0u8; 4096];
    while len > 0 {
        let chunk = len.min(scratch.len() as u64) as usize;
        stream.read_exact(&mut scratch[..chunk])?;
        len -= chunk as u64;
    }
    Ok(())
}
