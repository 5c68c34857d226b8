//! Portmapper/rpcbind client, see [RFC1833](https://datatracker.ietf.org/doc/html/rfc1833).
//!
//! Only GETPORT is needed here: it is the bootstrap query that turns the
//! well-known port 111 into the device's VXI-11 core port.

use std::io::{Read, Result as IoResult, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::net;
use crate::xdr::prelude::*;

use super::onc_rpc::{seed_xid, StreamRpcClient};

/// TCP port to use for portmapper/rpcbind
pub(crate) const PORTMAPPER_PORT: u16 = 111;

/// Portmapper program number
pub(crate) const PORTMAPPER_PROG: u32 = 100000;
/// Portmapper program version
pub(crate) const PORTMAPPER_VERS: u32 = 2;

pub(crate) const PORTMAPPER_PROT_TCP: u32 = 6;

/// Getport procedure
pub(crate) const PMAPPROC_GETPORT: u32 = 3;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Mapping {
    pub(crate) prog: u32,
    pub(crate) vers: u32,
    pub(crate) prot: u32,
    pub(crate) port: u32,
}

impl Mapping {
    pub(crate) fn new(prog: u32, vers: u32, prot: u32, port: u32) -> Self {
        Self {
            prog,
            vers,
            prot,
            port,
        }
    }
}

impl XdrEncode for Mapping {
    fn write_xdr<WR>(&self, writer: &mut WR) -> IoResult<()>
    where
        WR: Write,
    {
        self.prog.write_xdr(writer)?;
        self.vers.write_xdr(writer)?;
        self.prot.write_xdr(writer)?;
        self.port.write_xdr(writer)
    }
}

impl XdrDecode for Mapping {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> IoResult<()>
    where
        RD: Read,
    {
        self.prog.read_xdr(reader)?;
        self.vers.read_xdr(reader)?;
        self.prot.read_xdr(reader)?;
        self.port.read_xdr(reader)
    }
}

pub(crate) struct PortMapperClient(StreamRpcClient<TcpStream>);

impl PortMapperClient {
    /// Transient TCP connection to the portmapper on `host:port`.
    pub(crate) fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let io = net::connect_timeout(host, port, timeout)?;
        net::set_read_timeout(&io, timeout)?;
        let seed = seed_xid(&io as *const _ as usize);
        Ok(Self(StreamRpcClient::new(
            io,
            PORTMAPPER_PROG,
            PORTMAPPER_VERS,
            seed,
        )))
    }

    pub(crate) fn getport(&mut self, mapping: Mapping) -> Result<u16> {
        let port: u32 = self.0.call(PMAPPROC_GETPORT, mapping)?;
        if port == 0 || port > u16::MAX as u32 {
            return Err(Error::ResourceNotFound);
        }
        Ok(port as u16)
    }
}
