//! VXI-11 core channel client and its transport adapter.

use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Error, ReadStatus, Result};
use crate::net;
use crate::resource::{ResourceDescriptor, ResourceKind, DEFAULT_LAN_DEVICE, VXI11_DEFAULT_PORT};
use crate::transport::Transport;

use super::onc_rpc::{seed_xid, StreamRpcClient};
use super::portmapper::{Mapping, PortMapperClient, PORTMAPPER_PROT_TCP};
use super::xdr::{
    CreateLinkParms, CreateLinkResp, DeviceError, DeviceErrorCode, DeviceFlags,
    DeviceGenericParms, DeviceLink, DeviceReadParms, DeviceReadResp, DeviceReadStbResp,
    DeviceWriteParms, DeviceWriteResp,
};
use super::{
    CREATE_LINK, DESTROY_LINK, DEVICE_CLEAR, DEVICE_CORE, DEVICE_CORE_VERSION, DEVICE_READ,
    DEVICE_READSTB, DEVICE_WRITE, FLAG_END, REASON_CHR, REASON_END, REASON_REQCNT,
};

/// The write path has no caller timeout; the device is given this long to
/// accept each chunk.
const WRITE_TIMEOUT_MS: u32 = 10_000;
/// Serial poll and device clear bound, independent of the session timeout.
const CONTROL_TIMEOUT_MS: u32 = 5_000;
/// Socket-level slack on top of the in-protocol io_timeout, so the device
/// gets to report its own timeout before we cut the link.
const RPC_SLACK_MS: u64 = 2_000;

struct CoreLink {
    rpc: StreamRpcClient<TcpStream>,
    lid: DeviceLink,
    max_recv_size: u32,
}

impl CoreLink {
    fn set_deadline(&self, io_timeout_ms: u32) -> Result<()> {
        net::set_read_timeout(
            self.rpc.get_ref(),
            Duration::from_millis(io_timeout_ms as u64 + RPC_SLACK_MS),
        )
    }
}

fn device_error(op: &str, code: DeviceErrorCode) -> Error {
    log::debug!("{} returned device error {:?}", op, code);
    match code {
        DeviceErrorCode::IoTimeout => Error::Timeout,
        _ => Error::protocol(format!("{} failed: {:?}", op, code)),
    }
}

pub struct Vxi11Transport {
    link: Option<CoreLink>,
}

impl Vxi11Transport {
    pub fn new() -> Self {
        Self { link: None }
    }

    fn link(&mut self) -> Result<&mut CoreLink> {
        self.link.as_mut().ok_or(Error::ConnectionLost)
    }
}

impl Default for Vxi11Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for Vxi11Transport {
    fn open(&mut self, rsrc: &ResourceDescriptor, timeout: Duration) -> Result<()> {
        let (host, port, device) = match &rsrc.kind {
            ResourceKind::Tcpip {
                host,
                port,
                device_name,
                ..
            } => (host.as_str(), *port, device_name.as_str()),
            _ => return Err(Error::InvalidResourceName(rsrc.raw.clone())),
        };
        let pm_port = if port == 0 { VXI11_DEFAULT_PORT } else { port };
        let device = if device.is_empty() {
            DEFAULT_LAN_DEVICE
        } else {
            device
        };

        // Bootstrap: ask the portmapper where the core channel lives. The
        // portmapper connection is transient and dropped right after.
        let core_port = {
            let mut portmap = PortMapperClient::connect_tcp(host, pm_port, timeout)?;
            portmap.getport(Mapping::new(
                DEVICE_CORE,
                DEVICE_CORE_VERSION,
                PORTMAPPER_PROT_TCP,
                0,
            ))?
        };
        log::debug!("vxi-11 core channel @ {}:{}", host, core_port);

        let stream = net::connect_timeout(host, core_port, timeout)?;
        net::set_read_timeout(&stream, timeout)?;
        let seed = seed_xid(&stream as *const _ as usize);
        let mut rpc = StreamRpcClient::new(stream, DEVICE_CORE, DEVICE_CORE_VERSION, seed);

        let parms = CreateLinkParms {
            client_id: 0,
            lock_device: false,
            lock_timeout: 0,
            device: device.to_string(),
        };
        let resp: CreateLinkResp = rpc.call(CREATE_LINK, parms)?;
        if resp.error != DeviceErrorCode::NoError {
            log::error!("create_link returned error: {:?}", resp.error);
            return Err(Error::ConnectionLost);
        }

        self.link = Some(CoreLink {
            rpc,
            lid: resp.lid,
            max_recv_size: if resp.max_recv_size == 0 {
                65536
            } else {
                resp.max_recv_size
            },
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut link) = self.link.take() {
            // destroy_link is best-effort; the TCP close is what matters.
            let _ = link.set_deadline(0);
            let lid = link.lid;
            let _: std::result::Result<DeviceError, _> = link.rpc.call(DESTROY_LINK, lid);
        }
        Ok(())
    }

    /// device_write, chunked to the link's max_recv_size. The END flag is
    /// set only on the final chunk.
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let link = self.link()?;
        let mut written = 0usize;

        while written < data.len() {
            let chunk = (data.len() - written).min(link.max_recv_size as usize);
            let last = written + chunk >= data.len();

            let parms = DeviceWriteParms {
                lid: link.lid,
                io_timeout: WRITE_TIMEOUT_MS,
                lock_timeout: 0,
                flags: DeviceFlags(if last { FLAG_END } else { 0 }),
                data: data[written..written + chunk].to_vec().into(),
            };

            link.set_deadline(WRITE_TIMEOUT_MS)?;
            let resp: DeviceWriteResp = link.rpc.call(DEVICE_WRITE, parms)?;
            if resp.error != DeviceErrorCode::NoError {
                return Err(device_error("device_write", resp.error));
            }

            written += resp.size as usize;
            // A device that accepts nothing will never make progress.
            if resp.size == 0 {
                break;
            }
        }

        Ok(written)
    }

    /// device_read until the device reports a termination reason or stops
    /// short of the requested size.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(usize, ReadStatus)> {
        let link = self.link()?;
        let io_timeout = timeout.as_millis().min(u32::MAX as u128) as u32;

        let mut total = 0usize;
        let mut status = ReadStatus::Complete;

        while total < buf.len() {
            let request_size = (buf.len() - total).min(link.max_recv_size as usize) as u32;

            let parms = DeviceReadParms {
                lid: link.lid,
                request_size,
                io_timeout,
                lock_timeout: 0,
                flags: DeviceFlags(0),
                term_char: 0,
            };

            link.set_deadline(io_timeout)?;
            let resp: DeviceReadResp = link.rpc.call(DEVICE_READ, parms)?;
            if resp.error != DeviceErrorCode::NoError {
                return Err(device_error("device_read", resp.error));
            }

            let data = &resp.data.0;
            let copy = data.len().min(buf.len() - total);
            buf[total..total + copy].copy_from_slice(&data[..copy]);
            total += copy;

            if resp.reason & (REASON_END | REASON_CHR) != 0 {
                status = ReadStatus::TermChar;
                break;
            }
            if resp.reason & REASON_REQCNT != 0 {
                status = ReadStatus::MaxCount;
                break;
            }
            // Short delivery without a reason bit: the device is done.
            if data.len() < request_size as usize {
                break;
            }
        }

        if total == buf.len() && status == ReadStatus::Complete {
            status = ReadStatus::MaxCount;
        }
        Ok((total, status))
    }

    fn read_stb(&mut self) -> Result<u8> {
        let link = self.link()?;
        let parms = DeviceGenericParms {
            lid: link.lid,
            flags: DeviceFlags(0),
            lock_timeout: 0,
            io_timeout: CONTROL_TIMEOUT_MS,
        };

        link.set_deadline(CONTROL_TIMEOUT_MS)?;
        let resp: DeviceReadStbResp = link.rpc.call(DEVICE_READSTB, parms)?;
        if resp.error != DeviceErrorCode::NoError {
            return Err(device_error("device_readstb", resp.error));
        }
        Ok(resp.stb)
    }

    fn clear(&mut self) -> Result<()> {
        let link = self.link()?;
        let parms = DeviceGenericParms {
            lid: link.lid,
            flags: DeviceFlags(0),
            lock_timeout: 0,
            io_timeout: CONTROL_TIMEOUT_MS,
        };

        link.set_deadline(CONTROL_TIMEOUT_MS)?;
        let resp: DeviceError = link.rpc.call(DEVICE_CLEAR, parms)?;
        if resp.error != DeviceErrorCode::NoError {
            return Err(device_error("device_clear", resp.error));
        }
        Ok(())
    }
}
