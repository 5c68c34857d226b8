//! USBTMC device handling over libusb (`rusb`).

use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};

use crate::error::{Error, ReadStatus, Result};
use crate::resource::{ResourceDescriptor, ResourceKind};
use crate::transport::Transport;

use super::header::{
    dev_dep_msg_out, next_tag, parse_dev_dep_msg_in, request_dev_dep_msg_in, HEADER_SIZE,
};
use super::{
    REQ_CHECK_CLEAR_STATUS, REQ_GET_CAPABILITIES, REQ_INITIATE_CLEAR, REQ_READ_STATUS_BYTE,
    STATUS_PENDING, STATUS_SUCCESS, USBTMC_CLASS_CODE, USBTMC_SUBCLASS_CODE,
};

/// Bulk transfer timeout when the caller supplies none.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
/// Control transfer bound.
const CONTROL_TIMEOUT: Duration = Duration::from_millis(2000);
/// Overall bound on the device clear poll loop.
const CLEAR_TIMEOUT: Duration = Duration::from_millis(5000);
const CLEAR_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn map_usb_error(err: rusb::Error) -> Error {
    match err {
        rusb::Error::Timeout => Error::Timeout,
        rusb::Error::NoDevice | rusb::Error::NotFound => Error::ResourceNotFound,
        rusb::Error::Access | rusb::Error::Busy => Error::ResourceLocked,
        other => Error::Io(other.to_string()),
    }
}

/// USB488 capability bits fetched with GET_CAPABILITIES. All cleared when
/// the probe fails; the probe is best-effort.
#[derive(Debug, Default, Clone, Copy)]
struct Capabilities {
    usb488: bool,
    read_stb: bool,
}

struct ClaimedDevice {
    handle: DeviceHandle<Context>,
    interface: u8,
    ep_bulk_out: u8,
    ep_bulk_in: u8,
    tag: u8,
    capabilities: Capabilities,
}

pub struct UsbtmcTransport {
    device: Option<ClaimedDevice>,
    term_char: Option<u8>,
}

/// Bulk endpoint pair of a USBTMC interface alt setting.
fn find_bulk_endpoints(intf: &rusb::InterfaceDescriptor<'_>) -> Option<(u8, u8)> {
    let mut ep_out = None;
    let mut ep_in = None;
    for ep in intf.endpoint_descriptors() {
        if ep.transfer_type() != TransferType::Bulk {
            continue;
        }
        match ep.direction() {
            Direction::Out => ep_out = Some(ep.address()),
            Direction::In => ep_in = Some(ep.address()),
        }
    }
    Some((ep_out?, ep_in?))
}

/// Locate the USBTMC interface on `device`, honoring an explicit interface
/// number from the resource string.
fn find_usbtmc_interface(
    device: &Device<Context>,
    wanted_interface: Option<u16>,
) -> Option<(u8, u8, u8)> {
    let desc = device.device_descriptor().ok()?;
    for config_index in 0..desc.num_configurations() {
        let config = match device.config_descriptor(config_index) {
            Ok(config) => config,
            Err(_) => continue,
        };
        for interface in config.interfaces() {
            for alt in interface.descriptors() {
                if alt.class_code() != USBTMC_CLASS_CODE
                    || alt.sub_class_code() != USBTMC_SUBCLASS_CODE
                {
                    continue;
                }
                if let Some(wanted) = wanted_interface {
                    if alt.interface_number() as u16 != wanted {
                        continue;
                    }
                }
                if let Some((ep_out, ep_in)) = find_bulk_endpoints(&alt) {
                    return Some((alt.interface_number(), ep_out, ep_in));
                }
            }
        }
    }
    None
}

impl UsbtmcTransport {
    pub fn new() -> Self {
        Self {
            device: None,
            term_char: None,
        }
    }

    fn device(&mut self) -> Result<&mut ClaimedDevice> {
        self.device.as_mut().ok_or(Error::ConnectionLost)
    }
}

impl Default for UsbtmcTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimedDevice {
    /// Best-effort GET_CAPABILITIES probe. A failure leaves every
    /// capability bit cleared and is not an error.
    fn fetch_capabilities(&mut self) {
        let mut buf = [0u8; 24];
        let request_type =
            rusb::request_type(Direction::In, rusb::RequestType::Class, rusb::Recipient::Interface);
        match self.handle.read_control(
            request_type,
            REQ_GET_CAPABILITIES,
            0,
            self.interface as u16,
            &mut buf,
            CONTROL_TIMEOUT,
        ) {
            Ok(n) if n >= 6 => {
                self.capabilities.usb488 = buf[4] & 0x04 != 0;
                self.capabilities.read_stb = buf[5] & 0x04 != 0;
            }
            Ok(_) => {}
            Err(err) => log::debug!("GET_CAPABILITIES failed: {}", err),
        }
    }

    /// Drain whatever sits in the Bulk-IN pipe, ignoring errors.
    fn flush_bulk_in(&mut self, timeout: Duration) {
        let mut scratch = [0u8; 512];
        let _ = self.handle.read_bulk(self.ep_bulk_in, &mut scratch, timeout);
    }
}

impl Transport for UsbtmcTransport {
    fn open(&mut self, rsrc: &ResourceDescriptor, _timeout: Duration) -> Result<()> {
        let (vid, pid, serial, interface) = match &rsrc.kind {
            ResourceKind::Usb {
                vid,
                pid,
                serial,
                interface,
            } => (*vid, *pid, serial.as_str(), *interface),
            _ => return Err(Error::InvalidResourceName(rsrc.raw.clone())),
        };

        let context = Context::new().map_err(map_usb_error)?;
        let devices = context.devices().map_err(map_usb_error)?;

        for device in devices.iter() {
            let desc = match device.device_descriptor() {
                Ok(desc) => desc,
                Err(_) => continue,
            };
            if desc.vendor_id() != vid || desc.product_id() != pid {
                continue;
            }

            let mut handle = match device.open() {
                Ok(handle) => handle,
                Err(err) => {
                    log::debug!("cannot open {:04x}:{:04x}: {}", vid, pid, err);
                    continue;
                }
            };

            // An empty serial in the resource string matches any device.
            if !serial.is_empty() {
                let device_serial = handle
                    .read_serial_number_string_ascii(&desc)
                    .unwrap_or_default();
                if device_serial != serial {
                    continue;
                }
            }

            let (interface, ep_bulk_out, ep_bulk_in) =
                match find_usbtmc_interface(&device, interface) {
                    Some(found) => found,
                    None => continue,
                };

            // Linux binds usbtmc.ko to these interfaces; take it over.
            let _ = handle.set_auto_detach_kernel_driver(true);
            handle.claim_interface(interface).map_err(|err| {
                log::debug!("claim_interface failed: {}", err);
                Error::ResourceLocked
            })?;

            let mut claimed = ClaimedDevice {
                handle,
                interface,
                ep_bulk_out,
                ep_bulk_in,
                tag: 0,
                capabilities: Capabilities::default(),
            };
            claimed.fetch_capabilities();
            log::debug!(
                "usbtmc open {:04x}:{:04x} if {} caps {:?}",
                vid,
                pid,
                interface,
                claimed.capabilities
            );

            self.device = Some(claimed);
            return Ok(());
        }

        Err(Error::ResourceNotFound)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut device) = self.device.take() {
            let _ = device.handle.release_interface(device.interface);
        }
        Ok(())
    }

    /// Single `DEV_DEP_MSG_OUT` bulk transfer with EOM set.
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let device = self.device()?;
        let tag = next_tag(&mut device.tag);
        let pkt = dev_dep_msg_out(tag, data);

        let transferred = device
            .handle
            .write_bulk(device.ep_bulk_out, &pkt, DEFAULT_TIMEOUT)
            .map_err(map_usb_error)?;

        Ok(transferred.saturating_sub(HEADER_SIZE).min(data.len()))
    }

    /// `REQUEST_DEV_DEP_MSG_IN` followed by the matching Bulk-IN message.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(usize, ReadStatus)> {
        let term_char = self.term_char;
        let device = self.device()?;
        let timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };

        let tag = next_tag(&mut device.tag);
        let request = request_dev_dep_msg_in(tag, buf.len() as u32, term_char);
        device
            .handle
            .write_bulk(device.ep_bulk_out, &request, timeout)
            .map_err(map_usb_error)?;

        let mut recv = vec![0u8; HEADER_SIZE + buf.len()];
        let recv_len = device
            .handle
            .read_bulk(device.ep_bulk_in, &mut recv, timeout)
            .map_err(map_usb_error)?;

        let header = parse_dev_dep_msg_in(&recv[..recv_len], tag)?;
        let available = recv_len - HEADER_SIZE;
        let count = (header.transfer_size as usize).min(available).min(buf.len());
        buf[..count].copy_from_slice(&recv[HEADER_SIZE..HEADER_SIZE + count]);

        let status = if header.eom {
            ReadStatus::TermChar
        } else if count == buf.len() {
            ReadStatus::MaxCount
        } else {
            ReadStatus::Complete
        };
        Ok((count, status))
    }

    /// USB488 READ_STATUS_BYTE control transfer. Conforming devices return
    /// `{status, tag, stb}`; some return the shortened `{status, stb}`.
    fn read_stb(&mut self) -> Result<u8> {
        let device = self.device()?;
        if !device.capabilities.usb488 || !device.capabilities.read_stb {
            // Devices frequently omit the capability bits yet answer the
            // request, so try regardless.
            log::debug!("device does not advertise USB488 READ_STATUS_BYTE");
        }
        let tag = next_tag(&mut device.tag);

        let mut resp = [0u8; 3];
        let request_type =
            rusb::request_type(Direction::In, rusb::RequestType::Class, rusb::Recipient::Interface);
        let n = device
            .handle
            .read_control(
                request_type,
                REQ_READ_STATUS_BYTE,
                tag as u16,
                device.interface as u16,
                &mut resp,
                CONTROL_TIMEOUT,
            )
            .map_err(map_usb_error)?;

        if resp[0] != STATUS_SUCCESS {
            return Err(Error::protocol(format!(
                "READ_STATUS_BYTE returned status 0x{:02x}",
                resp[0]
            )));
        }
        match n {
            3.. => Ok(resp[2]),
            2 => Ok(resp[1]),
            _ => Err(Error::protocol("short READ_STATUS_BYTE response")),
        }
    }

    /// INITIATE_CLEAR, then poll CHECK_CLEAR_STATUS until the device
    /// reports success, draining the Bulk-IN pipe when asked to.
    fn clear(&mut self) -> Result<()> {
        let device = self.device()?;

        let h2d =
            rusb::request_type(Direction::Out, rusb::RequestType::Class, rusb::Recipient::Interface);
        let d2h =
            rusb::request_type(Direction::In, rusb::RequestType::Class, rusb::Recipient::Interface);

        device
            .handle
            .write_control(
                h2d,
                REQ_INITIATE_CLEAR,
                0,
                device.interface as u16,
                &[],
                CONTROL_TIMEOUT,
            )
            .map_err(map_usb_error)?;

        let mut elapsed = Duration::ZERO;
        loop {
            if elapsed >= CLEAR_TIMEOUT {
                return Err(Error::Timeout);
            }

            let mut resp = [0u8; 2];
            let n = device
                .handle
                .read_control(
                    d2h,
                    REQ_CHECK_CLEAR_STATUS,
                    0,
                    device.interface as u16,
                    &mut resp,
                    CONTROL_TIMEOUT,
                )
                .map_err(map_usb_error)?;
            if n < 1 {
                return Err(Error::protocol("empty CHECK_CLEAR_STATUS response"));
            }

            match resp[0] {
                STATUS_SUCCESS => break,
                STATUS_PENDING => {
                    // bmClear bit 0: a Bulk-IN read is required to proceed.
                    if n >= 2 && resp[1] & 0x01 != 0 {
                        device.flush_bulk_in(Duration::from_millis(500));
                    }
                    std::thread::sleep(CLEAR_POLL_INTERVAL);
                    elapsed += CLEAR_POLL_INTERVAL;
                }
                other => {
                    return Err(Error::protocol(format!(
                        "CHECK_CLEAR_STATUS returned 0x{:02x}",
                        other
                    )));
                }
            }
        }

        device.flush_bulk_in(Duration::from_millis(200));
        Ok(())
    }

    fn set_term_char(&mut self, term: Option<u8>) -> Result<()> {
        self.term_char = term;
        Ok(())
    }
}
