//! Dual-channel HiSLIP client and its transport adapter.

use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Error, ReadStatus, Result};
use crate::net;
use crate::resource::{ResourceDescriptor, ResourceKind};
use crate::transport::Transport;

use super::messages::{
    FeatureBitmap, Header, InitializeParameter, InitializeResponseParameter, Message, MessageType,
};
use super::{DEFAULT_PORT, PROTOCOL_1_0};

/// Unregistered client vendor id sent in the Initialize parameter.
const CLIENT_VENDOR_ID: u16 = 0;
/// Default maximum message size; no AsyncMaximumMessageSize negotiation
/// is performed, matching common client practice.
const MAX_MESSAGE_SIZE: u64 = 65536;
/// Bound on handshake/control payloads we are willing to buffer.
const MAX_CONTROL_PAYLOAD: u64 = 4096;
/// Status query and device clear bound, independent of the session timeout.
const CONTROL_TIMEOUT: Duration = Duration::from_millis(5000);

struct Channels {
    /// Synchronous channel: data, device-clear completion.
    synch: TcpStream,
    /// Asynchronous channel: status query, device-clear initiation.
    asynch: TcpStream,
    session_id: u16,
    message_id: u32,
}

pub struct HislipTransport {
    channels: Option<Channels>,
    max_msg_size: u64,
}

impl HislipTransport {
    pub fn new() -> Self {
        Self {
            channels: None,
            max_msg_size: MAX_MESSAGE_SIZE,
        }
    }

    fn channels(&mut self) -> Result<&mut Channels> {
        self.channels.as_mut().ok_or(Error::ConnectionLost)
    }

    fn handshake(
        host: &str,
        port: u16,
        sub_addr: &str,
        timeout: Duration,
    ) -> Result<Channels> {
        // Synchronous channel first; its InitializeResponse carries the
        // session id the asynchronous channel must present.
        let mut synch = net::connect_timeout(host, port, timeout)?;
        net::set_read_timeout(&synch, timeout)?;

        let param = InitializeParameter::new(PROTOCOL_1_0, CLIENT_VENDOR_ID);
        MessageType::Initialize
            .message_params(0, param.0)
            .with_payload(sub_addr.as_bytes().to_vec())
            .write_to(&mut synch)?;

        let resp = Message::read_from(&mut synch, MAX_CONTROL_PAYLOAD)?;
        let session_id = match resp.message_type {
            MessageType::InitializeResponse => {
                let param = InitializeResponseParameter(resp.message_parameter);
                log::debug!(
                    "hislip session {} negotiated protocol {}",
                    param.session_id(),
                    param.negotiated_protocol()
                );
                param.session_id()
            }
            MessageType::FatalError | MessageType::Error => {
                return Err(Error::protocol(format!(
                    "server rejected initialization: {}",
                    String::from_utf8_lossy(&resp.payload)
                )));
            }
            other => {
                return Err(Error::protocol(format!(
                    "unexpected initialize response: {:?}",
                    other
                )));
            }
        };

        let mut asynch = net::connect_timeout(host, port, timeout)?;
        net::set_read_timeout(&asynch, timeout)?;

        MessageType::AsyncInitialize
            .message_params(0, session_id as u32)
            .write_to(&mut asynch)?;

        let resp = Message::read_from(&mut asynch, MAX_CONTROL_PAYLOAD)?;
        if resp.message_type != MessageType::AsyncInitializeResponse {
            return Err(Error::protocol(format!(
                "unexpected async initialize response: {:?}",
                resp.message_type
            )));
        }

        Ok(Channels {
            synch,
            asynch,
            session_id,
            message_id: 0,
        })
    }
}

impl Default for HislipTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HislipTransport {
    fn open(&mut self, rsrc: &ResourceDescriptor, timeout: Duration) -> Result<()> {
        let (host, port, sub_addr) = match &rsrc.kind {
            ResourceKind::Tcpip {
                host,
                port,
                device_name,
                ..
            } => (host.as_str(), *port, device_name.as_str()),
            _ => return Err(Error::InvalidResourceName(rsrc.raw.clone())),
        };
        let port = if port == 0 { DEFAULT_PORT } else { port };
        let sub_addr = if sub_addr.is_empty() {
            "hislip0"
        } else {
            sub_addr
        };

        let channels = Self::handshake(host, port, sub_addr, timeout)?;
        log::debug!("hislip open, session id {}", channels.session_id);
        self.channels = Some(channels);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Both sockets simply close; HiSLIP has no teardown message.
        self.channels = None;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let max = self.max_msg_size as usize;
        let channels = self.channels()?;

        // One message id per write; every fragment of it carries the same id.
        channels.message_id = channels.message_id.wrapping_add(2);
        let message_id = channels.message_id;

        let mut sent = 0usize;
        while sent < data.len() {
            let chunk = (data.len() - sent).min(max);
            let last = sent + chunk >= data.len();
            let message_type = if last {
                MessageType::DataEnd
            } else {
                MessageType::Data
            };

            message_type
                .message_params(0, message_id)
                .with_payload(data[sent..sent + chunk].to_vec())
                .write_to(&mut channels.synch)?;
            sent += chunk;
        }

        Ok(sent)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(usize, ReadStatus)> {
        let channels = self.channels()?;
        net::set_read_timeout(&channels.synch, timeout)?;

        let mut total = 0usize;
        let mut truncated = false;

        loop {
            let header = Header::read_from(&mut channels.synch)?;

            match header.message_type {
                Some(MessageType::FatalError) | Some(MessageType::Error) => {
                    net::discard(&mut channels.synch, header.payload_length)?;
                    return Err(Error::protocol("device reported a hislip error"));
                }
                Some(MessageType::Data) | Some(MessageType::DataEnd) => {
                    let space = buf.len() - total;
                    let len = header.payload_length;

                    if len <= space as u64 {
                        let end = total + len as usize;
                        net::read_exact(&mut channels.synch, &mut buf[total..end])?;
                        total = end;
                    } else {
                        net::read_exact(&mut channels.synch, &mut buf[total..])?;
                        total = buf.len();
                        net::discard(&mut channels.synch, len - space as u64)?;
                        truncated = true;
                    }

                    if header.message_type == Some(MessageType::DataEnd) {
                        break;
                    }
                }
                // Anything else (service requests, unknown types) is not
                // part of the data stream.
                _ => {
                    net::discard(&mut channels.synch, header.payload_length)?;
                }
            }
        }

        let status = if truncated {
            ReadStatus::MaxCount
        } else {
            ReadStatus::TermChar
        };
        Ok((total, status))
    }

    /// Status byte via AsyncStatusQuery; the reply carries the byte in its
    /// control-code field, not the payload.
    fn read_stb(&mut self) -> Result<u8> {
        let channels = self.channels()?;
        net::set_read_timeout(&channels.asynch, CONTROL_TIMEOUT)?;

        MessageType::AsyncStatusQuery
            .message_params(0, channels.message_id)
            .write_to(&mut channels.asynch)?;

        let resp = Message::read_from(&mut channels.asynch, MAX_CONTROL_PAYLOAD)?;
        if resp.message_type != MessageType::AsyncStatusResponse {
            return Err(Error::protocol(format!(
                "unexpected status response: {:?}",
                resp.message_type
            )));
        }
        Ok(resp.control_code)
    }

    /// Device clear handshake: AsyncDeviceClear and its acknowledgement on
    /// the async channel, then DeviceClearComplete on the sync channel,
    /// acknowledged with the device's feature flags echoed back. Resets
    /// the message id.
    fn clear(&mut self) -> Result<()> {
        let channels = self.channels()?;
        net::set_read_timeout(&channels.asynch, CONTROL_TIMEOUT)?;
        net::set_read_timeout(&channels.synch, CONTROL_TIMEOUT)?;

        MessageType::AsyncDeviceClear
            .message_params(0, 0)
            .write_to(&mut channels.asynch)?;

        let resp = Message::read_from(&mut channels.asynch, MAX_CONTROL_PAYLOAD)?;
        if resp.message_type != MessageType::AsyncDeviceClearAcknowledge {
            return Err(Error::protocol(format!(
                "unexpected device clear acknowledge: {:?}",
                resp.message_type
            )));
        }

        let complete = Message::read_from(&mut channels.synch, MAX_CONTROL_PAYLOAD)?;
        if complete.message_type != MessageType::DeviceClearComplete {
            return Err(Error::protocol(format!(
                "unexpected device clear completion: {:?}",
                complete.message_type
            )));
        }
        let feature_flags = complete.control_code;
        log::debug!(
            "device clear complete, features: {:?}",
            FeatureBitmap(feature_flags)
        );

        MessageType::DeviceClearAcknowledge
            .message_params(feature_flags, 0)
            .write_to(&mut channels.synch)?;

        channels.message_id = 0;
        Ok(())
    }
}
