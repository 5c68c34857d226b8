//! HiSLIP message framing.
//!
//! Wire layout (16 bytes, then payload):
//!
//! | Offset | Size | Field                            |
//! |--------|------|----------------------------------|
//! | 0      | 2    | Prologue `H`, `S`                |
//! | 2      | 1    | Message type                     |
//! | 3      | 1    | Control code                     |
//! | 4      | 4    | Message parameter (big-endian)   |
//! | 8      | 8    | Payload length (big-endian)      |

use std::io::{Read, Write};

use bitfield::bitfield;
use byteorder::{BigEndian, ByteOrder, NetworkEndian};

use crate::error::{Error, Result};

use super::Protocol;

/// Message Type Value Definitions
///
/// See Table 4 in HiSLIP specification
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MessageType {
    Initialize,
    InitializeResponse,
    FatalError,
    Error,
    AsyncLock,
    AsyncLockResponse,
    Data,
    DataEnd,
    DeviceClearComplete,
    DeviceClearAcknowledge,
    AsyncRemoteLocalControl,
    AsyncRemoteLocalResponse,
    Trigger,
    Interrupted,
    AsyncInterrupted,
    AsyncMaximumMessageSize,
    AsyncMaximumMessageSizeResponse,
    AsyncInitialize,
    AsyncInitializeResponse,
    AsyncDeviceClear,
    AsyncServiceRequest,
    AsyncStatusQuery,
    AsyncStatusResponse,
    AsyncDeviceClearAcknowledge,
    AsyncLockInfo,
    AsyncLockInfoResponse,
    /// Vendor-specific, only codes 128-255 are allowed
    VendorSpecific(u8),
}

impl MessageType {
    pub fn get_message_type(&self) -> u8 {
        match self {
            MessageType::Initialize => 0,
            MessageType::InitializeResponse => 1,
            MessageType::FatalError => 2,
            MessageType::Error => 3,
            MessageType::AsyncLock => 4,
            MessageType::AsyncLockResponse => 5,
            MessageType::Data => 6,
            MessageType::DataEnd => 7,
            MessageType::DeviceClearComplete => 8,
            MessageType::DeviceClearAcknowledge => 9,
            MessageType::AsyncRemoteLocalControl => 10,
            MessageType::AsyncRemoteLocalResponse => 11,
            MessageType::Trigger => 12,
            MessageType::Interrupted => 13,
            MessageType::AsyncInterrupted => 14,
            MessageType::AsyncMaximumMessageSize => 15,
            MessageType::AsyncMaximumMessageSizeResponse => 16,
            MessageType::AsyncInitialize => 17,
            MessageType::AsyncInitializeResponse => 18,
            MessageType::AsyncDeviceClear => 19,
            MessageType::AsyncServiceRequest => 20,
            MessageType::AsyncStatusQuery => 21,
            MessageType::AsyncStatusResponse => 22,
            MessageType::AsyncDeviceClearAcknowledge => 23,
            MessageType::AsyncLockInfo => 24,
            MessageType::AsyncLockInfoResponse => 25,
            MessageType::VendorSpecific(x) => x | 0x80,
        }
    }

    pub fn from_message_type(typ: u8) -> Option<MessageType> {
        match typ {
            0 => Some(MessageType::Initialize),
            1 => Some(MessageType::InitializeResponse),
            2 => Some(MessageType::FatalError),
            3 => Some(MessageType::Error),
            4 => Some(MessageType::AsyncLock),
            5 => Some(MessageType::AsyncLockResponse),
            6 => Some(MessageType::Data),
            7 => Some(MessageType::DataEnd),
            8 => Some(MessageType::DeviceClearComplete),
            9 => Some(MessageType::DeviceClearAcknowledge),
            10 => Some(MessageType::AsyncRemoteLocalControl),
            11 => Some(MessageType::AsyncRemoteLocalResponse),
            12 => Some(MessageType::Trigger),
            13 => Some(MessageType::Interrupted),
            14 => Some(MessageType::AsyncInterrupted),
            15 => Some(MessageType::AsyncMaximumMessageSize),
            16 => Some(MessageType::AsyncMaximumMessageSizeResponse),
            17 => Some(MessageType::AsyncInitialize),
            18 => Some(MessageType::AsyncInitializeResponse),
            19 => Some(MessageType::AsyncDeviceClear),
            20 => Some(MessageType::AsyncServiceRequest),
            21 => Some(MessageType::AsyncStatusQuery),
            22 => Some(MessageType::AsyncStatusResponse),
            23 => Some(MessageType::AsyncDeviceClearAcknowledge),
            24 => Some(MessageType::AsyncLockInfo),
            25 => Some(MessageType::AsyncLockInfoResponse),
            128..=255 => Some(MessageType::VendorSpecific(typ)),
            _ => None,
        }
    }

    pub(crate) fn message_params(self, control_code: u8, message_parameter: u32) -> Message {
        Message {
            message_type: self,
            control_code,
            message_parameter,
            payload: Vec::new(),
        }
    }
}

/// Raw header as it came off the wire; the payload is still unread. Used
/// by the data loop so oversized payloads can be streamed or discarded.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub(crate) message_type: Option<MessageType>,
    pub(crate) control_code: u8,
    pub(crate) message_parameter: u32,
    pub(crate) payload_length: u64,
}

impl Header {
    pub const SIZE: usize = 16;

    pub(crate) fn read_from<RD>(reader: &mut RD) -> Result<Header>
    where
        RD: Read,
    {
        let mut buf = [0u8; Header::SIZE];
        reader.read_exact(&mut buf)?;
        if &buf[0..2] != b"HS" {
            return Err(Error::protocol("invalid hislip prologue"));
        }

        Ok(Header {
            message_type: MessageType::from_message_type(buf[2]),
            control_code: buf[3],
            message_parameter: BigEndian::read_u32(&buf[4..8]),
            payload_length: BigEndian::read_u64(&buf[8..16]),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Message {
    pub(crate) message_type: MessageType,
    pub(crate) control_code: u8,
    pub(crate) message_parameter: u32,
    pub(crate) payload: Vec<u8>,
}

impl Message {
    pub(crate) fn with_payload(self, payload: Vec<u8>) -> Self {
        Self { payload, ..self }
    }

    /// Read a complete message, payload included. For the handshake and
    /// control paths where payloads are small and bounded by `maxlen`.
    pub(crate) fn read_from<RD>(reader: &mut RD, maxlen: u64) -> Result<Message>
    where
        RD: Read,
    {
        let header = Header::read_from(reader)?;
        if header.payload_length > maxlen {
            return Err(Error::protocol("hislip message payload too large"));
        }

        let mut payload = vec![0u8; header.payload_length as usize];
        reader.read_exact(&mut payload)?;

        let message_type = header
            .message_type
            .ok_or_else(|| Error::protocol("unrecognized hislip message type"))?;
        Ok(Message {
            message_type,
            control_code: header.control_code,
            message_parameter: header.message_parameter,
            payload,
        })
    }

    pub(crate) fn write_to<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        let mut buf = [0u8; Header::SIZE];
        buf[0] = b'H';
        buf[1] = b'S';
        buf[2] = self.message_type.get_message_type();
        buf[3] = self.control_code;
        NetworkEndian::write_u32(&mut buf[4..8], self.message_parameter);
        NetworkEndian::write_u64(&mut buf[8..16], self.payload.len() as u64);
        writer.write_all(&buf)?;
        writer.write_all(&self.payload)?;
        Ok(())
    }
}

bitfield! {
    pub struct InitializeParameter(u32);
    impl Debug;
    // The fields default to u16
    pub u16, from into Protocol, client_protocol, set_client_protocol : 31, 16;
    pub u16, client_vendorid, set_client_vendorid : 15, 0;
}

impl InitializeParameter {
    pub(crate) fn new(protocol: Protocol, vendorid: u16) -> Self {
        let mut x = InitializeParameter(0);
        x.set_client_protocol(protocol);
        x.set_client_vendorid(vendorid);
        x
    }
}

bitfield! {
    pub struct InitializeResponseParameter(u32);
    impl Debug;
    // The fields default to u16
    pub u16, from into Protocol, negotiated_protocol, set_negotiated_protocol : 31, 16;
    pub u16, session_id, set_session_id : 15, 0;
}

bitfield! {
    pub struct FeatureBitmap(u8);
    impl Debug;
    pub overlapped, set_overlapped : 0;
    pub encryption, set_encryption : 1;
    pub initial_encryption, set_initial_encryption : 2;
}
