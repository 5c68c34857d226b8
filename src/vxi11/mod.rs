//! VXI-11 instrument transport: the Device Core channel of the VXIbus
//! TCP/IP Instrument Protocol, carried over ONC RPC
//! ([RFC5531](https://datatracker.ietf.org/doc/html/rfc5531)).

pub(crate) mod onc_rpc;
pub(crate) mod portmapper;
pub(crate) mod xdr;

mod client;

pub use client::Vxi11Transport;

/// VXI-11 core channel program number
pub const DEVICE_CORE: u32 = 0x0607AF;
/// VXI-11 core channel program version
pub const DEVICE_CORE_VERSION: u32 = 1;

// Core channel procedures
pub(crate) const CREATE_LINK: u32 = 10;
pub(crate) const DEVICE_WRITE: u32 = 11;
pub(crate) const DEVICE_READ: u32 = 12;
pub(crate) const DEVICE_READSTB: u32 = 13;
pub(crate) const DEVICE_CLEAR: u32 = 15;
pub(crate) const DESTROY_LINK: u32 = 23;

// Device_Flags bits
pub(crate) const FLAG_END: u32 = 0x08;

// Termination reason bits in the device_read reply
pub(crate) const REASON_REQCNT: u32 = 0x01;
pub(crate) const REASON_CHR: u32 = 0x02;
pub(crate) const REASON_END: u32 = 0x04;
