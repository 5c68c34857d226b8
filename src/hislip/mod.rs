//! HiSLIP client transport per IVI-6.1: two TCP connections (synchronous
//! data channel + asynchronous control channel) with 16-byte framed
//! messages.

use bitfield::bitfield;

pub(crate) mod messages;

mod client;

pub use client::HislipTransport;

/// IANA-assigned HiSLIP port.
pub const DEFAULT_PORT: u16 = 4880;

/// Protocol version 1.0
pub const PROTOCOL_1_0: Protocol = Protocol(0x0100);

bitfield! {
    #[derive(Ord, PartialOrd, Eq, PartialEq, Copy, Clone)]
    pub struct Protocol(u16);
    impl Debug;
    // The fields default to u16
    pub u8, major, set_major : 15, 8;
    pub u8, minor, set_minor : 7, 0;
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display as `major.minor`
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl From<u16> for Protocol {
    fn from(x: u16) -> Self {
        Protocol(x)
    }
}

impl From<Protocol> for u16 {
    fn from(p: Protocol) -> Self {
        p.0
    }
}
