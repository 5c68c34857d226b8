//! Vendor-neutral VISA I/O core for test-and-measurement instruments.
//!
//! This crate is the engine behind a VISA-compatible shared library: it
//! parses resource strings, manages the session table, discovers
//! instruments, and speaks the four instrument-control wire protocols
//! from the socket up:
//!
//! - **VXI-11**: ONC RPC over TCP with a portmapper bootstrap,
//! - **HiSLIP**: dual-channel framed protocol (IVI-6.1),
//! - **USBTMC/USB488**: bulk transfers with a tagged 12-byte header,
//! - **raw socket** and **serial**: newline-terminated byte streams.
//!
//! All I/O is blocking and bounded by per-call timeouts; there is no
//! async runtime. The session layer in [`session`] is the surface a
//! C ABI shim maps the `viOpen`/`viRead`/`viWrite` entry points onto.
//!
//! ```no_run
//! use openvisa::session;
//!
//! # fn main() -> openvisa::Result<()> {
//! let rm = session::open_default_rm()?;
//! let scope = session::open(rm, "TCPIP::192.168.1.50::INSTR", 0)?;
//!
//! session::write(scope, b"*IDN?\n")?;
//! let mut buf = [0u8; 256];
//! let (n, _status) = session::read(scope, &mut buf)?;
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//!
//! session::close(scope)?;
//! session::close(rm)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
#![doc = document_features::document_features!()]

pub mod discovery;
pub mod error;
pub mod gpib;
pub mod hislip;
pub mod net;
pub mod resource;
pub mod session;
pub mod socket;
pub mod transport;
pub mod vxi11;
pub(crate) mod xdr;

#[cfg(feature = "serial")]
pub mod serial;
#[cfg(feature = "usb")]
pub mod usbtmc;

pub use error::{Error, ReadStatus, Result};
pub use resource::{parse_resource, InterfaceType, ResourceDescriptor, ResourceKind};
pub use session::{Attribute, AttrValue, Handle};
pub use transport::Transport;
