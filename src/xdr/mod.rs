//! XDR implementation and types for various protocols

pub mod basic;

pub mod prelude {
    pub use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};

    pub use super::basic::*;
}
