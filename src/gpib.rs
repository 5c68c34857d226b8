//! GPIB transport shell.
//!
//! Bus I/O is dispatched to an externally provided IEEE 488.2 controller
//! library (linux-gpib, NI-488.2). Integrating such a controller is the
//! hosting application's concern; when none is wired in, every operation
//! reports `NotSupported` so callers can probe for GPIB availability
//! without special cases.

use std::time::Duration;

use crate::error::{Error, ReadStatus, Result};
use crate::resource::{ResourceDescriptor, ResourceKind};
use crate::transport::Transport;

pub struct GpibTransport {
    board: u16,
    primary: u16,
    secondary: Option<u16>,
}

impl GpibTransport {
    pub fn new() -> Self {
        Self {
            board: 0,
            primary: 0,
            secondary: None,
        }
    }

    /// Bus address this transport would dial, for the attribute layer.
    pub fn address(&self) -> (u16, u16, Option<u16>) {
        (self.board, self.primary, self.secondary)
    }
}

impl Default for GpibTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for GpibTransport {
    fn open(&mut self, rsrc: &ResourceDescriptor, _timeout: Duration) -> Result<()> {
        match &rsrc.kind {
            ResourceKind::Gpib { primary, secondary } => {
                self.board = rsrc.board;
                self.primary = *primary;
                self.secondary = *secondary;
                Err(Error::NotSupported)
            }
            _ => Err(Error::InvalidResourceName(rsrc.raw.clone())),
        }
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(Error::NotSupported)
    }

    fn read(&mut self, _buf: &mut [u8], _timeout: Duration) -> Result<(usize, ReadStatus)> {
        Err(Error::NotSupported)
    }

    fn read_stb(&mut self) -> Result<u8> {
        Err(Error::NotSupported)
    }

    fn clear(&mut self) -> Result<()> {
        Err(Error::NotSupported)
    }
}
