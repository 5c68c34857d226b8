//! Minimal synchronous ONC RPC client over a TCP record stream.
//!
//! One outstanding call at a time; replies arrive in order on the link and
//! must echo the transaction id of the call.

use std::io::{Cursor, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::xdr::prelude::*;

pub(crate) mod record;
pub(crate) mod xdr;

use self::record::{read_record, write_record};
use self::xdr::{AcceptStat, ReplyStat, RpcMessage};

/// Upper bound on a single reply record; a VXI-11 read reply tops out at
/// the link's max_recv_size (64 KiB class) plus headers.
const MAX_RECORD: usize = 1024 * 1024;

/// Seed for the rolling transaction id: wall clock XOR a per-object token,
/// so concurrent links do not share xid sequences.
pub(crate) fn seed_xid(token: usize) -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    nanos ^ (token as u32)
}

pub(crate) struct StreamRpcClient<IO> {
    xid: u32,
    prog: u32,
    vers: u32,
    io: IO,
}

impl<IO> StreamRpcClient<IO> {
    pub(crate) fn new(io: IO, prog: u32, vers: u32, xid_seed: u32) -> Self {
        Self {
            xid: xid_seed,
            prog,
            vers,
            io,
        }
    }

    pub(crate) fn get_ref(&self) -> &IO {
        &self.io
    }
}

impl<IO> StreamRpcClient<IO>
where
    IO: Read + Write,
{
    /// Call procedure `proc` with arguments of type `ARGS`. Returns `Ok(RET)` if successful.
    pub(crate) fn call<ARGS, RET>(&mut self, proc: u32, args: ARGS) -> Result<RET>
    where
        ARGS: XdrEncode,
        RET: XdrDecode + Default,
    {
        self.xid = self.xid.wrapping_add(1);

        let mut args_cursor = Cursor::new(Vec::new());
        RpcMessage::write_call(&mut args_cursor, self.xid, self.prog, self.vers, proc)
            .map_err(Error::from)?;
        args.write_xdr(&mut args_cursor).map_err(Error::from)?;
        write_record(&mut self.io, args_cursor.into_inner())?;

        let fragment = read_record(&mut self.io, MAX_RECORD)?;
        let mut ret_cursor = Cursor::new(fragment);

        let mut reply = RpcMessage::default();
        reply.read_xdr(&mut ret_cursor).map_err(Error::from)?;
        log::trace!("rpc proc {} xid {} -> {:?}", proc, self.xid, reply.reply);

        if reply.xid != self.xid {
            return Err(Error::protocol(format!(
                "rpc xid mismatch: sent {}, got {}",
                self.xid, reply.xid
            )));
        }

        match reply.reply {
            ReplyStat::Accepted(accepted) => match accepted.stat {
                AcceptStat::Success => {
                    let mut ret: RET = Default::default();
                    ret.read_xdr(&mut ret_cursor).map_err(Error::from)?;
                    Ok(ret)
                }
                stat => Err(Error::protocol(format!("rpc call not accepted: {:?}", stat))),
            },
            ReplyStat::Denied(stat) => {
                Err(Error::protocol(format!("rpc call denied: {:?}", stat)))
            }
            ReplyStat::Unknown(x) => {
                Err(Error::protocol(format!("unexpected rpc message type {}", x)))
            }
        }
    }
}
