//! ONC RPC message types, see [RFC5531](https://datatracker.ietf.org/doc/html/rfc5531) §9.

use std::io::{Read, Result, Write};

use crate::xdr::prelude::*;

pub(crate) const RPC_VERSION: u32 = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MismatchInfo {
    pub(crate) low: u32,
    pub(crate) high: u32,
}

impl XdrDecode for MismatchInfo {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        self.low.read_xdr(reader)?;
        self.high.read_xdr(reader)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthFlavour {
    None,
    Sys,
    Short,
    Unknown(u32),
}

impl Default for AuthFlavour {
    fn default() -> Self {
        AuthFlavour::None
    }
}

impl XdrEncode for AuthFlavour {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        let discriminant = match self {
            AuthFlavour::None => 0,
            AuthFlavour::Sys => 1,
            AuthFlavour::Short => 2,
            AuthFlavour::Unknown(x) => *x,
        };
        discriminant.write_xdr(writer)
    }
}

impl XdrDecode for AuthFlavour {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let mut discriminant = 0u32;
        discriminant.read_xdr(reader)?;
        *self = match discriminant {
            0 => AuthFlavour::None,
            1 => AuthFlavour::Sys,
            2 => AuthFlavour::Short,
            x => AuthFlavour::Unknown(x),
        };
        Ok(())
    }
}

/// `opaque_auth`: flavour plus up to 400 bytes of body. AUTH_NULL carries
/// an empty body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct OpaqueAuth {
    pub(crate) flavour: AuthFlavour,
    pub(crate) body: Opaque,
}

impl XdrEncode for OpaqueAuth {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        self.flavour.write_xdr(writer)?;
        self.body.write_xdr(writer)
    }
}

impl XdrDecode for OpaqueAuth {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        self.flavour.read_xdr(reader)?;
        self.body.read_xdr(reader)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthStat {
    Ok,
    BadCred,
    RejectedCred,
    BadVerf,
    RejectedVerf,
    TooWeak,
    Unknown(u32),
}

impl Default for AuthStat {
    fn default() -> Self {
        AuthStat::Ok
    }
}

impl XdrDecode for AuthStat {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let mut discriminant = 0u32;
        discriminant.read_xdr(reader)?;
        *self = match discriminant {
            0 => AuthStat::Ok,
            1 => AuthStat::BadCred,
            2 => AuthStat::RejectedCred,
            3 => AuthStat::BadVerf,
            4 => AuthStat::RejectedVerf,
            5 => AuthStat::TooWeak,
            x => AuthStat::Unknown(x),
        };
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct CallBody {
    pub(crate) rpc_vers: u32,
    pub(crate) prog: u32,
    pub(crate) vers: u32,
    pub(crate) proc: u32,
    pub(crate) cred: OpaqueAuth,
    pub(crate) verf: OpaqueAuth,
}

impl XdrEncode for CallBody {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        self.rpc_vers.write_xdr(writer)?;
        self.prog.write_xdr(writer)?;
        self.vers.write_xdr(writer)?;
        self.proc.write_xdr(writer)?;
        self.cred.write_xdr(writer)?;
        self.verf.write_xdr(writer)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum AcceptStat {
    Success,
    ProgUnavail,
    ProgMismatch(MismatchInfo),
    ProcUnavail,
    GarbageArgs,
    SystemErr,
    Unknown(u32),
}

impl Default for AcceptStat {
    fn default() -> Self {
        AcceptStat::Success
    }
}

impl XdrDecode for AcceptStat {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let mut discriminant = 0u32;
        discriminant.read_xdr(reader)?;
        *self = match discriminant {
            0 => AcceptStat::Success,
            1 => AcceptStat::ProgUnavail,
            2 => {
                let mut info = MismatchInfo::default();
                info.read_xdr(reader)?;
                AcceptStat::ProgMismatch(info)
            }
            3 => AcceptStat::ProcUnavail,
            4 => AcceptStat::GarbageArgs,
            5 => AcceptStat::SystemErr,
            x => AcceptStat::Unknown(x),
        };
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct AcceptedReply {
    pub(crate) verf: OpaqueAuth,
    pub(crate) stat: AcceptStat,
}

impl XdrDecode for AcceptedReply {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        self.verf.read_xdr(reader)?;
        self.stat.read_xdr(reader)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum RejectStat {
    RpcMismatch(MismatchInfo),
    AuthError(AuthStat),
    Unknown(u32),
}

impl XdrDecode for RejectStat {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let mut discriminant = 0u32;
        discriminant.read_xdr(reader)?;
        *self = match discriminant {
            0 => {
                let mut info = MismatchInfo::default();
                info.read_xdr(reader)?;
                RejectStat::RpcMismatch(info)
            }
            1 => {
                let mut stat = AuthStat::default();
                stat.read_xdr(reader)?;
                RejectStat::AuthError(stat)
            }
            x => RejectStat::Unknown(x),
        };
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ReplyStat {
    Accepted(AcceptedReply),
    Denied(RejectStat),
    Unknown(u32),
}

impl Default for ReplyStat {
    fn default() -> Self {
        ReplyStat::Accepted(AcceptedReply::default())
    }
}

impl XdrDecode for ReplyStat {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let mut discriminant = 0u32;
        discriminant.read_xdr(reader)?;
        *self = match discriminant {
            0 => {
                let mut accepted = AcceptedReply::default();
                accepted.read_xdr(reader)?;
                ReplyStat::Accepted(accepted)
            }
            1 => {
                let mut rejected = RejectStat::Unknown(0);
                rejected.read_xdr(reader)?;
                ReplyStat::Denied(rejected)
            }
            x => ReplyStat::Unknown(x),
        };
        Ok(())
    }
}

/// Top-level RPC message. Only calls are ever encoded and only replies
/// ever decoded on a client link.
#[derive(Debug, Default, Clone)]
pub(crate) struct RpcMessage {
    pub(crate) xid: u32,
    pub(crate) reply: ReplyStat,
}

impl RpcMessage {
    /// Write the 40-byte call header for `proc` with AUTH_NULL credentials.
    pub(crate) fn write_call<WR>(
        writer: &mut WR,
        xid: u32,
        prog: u32,
        vers: u32,
        proc: u32,
    ) -> Result<()>
    where
        WR: Write,
    {
        let body = CallBody {
            rpc_vers: RPC_VERSION,
            prog,
            vers,
            proc,
            cred: OpaqueAuth::default(),
            verf: OpaqueAuth::default(),
        };
        xid.write_xdr(writer)?;
        0u32.write_xdr(writer)?; // msg_type CALL
        body.write_xdr(writer)
    }
}

impl XdrDecode for RpcMessage {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        self.xid.read_xdr(reader)?;
        let mut msg_type = 0u32;
        msg_type.read_xdr(reader)?;
        if msg_type != 1 {
            // Not a reply; surface as an unknown stat for the caller to reject.
            self.reply = ReplyStat::Unknown(msg_type);
            return Ok(());
        }
        self.reply.read_xdr(reader)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn call_header_is_40_bytes() {
        let mut buf = Cursor::new(Vec::new());
        RpcMessage::write_call(&mut buf, 7, 0x0607AF, 1, 10).unwrap();
        let bytes = buf.into_inner();
        assert_eq!(bytes.len(), 40);
        // xid, CALL, rpcvers=2, prog, vers, proc
        assert_eq!(&bytes[0..4], [0, 0, 0, 7]);
        assert_eq!(&bytes[4..8], [0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], [0, 0, 0, 2]);
        assert_eq!(&bytes[20..24], [0, 0, 0, 10]);
        // AUTH_NULL cred + verf
        assert_eq!(&bytes[24..40], [0u8; 16]);
    }

    #[test]
    fn accepted_success_reply_decodes() {
        // xid=7, REPLY, MSG_ACCEPTED, verf AUTH_NULL, SUCCESS
        let raw: &[u8] = &[
            0, 0, 0, 7, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let mut msg = RpcMessage::default();
        msg.read_xdr(&mut Cursor::new(raw)).unwrap();
        assert_eq!(msg.xid, 7);
        assert!(matches!(
            msg.reply,
            ReplyStat::Accepted(AcceptedReply {
                stat: AcceptStat::Success,
                ..
            })
        ));
    }
}
