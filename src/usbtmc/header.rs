//! USBTMC bulk message header codec.
//!
//! Every bulk transfer starts with a 12-byte little-endian header:
//!
//! | Offset | Field                                    |
//! |--------|------------------------------------------|
//! | 0      | MsgID                                    |
//! | 1      | bTag (1..255, never 0)                   |
//! | 2      | bTagInverse (bitwise complement of bTag) |
//! | 3      | reserved, 0                              |
//! | 4..8   | TransferSize (u32 LE)                    |
//! | 8      | bmTransferAttributes                     |
//! | 9      | TermChar                                 |
//! | 10..12 | reserved, 0                              |

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

use super::{
    DEV_DEP_MSG_IN, DEV_DEP_MSG_OUT, REQUEST_DEV_DEP_MSG_IN, TRANSFER_EOM, TRANSFER_TERM_CHAR_EN,
};

pub(crate) const HEADER_SIZE: usize = 12;

fn encode(msg_id: u8, tag: u8, transfer_size: u32, attributes: u8, term_char: u8) -> [u8; HEADER_SIZE] {
    let mut hdr = [0u8; HEADER_SIZE];
    hdr[0] = msg_id;
    hdr[1] = tag;
    hdr[2] = !tag;
    LittleEndian::write_u32(&mut hdr[4..8], transfer_size);
    hdr[8] = attributes;
    hdr[9] = term_char;
    hdr
}

/// Assemble a complete `DEV_DEP_MSG_OUT` packet: header, payload, and zero
/// padding to a four-byte boundary. EOM is always set; writes are a single
/// message.
pub(crate) fn dev_dep_msg_out(tag: u8, payload: &[u8]) -> Vec<u8> {
    let padded = (payload.len() + 3) & !3;
    let mut pkt = vec![0u8; HEADER_SIZE + padded];
    pkt[..HEADER_SIZE].copy_from_slice(&encode(
        DEV_DEP_MSG_OUT,
        tag,
        payload.len() as u32,
        TRANSFER_EOM,
        0,
    ));
    pkt[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);
    pkt
}

/// `REQUEST_DEV_DEP_MSG_IN` header asking for up to `max` response bytes,
/// optionally ending at `term_char`.
pub(crate) fn request_dev_dep_msg_in(tag: u8, max: u32, term_char: Option<u8>) -> [u8; HEADER_SIZE] {
    match term_char {
        Some(term) => encode(REQUEST_DEV_DEP_MSG_IN, tag, max, TRANSFER_TERM_CHAR_EN, term),
        None => encode(REQUEST_DEV_DEP_MSG_IN, tag, max, 0, 0),
    }
}

/// Parsed `DEV_DEP_MSG_IN` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DevDepMsgIn {
    pub(crate) transfer_size: u32,
    pub(crate) eom: bool,
}

/// Validate a bulk-IN response against the request tag. The reply must
/// echo both the tag and its complement exactly.
pub(crate) fn parse_dev_dep_msg_in(buf: &[u8], tag: u8) -> Result<DevDepMsgIn> {
    if buf.len() < HEADER_SIZE {
        return Err(Error::protocol("short usbtmc response header"));
    }
    if buf[0] != DEV_DEP_MSG_IN {
        return Err(Error::protocol(format!("unexpected usbtmc MsgID {}", buf[0])));
    }
    if buf[1] != tag || buf[2] != !tag {
        return Err(Error::protocol(format!(
            "usbtmc tag mismatch: sent {}, got {}/{}",
            tag, buf[1], buf[2]
        )));
    }

    Ok(DevDepMsgIn {
        transfer_size: LittleEndian::read_u32(&buf[4..8]),
        eom: buf[8] & TRANSFER_EOM != 0,
    })
}

/// Next bTag value: increments and skips the reserved value 0.
pub(crate) fn next_tag(tag: &mut u8) -> u8 {
    *tag = tag.wrapping_add(1);
    if *tag == 0 {
        *tag = 1;
    }
    *tag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_packet_layout() {
        let pkt = dev_dep_msg_out(7, b"*IDN?\n");
        // 12-byte header + 6 payload bytes padded to 8
        assert_eq!(pkt.len(), 20);
        assert_eq!(pkt[0], DEV_DEP_MSG_OUT);
        assert_eq!(pkt[1], 7);
        assert_eq!(pkt[2], !7u8);
        assert_eq!(pkt[3], 0);
        assert_eq!(&pkt[4..8], [6, 0, 0, 0]);
        assert_eq!(pkt[8], TRANSFER_EOM);
        assert_eq!(&pkt[12..18], b"*IDN?\n");
        assert_eq!(&pkt[18..20], [0, 0]);
    }

    #[test]
    fn tag_complement_always_valid() {
        let mut tag = 0u8;
        for _ in 0..600 {
            let t = next_tag(&mut tag);
            assert_ne!(t, 0);
            let pkt = dev_dep_msg_out(t, b"x");
            assert_eq!(pkt[2], !pkt[1]);
        }
    }

    #[test]
    fn response_tag_echo_verified() {
        let mut resp = [0u8; 16];
        resp[0] = DEV_DEP_MSG_IN;
        resp[1] = 9;
        resp[2] = !9u8;
        resp[4] = 4;
        resp[8] = TRANSFER_EOM;

        let parsed = parse_dev_dep_msg_in(&resp, 9).unwrap();
        assert_eq!(parsed.transfer_size, 4);
        assert!(parsed.eom);
    }

    #[test]
    fn corrupted_tag_complement_fails() {
        let mut resp = [0u8; 16];
        resp[0] = DEV_DEP_MSG_IN;
        resp[1] = 9;
        resp[2] = 0x55; // not !9
        assert!(parse_dev_dep_msg_in(&resp, 9).is_err());
    }

    #[test]
    fn in_request_carries_term_char() {
        let hdr = request_dev_dep_msg_in(3, 1024, Some(b'\n'));
        assert_eq!(hdr[0], REQUEST_DEV_DEP_MSG_IN);
        assert_eq!(hdr[8], TRANSFER_TERM_CHAR_EN);
        assert_eq!(hdr[9], b'\n');

        let hdr = request_dev_dep_msg_in(3, 1024, None);
        assert_eq!(hdr[8], 0);
        assert_eq!(hdr[9], 0);
    }
}
