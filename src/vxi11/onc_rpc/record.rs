use std::io::{ErrorKind, Read, Result, Write};

use byteorder::{ByteOrder, NetworkEndian};

/// Reassemble one RPC record from its TCP Record Marking fragments.
/// Each fragment header carries the last-fragment flag in bit 31 and the
/// fragment length in bits 30..0.
pub(crate) fn read_record<RD>(reader: &mut RD, maxlen: usize) -> Result<Vec<u8>>
where
    RD: Read,
{
    let mut buf = Vec::new();

    loop {
        let mut fragment_header = [0u8; 4];
        reader.read_exact(&mut fragment_header)?;
        let fragment_len = NetworkEndian::read_u32(&fragment_header[..]);

        let len = (fragment_len & 0x7FFF_FFFF) as usize;
        if buf.len() + len > maxlen || buf.try_reserve(len).is_err() {
            return Err(ErrorKind::OutOfMemory.into());
        }
        reader.by_ref().take(len as u64).read_to_end(&mut buf)?;

        if fragment_len & 0x8000_0000 != 0 {
            break Ok(buf);
        }
    }
}

/// Send a record as a single last-fragment frame.
pub(crate) fn write_record<WR>(writer: &mut WR, record: Vec<u8>) -> Result<()>
where
    WR: Write,
{
    let fragment_len: u32 = 0x8000_0000 | (record.len() & 0x7FFF_FFFF) as u32;
    let mut fragment_header = [0u8; 4];
    NetworkEndian::write_u32(&mut fragment_header, fragment_len);
    writer.write_all(&fragment_header)?;

    writer.write_all(record.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    #[test]
    fn reassemble_single_fragment() {
        let mut cursor = Cursor::new(b"\x80\x00\x00\x04\x01\x02\x03\x04");
        let rec = super::read_record(&mut cursor, 10).unwrap();

        assert_eq!(rec[..], [1, 2, 3, 4])
    }

    #[test]
    fn reassemble_multiple_fragment() {
        let mut cursor = Cursor::new(b"\x00\x00\x00\x02\x01\x02\x80\x00\x00\x02\x03\x04");
        let rec = super::read_record(&mut cursor, 10).unwrap();

        assert_eq!(rec[..], [1, 2, 3, 4])
    }

    #[test]
    fn oversize_record_rejected() {
        let mut cursor = Cursor::new(b"\x80\x00\x00\x04\x01\x02\x03\x04");
        assert!(super::read_record(&mut cursor, 3).is_err());
    }

    #[test]
    fn written_record_is_single_last_fragment() {
        let mut out = Vec::new();
        super::write_record(&mut out, vec![0xAA, 0xBB]).unwrap();
        assert_eq!(out, [0x80, 0, 0, 2, 0xAA, 0xBB]);
    }
}
