//! Basic XDR encoding per [RFC4506](https://datatracker.ietf.org/doc/html/rfc4506):
//! big-endian 32-bit quantities, variable-length data length-prefixed and
//! zero-padded to a four-byte boundary.

use std::io::{Read, Result, Write};

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};

pub trait XdrEncode {
    /// Serialize into an XDR stream.
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write;
}

pub trait XdrDecode {
    /// Deserialize from an XDR stream.
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read;
}

fn padding(len: usize) -> usize {
    (4 - (len & 3)) & 3
}

impl XdrEncode for () {
    fn write_xdr<WR>(&self, _writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        Ok(())
    }
}

impl XdrDecode for () {
    fn read_xdr<RD>(&mut self, _reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        Ok(())
    }
}

impl XdrEncode for u32 {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(*self)
    }
}

impl XdrDecode for u32 {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        *self = reader.read_u32::<NetworkEndian>()?;
        Ok(())
    }
}

impl XdrEncode for i32 {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_i32::<NetworkEndian>(*self)
    }
}

impl XdrDecode for i32 {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        *self = reader.read_i32::<NetworkEndian>()?;
        Ok(())
    }
}

// Sub-word integers occupy a full XDR word on the wire.

impl XdrEncode for u16 {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(*self as u32)
    }
}

impl XdrDecode for u16 {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        *self = reader.read_u32::<NetworkEndian>()? as u16;
        Ok(())
    }
}

impl XdrEncode for u8 {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(*self as u32)
    }
}

impl XdrDecode for u8 {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        *self = reader.read_u32::<NetworkEndian>()? as u8;
        Ok(())
    }
}

impl XdrEncode for bool {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(u32::from(*self))
    }
}

impl XdrDecode for bool {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        *self = reader.read_u32::<NetworkEndian>()? != 0;
        Ok(())
    }
}

/// Variable-length opaque data.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Opaque(pub Vec<u8>);

impl From<Vec<u8>> for Opaque {
    fn from(data: Vec<u8>) -> Self {
        Opaque(data)
    }
}

impl XdrEncode for Opaque {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(self.0.len() as u32)?;
        writer.write_all(&self.0)?;
        for _ in 0..padding(self.0.len()) {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

impl XdrDecode for Opaque {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let len = reader.read_u32::<NetworkEndian>()? as usize;
        self.0.resize(len, 0);
        reader.read_exact(&mut self.0)?;
        for _ in 0..padding(len) {
            reader.read_u8()?;
        }
        Ok(())
    }
}

impl XdrEncode for Vec<u8> {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(self.len() as u32)?;
        writer.write_all(self)?;
        for _ in 0..padding(self.len()) {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

impl XdrDecode for Vec<u8> {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let len = reader.read_u32::<NetworkEndian>()? as usize;
        self.resize(len, 0);
        reader.read_exact(self)?;
        for _ in 0..padding(len) {
            reader.read_u8()?;
        }
        Ok(())
    }
}

impl XdrEncode for String {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(self.len() as u32)?;
        writer.write_all(self.as_bytes())?;
        for _ in 0..padding(self.len()) {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

impl XdrDecode for String {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let len = reader.read_u32::<NetworkEndian>()? as usize;
        let mut bytes = vec![0u8; len];
        reader.read_exact(&mut bytes)?;
        for _ in 0..padding(len) {
            reader.read_u8()?;
        }
        *self = String::from_utf8_lossy(&bytes).into_owned();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn u32_is_big_endian() {
        let mut buf = Cursor::new(Vec::new());
        0x01020304u32.write_xdr(&mut buf).unwrap();
        assert_eq!(buf.into_inner(), [1, 2, 3, 4]);
    }

    #[test]
    fn string_is_length_prefixed_and_padded() {
        let mut buf = Cursor::new(Vec::new());
        "inst0".to_string().write_xdr(&mut buf).unwrap();
        assert_eq!(
            buf.into_inner(),
            [0, 0, 0, 5, b'i', b'n', b's', b't', b'0', 0, 0, 0]
        );
    }

    #[test]
    fn opaque_round_trip() {
        for len in 0..9 {
            let data = Opaque((0..len).collect());
            let mut buf = Cursor::new(Vec::new());
            data.write_xdr(&mut buf).unwrap();
            assert_eq!(buf.get_ref().len() % 4, 0);

            buf.set_position(0);
            let mut back = Opaque::default();
            back.read_xdr(&mut buf).unwrap();
            assert_eq!(back, data);
        }
    }

    #[test]
    fn sub_word_integers_occupy_a_word() {
        let mut buf = Cursor::new(Vec::new());
        0xBEEFu16.write_xdr(&mut buf).unwrap();
        true.write_xdr(&mut buf).unwrap();
        assert_eq!(buf.into_inner(), [0, 0, 0xBE, 0xEF, 0, 0, 0, 1]);
    }
}
