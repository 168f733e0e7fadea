use crate::{Error, Result, BYTE_COUNT_MASK, LONG_STRING_MARKER};

/// Version header decoded by [`RBuffer::read_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub vers: i16,
    /// Absolute position of the header's first byte.
    pub start: i64,
    /// Byte count following the header word, if one was stamped.
    pub byte_count: Option<u32>,
}

/// Checked big-endian read cursor.
#[derive(Debug, Clone)]
pub struct RBuffer<'a> {
    data: &'a [u8],
    pos: usize,
    offset: u32,
}

impl<'a> RBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_offset(data, 0)
    }

    /// Cursor whose first byte lives at absolute position `offset`.
    pub fn with_offset(data: &'a [u8], offset: u32) -> Self {
        Self {
            data,
            pos: 0,
            offset,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Absolute position of the next byte to be read.
    pub fn pos(&self) -> i64 {
        self.pos as i64 + i64::from(self.offset)
    }

    pub fn set_pos(&mut self, pos: i64) -> Result<()> {
        let rel = pos - i64::from(self.offset);
        if rel < 0 || rel as usize > self.data.len() {
            return Err(Error::InvalidPosition {
                pos,
                base: self.offset,
                len: self.data.len(),
            });
        }
        self.pos = rel as usize;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::UnexpectedEof {
                pos: self.pos(),
                want: n,
                len: self.data.len(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.array()?))
    }

    /// Reads a ROOT `TString`: a `u8` length, or `255` then a `u32` length.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos();
        let n = match self.read_u8()? {
            LONG_STRING_MARKER => self.read_u32()? as usize,
            n => n as usize,
        };
        let raw = self.read_bytes(n)?;
        String::from_utf8(raw.to_vec()).map_err(|_| Error::InvalidUtf8(start))
    }

    pub fn read_fast_array_i32(&mut self, n: usize) -> Result<Vec<i32>> {
        (0..n).map(|_| self.read_i32()).collect()
    }

    /// Reads a `[byte count][version]` header, or a bare `u16` version when
    /// the byte-count bit is not set.
    pub fn read_version(&mut self) -> Result<Version> {
        let start = self.pos();
        let word = self.read_u32()?;
        if word & BYTE_COUNT_MASK != 0 {
            let vers = self.read_i16()?;
            return Ok(Version {
                vers,
                start,
                byte_count: Some(word & !BYTE_COUNT_MASK),
            });
        }
        self.set_pos(start)?;
        let vers = self.read_u16()? as i16;
        Ok(Version {
            vers,
            start,
            byte_count: None,
        })
    }

    /// Verifies the cursor consumed exactly the bytes announced by `v`.
    pub fn check_byte_count(&self, v: &Version, class: &str) -> Result<()> {
        let Some(bcnt) = v.byte_count else {
            return Ok(());
        };
        let got = self.pos() - v.start;
        let want = i64::from(bcnt) + 4;
        if got != want {
            return Err(Error::ByteCountMismatch {
                class: class.to_string(),
                got,
                want,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalars_are_big_endian() {
        let data = [0x01, 0x02, 0xff, 0xfe, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0];
        let mut r = RBuffer::new(&data);
        assert_eq!(r.read_u16().unwrap(), 0x0102);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.read_f64().unwrap(), 1.0);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_read_reports_position() {
        let data = [0u8; 3];
        let mut r = RBuffer::with_offset(&data, 100);
        r.skip(2).unwrap();
        let err = r.read_i32().unwrap_err();
        assert_eq!(
            err,
            Error::UnexpectedEof {
                pos: 102,
                want: 4,
                len: 3
            }
        );
    }

    #[test]
    fn positions_are_absolute() {
        let data = [9u8, 8, 7, 6];
        let mut r = RBuffer::with_offset(&data, 60);
        r.set_pos(62).unwrap();
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.pos(), 63);
        assert!(r.set_pos(59).is_err());
        assert!(r.set_pos(65).is_err());
        r.set_pos(64).unwrap();
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn bare_version_has_no_byte_count() {
        let data = [0x00, 0x03, 0xaa, 0xbb];
        let mut r = RBuffer::new(&data);
        let v = r.read_version().unwrap();
        assert_eq!(r.pos(), 2);
        assert_eq!(
            v,
            Version {
                vers: 3,
                start: 0,
                byte_count: None
            }
        );
        r.check_byte_count(&v, "TFoo").unwrap();
    }
}
