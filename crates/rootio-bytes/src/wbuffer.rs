use crate::{Error, Result, BYTE_COUNT_MASK, LONG_STRING_MARKER};

/// Growable big-endian write cursor.
///
/// Like [`crate::RBuffer`], positions are reported relative to a base so a
/// basket buffer can hand out absolute offsets before its key header has
/// been serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WBuffer {
    buf: Vec<u8>,
    offset: u32,
}

impl WBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(offset: u32) -> Self {
        Self {
            buf: Vec::new(),
            offset,
        }
    }

    pub fn with_capacity(offset: u32, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            offset,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Absolute position of the next byte to be written.
    pub fn pos(&self) -> i64 {
        self.buf.len() as i64 + i64::from(self.offset)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        let n = s.len();
        if n < LONG_STRING_MARKER as usize {
            self.write_u8(n as u8);
        } else {
            let n = u32::try_from(n).map_err(|_| Error::LengthOverflow(n))?;
            self.write_u8(LONG_STRING_MARKER);
            self.write_u32(n);
        }
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    pub fn write_fast_array_i32(&mut self, vs: &[i32]) {
        for &v in vs {
            self.write_i32(v);
        }
    }

    /// Reserves the byte-count word and writes `vers`. Returns the start
    /// position to hand back to [`WBuffer::set_byte_count`].
    pub fn write_version(&mut self, vers: i16) -> i64 {
        let start = self.pos();
        self.write_u32(0);
        self.write_i16(vers);
        start
    }

    /// Patches the byte-count word reserved at `start` with the number of
    /// bytes written since. Returns the total header+body size.
    pub fn set_byte_count(&mut self, start: i64, class: &str) -> Result<usize> {
        let len = self.pos() - start;
        let cnt = u32::try_from(len - 4)
            .ok()
            .filter(|cnt| cnt & BYTE_COUNT_MASK == 0)
            .ok_or_else(|| Error::ByteCountOverflow {
                class: class.to_string(),
                len,
            })?;
        let at = (start - i64::from(self.offset)) as usize;
        self.buf[at..at + 4].copy_from_slice(&(cnt | BYTE_COUNT_MASK).to_be_bytes());
        Ok(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RBuffer;
    use pretty_assertions::assert_eq;

    #[test]
    fn string_encoding_vectors() {
        let mut w = WBuffer::new();
        w.write_string("abc").unwrap();
        assert_eq!(w.bytes(), &[3, b'a', b'b', b'c']);

        let long = "x".repeat(300);
        let mut w = WBuffer::new();
        w.write_string(&long).unwrap();
        assert_eq!(&w.bytes()[..5], &[255, 0, 0, 1, 44]);
        assert_eq!(w.len(), crate::string_size(&long));
    }

    #[test]
    fn byte_count_covers_version_and_body() {
        let mut w = WBuffer::with_offset(10);
        let start = w.write_version(1);
        w.write_u8(7);
        assert_eq!(w.set_byte_count(start, "TIOFeatures").unwrap(), 7);
        assert_eq!(w.bytes(), &[0x40, 0, 0, 3, 0, 1, 7]);

        let mut r = RBuffer::with_offset(w.bytes(), 10);
        let v = r.read_version().unwrap();
        assert_eq!(v.vers, 1);
        assert_eq!(v.byte_count, Some(3));
        assert_eq!(r.read_u8().unwrap(), 7);
        r.check_byte_count(&v, "TIOFeatures").unwrap();
    }

    #[test]
    fn positions_include_base() {
        let mut w = WBuffer::with_offset(64);
        assert_eq!(w.pos(), 64);
        w.write_i64(-1);
        assert_eq!(w.pos(), 72);
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.pos(), 64);
    }
}
