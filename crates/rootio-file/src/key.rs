use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::debug;
use rootio_bytes::{string_size, RBuffer, WBuffer};

use crate::Result;

const KEY_VERSION: i16 = 4;

/// Versions above this threshold use 64-bit seek pointers.
const BIG_KEY_VERSION: i16 = 1000;

/// Record header in front of every object stored in a file.
///
/// Layout (big-endian): `i32 nbytes, i16 version, i32 objlen, u32 datime,
/// i16 keylen, i16 cycle, seekkey, seekpdir, class, name, title`. The two
/// seeks are `i32` for version ≤ 1000 and `i64` otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    version: i16,
    n_bytes: i32,
    obj_len: i32,
    datime: u32,
    key_len: i32,
    cycle: i16,
    seek_key: i64,
    seek_pdir: i64,
    class: String,
    name: String,
    title: String,
    buffer: Vec<u8>,
}

impl Key {
    /// New key for `class`. `extra` counts the bytes the object streams right
    /// after the key header and that are accounted for in `key_len` (a basket
    /// header, for instance).
    pub fn new(class: &str, name: &str, title: &str, extra: i32, big: bool) -> Self {
        let mut version = KEY_VERSION;
        if big {
            version += BIG_KEY_VERSION;
        }
        Self {
            version,
            n_bytes: 0,
            obj_len: 0,
            datime: datime_now(),
            key_len: Self::header_len(class, name, title, big) + extra,
            cycle: 1,
            seek_key: 0,
            seek_pdir: 0,
            class: class.to_string(),
            name: name.to_string(),
            title: title.to_string(),
            buffer: Vec::new(),
        }
    }

    /// Size of the bare key header.
    pub fn header_len(class: &str, name: &str, title: &str, big: bool) -> i32 {
        let seeks = if big { 16 } else { 8 };
        let strings = string_size(class) + string_size(name) + string_size(title);
        18 + seeks + strings as i32
    }

    pub fn version(&self) -> i16 {
        self.version
    }

    pub fn is_big(&self) -> bool {
        self.version > BIG_KEY_VERSION
    }

    /// Switches to 64-bit seeks; the header grows by 8 bytes.
    pub fn promote_to_big(&mut self) {
        if self.is_big() {
            return;
        }
        self.version += BIG_KEY_VERSION;
        self.key_len += 8;
        debug!(
            "key {:?}: promoted to 64-bit seeks (version={}, keylen={})",
            self.name, self.version, self.key_len
        );
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn key_len(&self) -> i32 {
        self.key_len
    }

    /// Uncompressed object length.
    pub fn obj_len(&self) -> i32 {
        self.obj_len
    }

    /// Key header plus stored (possibly compressed) object bytes.
    pub fn n_bytes(&self) -> i32 {
        self.n_bytes
    }

    pub fn is_compressed(&self) -> bool {
        self.obj_len != self.n_bytes - self.key_len
    }

    pub fn cycle(&self) -> i16 {
        self.cycle
    }

    pub fn set_cycle(&mut self, cycle: i16) {
        self.cycle = cycle;
    }

    pub fn seek_key(&self) -> i64 {
        self.seek_key
    }

    pub fn set_seek_key(&mut self, seek: i64) {
        self.seek_key = seek;
    }

    pub fn seek_pdir(&self) -> i64 {
        self.seek_pdir
    }

    pub fn set_seek_pdir(&mut self, seek: i64) {
        self.seek_pdir = seek;
    }

    pub fn datime(&self) -> u32 {
        self.datime
    }

    pub fn datetime(&self) -> Option<NaiveDateTime> {
        let d = self.datime;
        NaiveDate::from_ymd_opt((d >> 26) as i32 + 1995, (d >> 22) & 0xf, (d >> 17) & 0x1f)?
            .and_hms_opt((d >> 12) & 0x1f, (d >> 6) & 0x3f, d & 0x3f)
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Installs the in-memory object payload. Sizes are left untouched.
    pub fn set_buffer(&mut self, buf: Vec<u8>) {
        self.buffer = buf;
    }

    /// Records the uncompressed object length and the stored record size.
    pub fn set_sizes(&mut self, obj_len: i32, n_bytes: i32) {
        self.obj_len = obj_len;
        self.n_bytes = n_bytes;
    }

    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub fn encode(&self, w: &mut WBuffer) -> Result<()> {
        w.write_i32(self.n_bytes);
        w.write_i16(self.version);
        w.write_i32(self.obj_len);
        w.write_u32(self.datime);
        w.write_i16(self.key_len as i16);
        w.write_i16(self.cycle);
        if self.is_big() {
            w.write_i64(self.seek_key);
            w.write_i64(self.seek_pdir);
        } else {
            w.write_i32(self.seek_key as i32);
            w.write_i32(self.seek_pdir as i32);
        }
        w.write_string(&self.class)?;
        w.write_string(&self.name)?;
        w.write_string(&self.title)?;
        Ok(())
    }

    pub fn decode(r: &mut RBuffer<'_>) -> Result<Self> {
        let n_bytes = r.read_i32()?;
        let version = r.read_i16()?;
        let obj_len = r.read_i32()?;
        let datime = r.read_u32()?;
        let key_len = i32::from(r.read_i16()?);
        let cycle = r.read_i16()?;
        let (seek_key, seek_pdir) = if version > BIG_KEY_VERSION {
            (r.read_i64()?, r.read_i64()?)
        } else {
            (i64::from(r.read_i32()?), i64::from(r.read_i32()?))
        };
        let class = r.read_string()?;
        let name = r.read_string()?;
        let title = r.read_string()?;
        Ok(Self {
            version,
            n_bytes,
            obj_len,
            datime,
            key_len,
            cycle,
            seek_key,
            seek_pdir,
            class,
            name,
            title,
            buffer: Vec::new(),
        })
    }
}

/// Packs `dt` into ROOT's 32-bit `TDatime` representation.
pub fn datime_from(dt: NaiveDateTime) -> u32 {
    let year = (dt.year() - 1995).clamp(0, 63) as u32;
    year << 26
        | dt.month() << 22
        | dt.day() << 17
        | dt.hour() << 12
        | dt.minute() << 6
        | dt.second()
}

pub fn datime_now() -> u32 {
    datime_from(chrono::Local::now().naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_len_matches_encoding() {
        for big in [false, true] {
            let mut key = Key::new("TBasket", "one", "tree", 0, big);
            key.set_seek_key(1234);
            let mut w = WBuffer::new();
            key.encode(&mut w).unwrap();
            assert_eq!(w.len() as i32, key.key_len());
            assert_eq!(key.is_big(), big);
        }
    }

    #[test]
    fn decode_restores_header() {
        let mut key = Key::new("TBasket", "two", "simple tree", 19, false);
        key.set_sizes(40, key.key_len() + 40);
        key.set_seek_key(512);
        key.set_seek_pdir(100);
        key.set_cycle(3);

        let mut w = WBuffer::new();
        key.encode(&mut w).unwrap();
        let got = Key::decode(&mut RBuffer::new(w.bytes())).unwrap();

        assert_eq!(got.n_bytes(), key.key_len() + 40);
        assert_eq!(got.obj_len(), 40);
        assert!(!got.is_compressed());
        assert_eq!(got.seek_key(), 512);
        assert_eq!(got.seek_pdir(), 100);
        assert_eq!(got.cycle(), 3);
        assert_eq!(got.class(), "TBasket");
        assert_eq!(got.title(), "simple tree");
    }

    #[test]
    fn promotion_widens_seeks() {
        let mut key = Key::new("TBasket", "b", "t", 0, false);
        let len = key.key_len();
        key.promote_to_big();
        key.promote_to_big();
        assert_eq!(key.version(), 1004);
        assert_eq!(key.key_len(), len + 8);
    }

    #[test]
    fn datime_vectors() {
        let dt = NaiveDate::from_ymd_opt(2020, 3, 14)
            .unwrap()
            .and_hms_opt(15, 9, 26)
            .unwrap();
        let packed = datime_from(dt);
        assert_eq!(packed >> 26, 25);
        let mut key = Key::new("TBasket", "b", "t", 0, false);
        key.datime = packed;
        assert_eq!(key.datetime(), Some(dt));
    }
}
