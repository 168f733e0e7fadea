//! Basket codec.
//!
//! A basket holds a contiguous run of entries of one branch. On disk it is a
//! storage key whose header is followed by the basket header:
//!
//! ```text
//! [key header][i16 version][i32 bufsize][i32 nevsize | -nevsize, iofeatures]
//! [i32 nevbuf][i32 last][u8 flag][offsets?][displacements?][raw payload?]
//! ```
//!
//! Baskets flushed by a writer are stored in *header-only* mode: the header
//! carries no table and the entry offsets trail the payload as
//! `[nevbuf+1][offsets...][0]` starting at `last`.
//!
//! Offsets are absolute basket positions: they count the key header, so
//! entry `i` starts at `offsets[i] - key_len` within the payload.

use std::rc::Rc;

use log::{debug, warn};
use rootio_bytes::{RBuffer, WBuffer};
use rootio_file::{File, Key};

use crate::leaf::Leaf;
use crate::value::Value;
use crate::{Error, Result};

/// Newest basket streamer version this codec understands.
pub const BASKET_VERSION: i16 = 3;

pub const BASKET_CLASS: &str = "TBasket";

/// Basket header bytes following the key header, feature bits excluded.
const HEADER_LEN: i32 = 2 + 4 + 4 + 4 + 4 + 1;

/// Legacy flags in `(20, 40)` stored displacement bits in the top byte of
/// each offset.
const DISPLACEMENT_MASK: i32 = 0xff00_0000_u32 as i32;

const IO_FEATURES_MAGIC: [u8; 4] = [0x1a, 0xa1, 0x2f, 0x10];

/// `TIOFeatures` bitmask stored after a negated `nevsize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IoFeatures(u8);

impl IoFeatures {
    pub const GENERATE_OFFSET_MAP: IoFeatures = IoFeatures(1);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: IoFeatures) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bytes the basket header spends on these features.
    fn header_len(self) -> i32 {
        if self.is_empty() {
            0
        } else {
            4 + 2 + IO_FEATURES_MAGIC.len() as i32 + 1
        }
    }

    pub fn encode(self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(1);
        if !self.is_empty() {
            w.write_bytes(&IO_FEATURES_MAGIC);
        }
        w.write_u8(self.0);
        w.set_byte_count(start, "TIOFeatures")?;
        Ok(())
    }

    pub fn decode(r: &mut RBuffer<'_>) -> Result<Self> {
        let vers = r.read_version()?;
        let bits = match r.read_u8()? {
            0 => 0,
            _ => {
                r.skip(IO_FEATURES_MAGIC.len() - 1)?;
                r.read_u8()?
            }
        };
        r.check_byte_count(&vers, "TIOFeatures")?;
        Ok(Self(bits))
    }
}

/// Sizing of a new write basket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasketLayout {
    /// Declared buffer size; the branch flushes once the payload reaches it.
    pub bufsize: i32,
    /// Bytes per entry for fixed-size branches, 0 otherwise. A basket
    /// with a variable stride records its initial offset-table capacity
    /// instead.
    pub nevsize: i32,
    /// Initial offset-table capacity; 0 keeps no table at all.
    pub entry_offset_len: i32,
    pub iobits: IoFeatures,
}

#[derive(Debug, Clone)]
pub struct Basket {
    key: Key,
    version: i16,
    bufsize: i32,
    nevsize: i32,
    nevbuf: i32,
    last: i32,
    header_only: bool,
    iobits: IoFeatures,
    offsets: Vec<i32>,
    displ: Vec<i32>,
    /// Set when the decoded header announced regenerable offsets.
    gen_offsets: bool,
    leaves: Rc<[Leaf]>,
    wbuf: Option<WBuffer>,
    /// Absolute position of the first byte of the key buffer.
    base: u32,
}

impl Basket {
    /// Empty write basket for branch `name` of tree `title`.
    ///
    /// # Panics
    ///
    /// Panics when the layout has neither a stride nor an offset table.
    pub fn new(name: &str, title: &str, leaves: Rc<[Leaf]>, layout: BasketLayout, big: bool) -> Self {
        assert!(
            layout.nevsize > 0 || layout.entry_offset_len > 0,
            "basket {name:?}: layout needs a stride or an offset table"
        );
        let nevsize = match layout.nevsize {
            0 => layout.entry_offset_len,
            n => n,
        };
        let extra = HEADER_LEN + layout.iobits.header_len();
        let key = Key::new(BASKET_CLASS, name, title, extra, big);
        let key_len = key.key_len() as u32;
        Self {
            key,
            version: BASKET_VERSION,
            bufsize: layout.bufsize,
            nevsize,
            nevbuf: 0,
            last: 0,
            header_only: false,
            iobits: layout.iobits,
            offsets: vec![0; layout.entry_offset_len.max(0) as usize],
            displ: Vec::new(),
            gen_offsets: false,
            leaves,
            wbuf: Some(WBuffer::with_capacity(key_len, layout.bufsize.max(0) as usize)),
            base: key_len,
        }
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn version(&self) -> i16 {
        self.version
    }

    pub fn bufsize(&self) -> i32 {
        self.bufsize
    }

    pub fn nevsize(&self) -> i32 {
        self.nevsize
    }

    pub fn nevbuf(&self) -> i32 {
        self.nevbuf
    }

    pub fn last(&self) -> i32 {
        self.last
    }

    pub fn is_header_only(&self) -> bool {
        self.header_only
    }

    pub fn io_features(&self) -> IoFeatures {
        self.iobits
    }

    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn displacement(&self) -> &[i32] {
        &self.displ
    }

    /// Installs a displacement table; entries past `nevbuf` are ignored.
    ///
    /// # Panics
    ///
    /// Panics if the table is shorter than the entries already buffered.
    pub fn set_displacement(&mut self, displ: Vec<i32>) {
        assert!(
            displ.len() >= self.nevbuf as usize,
            "basket {:?}: displacement table holds {} entries, want at least {}",
            self.key.name(),
            displ.len(),
            self.nevbuf
        );
        self.displ = displ;
    }

    /// Whether the decoded header announced offsets to regenerate.
    pub fn has_generated_offsets(&self) -> bool {
        self.gen_offsets
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    /// Absolute position where the next entry will be written.
    pub fn pos(&self) -> i64 {
        self.wbuf
            .as_ref()
            .map_or(i64::from(self.last), WBuffer::pos)
    }

    /// Bytes waiting in the write buffer.
    pub fn pending_len(&self) -> usize {
        self.wbuf.as_ref().map_or(0, WBuffer::len)
    }

    pub(crate) fn buffer_mut(&mut self) -> Result<&mut WBuffer> {
        let name = self.key.name().to_string();
        self.wbuf.as_mut().ok_or_else(|| Error::InvalidBasket {
            branch: name,
            reason: "basket was already written".into(),
        })
    }

    /// Entry payload bytes, without the key-header region.
    pub fn payload(&self) -> &[u8] {
        if let Some(w) = &self.wbuf {
            return w.bytes();
        }
        let buf = self.key.buffer();
        let skip = (self.key.key_len() as u32).saturating_sub(self.base) as usize;
        &buf[skip.min(buf.len())..]
    }

    pub fn can_generate_offset_array(&self) -> bool {
        matches!(&self.leaves[..], [leaf] if leaf.can_generate_offset_array())
    }

    /// True when the offset table is cheap to recompute and must not be
    /// persisted.
    pub fn must_gen_offsets(&self) -> bool {
        !self.offsets.is_empty() && self.nevbuf > 0 && self.can_generate_offset_array()
    }

    /// Records one more entry starting at absolute position `offset`.
    pub fn update(&mut self, offset: i32) {
        if !self.offsets.is_empty() {
            let n = self.nevbuf as usize;
            if n + 1 >= self.offsets.len() {
                let grown = (2 * self.offsets.len()).max(10);
                self.offsets.resize(grown, 0);
            }
            self.offsets[n] = offset;
        }
        self.nevbuf += 1;
    }

    /// Builds the offset table from the single leaf's per-entry `counts`
    /// when none is present.
    ///
    /// # Panics
    ///
    /// Panics unless the basket carries exactly one leaf.
    pub fn compute_entry_offsets(&mut self, counts: &[i64]) {
        if !self.offsets.is_empty() {
            return;
        }
        let [leaf] = &self.leaves[..] else {
            panic!(
                "basket {:?}: cannot compute entry offsets with {} leaves",
                self.key.name(),
                self.leaves.len()
            );
        };
        self.offsets = leaf.compute_offset_array(self.key.key_len(), self.nevbuf as usize, counts);
    }

    /// Fixes `last` at the end of the pending payload.
    pub(crate) fn seal_last(&mut self) {
        self.last = self.key.key_len() + self.pending_len() as i32;
    }

    #[cfg(test)]
    pub(crate) fn key_mut(&mut self) -> &mut Key {
        &mut self.key
    }

    /// Raw section of a full-payload encoding: exactly `last` bytes, the key
    /// region zero-filled.
    fn raw_region(&self) -> Vec<u8> {
        let last = self.last.max(0) as usize;
        let mut raw = vec![0u8; last];
        let (data, base) = match &self.wbuf {
            Some(w) => (w.bytes(), w.offset() as usize),
            None => (self.key.buffer(), self.base as usize),
        };
        if base < last {
            let n = data.len().min(last - base);
            raw[base..base + n].copy_from_slice(&data[..n]);
        }
        raw
    }

    /// Serializes key header, basket header and, unless header-only, tables
    /// and payload. Returns the number of bytes written.
    ///
    /// # Panics
    ///
    /// Panics if offsets are regenerable while a displacement table is set.
    pub fn encode(&self, w: &mut WBuffer) -> Result<usize> {
        let start = w.len();
        self.key.encode(w)?;
        w.write_i16(self.version);
        w.write_i32(self.bufsize);
        if self.iobits.is_empty() {
            w.write_i32(self.nevsize);
        } else {
            w.write_i32(-self.nevsize);
            self.iobits.encode(w)?;
        }
        w.write_i32(self.nevbuf);
        w.write_i32(self.last);

        let must_gen = self.must_gen_offsets();
        if must_gen && !self.displ.is_empty() {
            panic!(
                "basket {:?}: regenerable offsets cannot carry a displacement table",
                self.key.name()
            );
        }

        if self.header_only {
            w.write_u8(if must_gen { 80 } else { 0 });
            return Ok(w.len() - start);
        }

        let mut flag: u8 = if self.nevbuf > 0 && !self.offsets.is_empty() { 1 } else { 2 };
        if self.wbuf.is_some() {
            flag += 10;
        }
        if !self.displ.is_empty() {
            flag += 40;
        }
        let payload_flag = flag;
        if must_gen {
            flag += 80;
        }
        w.write_u8(flag);

        if !must_gen && !self.offsets.is_empty() && self.nevbuf > 0 {
            let n = self.nevbuf as usize;
            w.write_i32(self.nevbuf);
            w.write_fast_array_i32(&self.offsets[..n]);
            if !self.displ.is_empty() {
                assert!(
                    self.displ.len() >= n,
                    "basket {:?}: displacement table holds {} entries, want at least {n}",
                    self.key.name(),
                    self.displ.len()
                );
                w.write_i32(self.nevbuf);
                w.write_fast_array_i32(&self.displ[..n]);
            }
        }

        if payload_flag == 1 || payload_flag > 10 {
            if self.version <= 1 {
                w.write_i32(self.last);
            }
            w.write_bytes(&self.raw_region());
        }
        Ok(w.len() - start)
    }

    /// Decodes a basket record.
    ///
    /// # Panics
    ///
    /// Panics if the header announces regenerable offsets together with a
    /// displacement table.
    pub fn decode(r: &mut RBuffer<'_>, leaves: Rc<[Leaf]>) -> Result<Self> {
        let key = Key::decode(r)?;
        let branch = key.name().to_string();
        if key.class() != BASKET_CLASS {
            return Err(Error::BasketClass {
                branch,
                class: key.class().to_string(),
            });
        }

        let version = r.read_i16()?;
        if version > BASKET_VERSION {
            return Err(Error::BasketVersion {
                branch,
                got: version,
                max: BASKET_VERSION,
            });
        }
        let mut bufsize = r.read_i32()?;
        let mut nevsize = r.read_i32()?;
        let mut iobits = IoFeatures::empty();
        if nevsize < 0 {
            nevsize = -nevsize;
            iobits = IoFeatures::decode(r)?;
        }
        let nevbuf = r.read_i32()?;
        let last = r.read_i32()?;
        let mut flag = r.read_u8()?;
        if last > bufsize {
            warn!("basket {branch:?}: last={last} exceeds bufsize={bufsize}, clamping");
            bufsize = last;
        }

        let gen_offsets = flag >= 80;
        if gen_offsets {
            flag -= 80;
        }

        let table_len = |n: i32| {
            usize::try_from(n).map_err(|_| Error::InvalidBasket {
                branch: branch.clone(),
                reason: format!("negative table length {n}"),
            })
        };

        let mut offsets = Vec::new();
        let mut displ = Vec::new();
        if !gen_offsets && flag != 0 && flag % 10 != 2 {
            if nevbuf > 0 {
                let n = table_len(r.read_i32()?)?;
                offsets = r.read_fast_array_i32(n)?;
                if 20 < flag && flag < 40 {
                    warn!("basket {branch:?}: clearing legacy displacement bits (flag={flag})");
                    for o in &mut offsets {
                        *o &= !DISPLACEMENT_MASK;
                    }
                }
            }
            if flag > 40 {
                let n = table_len(r.read_i32()?)?;
                displ = r.read_fast_array_i32(n)?;
            }
        }
        if gen_offsets && flag > 40 {
            panic!("basket {branch:?}: regenerable offsets cannot carry a displacement table");
        }

        let mut key = key;
        let mut base = key.key_len() as u32;
        if flag == 1 || flag > 10 {
            let n = if version <= 1 { r.read_i32()? } else { last };
            let raw = r.read_bytes(table_len(n)?)?;
            key.set_buffer(raw.to_vec());
            base = 0;
        }

        Ok(Self {
            key,
            version,
            bufsize,
            nevsize,
            nevbuf,
            last,
            header_only: flag == 0,
            iobits,
            offsets,
            displ,
            gen_offsets,
            leaves,
            wbuf: None,
            base,
        })
    }

    /// Installs the payload read from disk after a header-only record and
    /// picks up the trailing offset table when one follows `last`.
    pub fn attach_payload(&mut self, payload: Vec<u8>) -> Result<()> {
        let key_len = self.key.key_len();
        let trailer_at = (self.last - key_len).max(0) as usize;
        if self.offsets.is_empty() && payload.len() >= trailer_at + 4 {
            let mut r = RBuffer::with_offset(&payload, key_len as u32);
            r.set_pos(i64::from(self.last))?;
            let n = r.read_i32()?;
            let n = usize::try_from(n).map_err(|_| Error::InvalidBasket {
                branch: self.key.name().to_string(),
                reason: format!("negative offset trailer length {n}"),
            })?;
            self.offsets = r.read_fast_array_i32(n)?;
        }
        self.key.set_buffer(payload);
        self.base = key_len as u32;
        Ok(())
    }

    /// Decodes `leaf` for the basket-local `entry`.
    pub fn read_leaf(&self, entry: i64, leaf: &Leaf, count: Option<i64>) -> Result<Value> {
        let pos = if self.offsets.is_empty() {
            entry * i64::from(self.nevsize) + leaf.offset() + i64::from(self.key.key_len())
        } else {
            let off = usize::try_from(entry)
                .ok()
                .and_then(|i| self.offsets.get(i))
                .ok_or_else(|| Error::InvalidBasket {
                    branch: self.key.name().to_string(),
                    reason: format!(
                        "entry {entry} outside offset table of {} entries",
                        self.offsets.len()
                    ),
                })?;
            i64::from(*off) + leaf.offset()
        };
        let mut r = RBuffer::with_offset(self.key.buffer(), self.base);
        r.set_pos(pos)?;
        leaf.read_value(&mut r, count)
    }

    /// Flushes the basket to `file` as a header-only record followed by its
    /// payload and offset trailer. Returns `(total, zipped)` byte counts.
    ///
    /// The pending buffer is consumed; the basket can no longer be written.
    pub fn write_file(&mut self, file: &File) -> Result<(i64, i64)> {
        self.seal_last();
        let mut wbuf = self.wbuf.take().ok_or_else(|| Error::InvalidBasket {
            branch: self.key.name().to_string(),
            reason: "basket was already written".into(),
        })?;

        let n = self.nevbuf as usize;
        if !self.key.is_big() && file.is_big_file() {
            self.key.promote_to_big();
            for o in self.offsets.iter_mut().take(n) {
                *o += 8;
            }
            self.last += 8;
        }

        if !self.offsets.is_empty() {
            wbuf.write_i32(self.nevbuf + 1);
            wbuf.write_fast_array_i32(&self.offsets[..n]);
            wbuf.write_i32(0);
        }

        let payload = wbuf.into_bytes();
        let key_len = self.key.key_len();
        let n_bytes = key_len + payload.len() as i32;
        self.key.set_sizes(payload.len() as i32, n_bytes);
        let seek = file.reserve(i64::from(n_bytes));
        self.key.set_seek_key(seek);
        self.header_only = true;

        let mut hdr = WBuffer::with_capacity(0, key_len as usize);
        self.encode(&mut hdr)?;
        file.write_at(hdr.bytes(), seek)?;
        file.write_at(&payload, seek + i64::from(key_len))?;

        debug!(
            "basket {:?}: flushed {} entries ({} bytes) at seek {}",
            self.key.name(),
            self.nevbuf,
            n_bytes,
            seek
        );

        self.key.set_buffer(Vec::new());
        Ok((i64::from(n_bytes), i64::from(n_bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;
    use crate::value::{ElemKind, Elems};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rootio_file::START_BIG_FILE;

    fn leaves(leaf: Leaf) -> Rc<[Leaf]> {
        Rc::from(vec![leaf])
    }

    fn layout(nevsize: i32, entry_offset_len: i32) -> BasketLayout {
        BasketLayout {
            bufsize: 32000,
            nevsize,
            entry_offset_len,
            iobits: IoFeatures::empty(),
        }
    }

    fn fill(b: &mut Basket, values: &[Value]) {
        let leaf = b.leaves()[0].clone();
        for v in values {
            let start = b.pos() as i32;
            leaf.write_value(b.buffer_mut().unwrap(), v).unwrap();
            b.update(start);
        }
    }

    fn strings(words: &[&str]) -> Vec<Value> {
        words.iter().map(|w| Value::from(*w)).collect()
    }

    fn string_basket(words: &[&str]) -> Basket {
        let leaf = Leaf::new("three", ElemKind::Str, Shape::Scalar).unwrap();
        let mut b = Basket::new("three", "tree", leaves(leaf), layout(0, 1000), false);
        fill(&mut b, &strings(words));
        b.seal_last();
        b
    }

    fn slice_basket(counts: &[i64]) -> Basket {
        let leaf = Leaf::from_title("SliF64[N]", ElemKind::F64).unwrap();
        let mut b = Basket::new("SliF64", "tree", leaves(leaf), layout(0, 1000), false);
        let values: Vec<Value> = counts
            .iter()
            .map(|&n| Value::Slice(Elems::from(vec![1.5f64; n as usize])))
            .collect();
        fill(&mut b, &values);
        b.seal_last();
        b
    }

    fn encoded(b: &Basket) -> Vec<u8> {
        let mut w = WBuffer::new();
        let n = b.encode(&mut w).unwrap();
        assert_eq!(n, w.len());
        w.into_bytes()
    }

    fn flag_at(b: &Basket, bytes: &[u8]) -> u8 {
        bytes[b.key().key_len() as usize - 1]
    }

    #[test]
    fn key_len_covers_basket_header() {
        let b = string_basket(&[]);
        let mut sealed = b.clone();
        sealed.header_only = true;
        assert_eq!(encoded(&sealed).len() as i32, b.key().key_len());

        let leaf = Leaf::new("x", ElemKind::I32, Shape::Scalar).unwrap();
        let mut with_bits = Basket::new(
            "x",
            "tree",
            leaves(leaf),
            BasketLayout {
                iobits: IoFeatures::GENERATE_OFFSET_MAP,
                ..layout(4, 0)
            },
            false,
        );
        with_bits.header_only = true;
        assert_eq!(encoded(&with_bits).len() as i32, with_bits.key().key_len());
    }

    #[test]
    fn offset_table_grows_geometrically() {
        let leaf = Leaf::new("three", ElemKind::Str, Shape::Scalar).unwrap();
        let mut b = Basket::new("three", "tree", leaves(leaf), layout(0, 4), false);
        let caps: Vec<usize> = (0..12)
            .map(|i| {
                b.update(i * 3);
                b.offsets().len()
            })
            .collect();
        assert_eq!(caps, vec![4, 4, 4, 10, 10, 10, 10, 10, 10, 20, 20, 20]);
        assert_eq!(b.nevbuf(), 12);
        assert_eq!(&b.offsets()[..3], &[0, 3, 6]);

        let fixed = Leaf::new("one", ElemKind::I32, Shape::Scalar).unwrap();
        let mut b = Basket::new("one", "tree", leaves(fixed), layout(4, 0), false);
        b.update(0);
        b.update(4);
        assert!(b.offsets().is_empty());
        assert_eq!(b.nevbuf(), 2);
    }

    #[test]
    fn full_payload_roundtrip_with_explicit_offsets() {
        let b = string_basket(&["uno", "dos", "tres"]);
        let bytes = encoded(&b);
        assert_eq!(flag_at(&b, &bytes), 11);

        let got = Basket::decode(&mut RBuffer::new(&bytes), b.leaves.clone()).unwrap();
        assert_eq!(got.nevbuf(), 3);
        assert_eq!(got.last(), b.last());
        assert_eq!(got.bufsize(), 32000);
        assert_eq!(got.offsets(), &b.offsets()[..3]);
        assert_eq!(got.payload(), b.payload());
        assert!(!got.is_header_only());
        assert!(!got.has_generated_offsets());

        let leaf = &b.leaves()[0];
        let words: Vec<Value> = (0..3).map(|i| got.read_leaf(i, leaf, None).unwrap()).collect();
        assert_eq!(words, strings(&["uno", "dos", "tres"]));
    }

    #[test]
    fn generated_offsets_are_not_persisted() {
        let counts = [2, 0, 3, 1];
        let b = slice_basket(&counts);
        assert!(b.must_gen_offsets());
        let bytes = encoded(&b);
        assert_eq!(flag_at(&b, &bytes), 91);

        let mut got = Basket::decode(&mut RBuffer::new(&bytes), b.leaves.clone()).unwrap();
        assert!(got.has_generated_offsets());
        assert!(got.offsets().is_empty());
        got.compute_entry_offsets(&counts);
        assert_eq!(got.offsets(), &b.offsets()[..4]);

        let leaf = &b.leaves()[0];
        assert_eq!(
            got.read_leaf(2, leaf, Some(3)).unwrap(),
            Value::Slice(Elems::from(vec![1.5f64; 3]))
        );
    }

    #[test]
    #[should_panic(expected = "cannot compute entry offsets with 2 leaves")]
    fn offsets_need_a_single_leaf() {
        let a = Leaf::new("a", ElemKind::I32, Shape::Scalar).unwrap();
        let b = Leaf::new("b", ElemKind::I32, Shape::Scalar).unwrap().with_offset(4);
        let mut basket = Basket::new("ab", "tree", Rc::from(vec![a, b]), layout(8, 0), false);
        basket.update(0);
        basket.compute_entry_offsets(&[]);
    }

    #[test]
    #[should_panic(expected = "regenerable offsets cannot carry a displacement table")]
    fn regenerable_offsets_with_displacement_do_not_encode() {
        let mut b = slice_basket(&[1, 2]);
        b.set_displacement(vec![0, 0]);
        encoded(&b);
    }

    #[test]
    #[should_panic(expected = "regenerable offsets cannot carry a displacement table")]
    fn regenerable_offsets_with_displacement_do_not_decode() {
        let mut b = string_basket(&["a", "b"]);
        b.set_displacement(vec![7, 9]);
        let mut bytes = encoded(&b);
        let at = b.key().key_len() as usize - 1;
        assert_eq!(bytes[at], 51);
        bytes[at] += 80;
        let _ = Basket::decode(&mut RBuffer::new(&bytes), b.leaves.clone());
    }

    #[test]
    fn displacement_table_roundtrips() {
        let mut b = string_basket(&["a", "b"]);
        b.set_displacement(vec![7, 9, 11]);
        let bytes = encoded(&b);
        // [nevbuf][2 offsets][nevbuf][2 displacements]
        let at = b.key().key_len() as usize + 4 + 2 * 4;
        assert_eq!(&bytes[at..at + 4], &2i32.to_be_bytes());
        let got = Basket::decode(&mut RBuffer::new(&bytes), b.leaves.clone()).unwrap();
        assert_eq!(got.displacement(), &[7, 9]);
        assert_eq!(got.offsets(), &b.offsets()[..2]);
    }

    #[test]
    fn legacy_flags_clear_displacement_bits() {
        let mut b = string_basket(&["a", "b"]);
        b.wbuf = None;
        b.key.set_buffer(vec![0; 64]);
        b.offsets[1] |= 0x0100_0000;
        let mut bytes = encoded(&b);
        let at = b.key().key_len() as usize - 1;
        assert_eq!(bytes[at], 1);
        bytes[at] = 21;
        let got = Basket::decode(&mut RBuffer::new(&bytes), b.leaves.clone()).unwrap();
        assert_eq!(got.offsets()[1], b.offsets()[1] & 0x00ff_ffff);
    }

    #[test]
    fn future_versions_are_rejected() {
        let mut b = string_basket(&["a"]);
        b.version = BASKET_VERSION + 1;
        let err = Basket::decode(&mut RBuffer::new(&encoded(&b)), b.leaves.clone()).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"branch "three": unknown basket version 4 (max=3)"#
        );
    }

    #[test]
    fn negated_stride_carries_io_features() {
        let leaf = Leaf::new("one", ElemKind::I32, Shape::Scalar).unwrap();
        let mut b = Basket::new(
            "one",
            "tree",
            leaves(leaf),
            BasketLayout {
                iobits: IoFeatures::GENERATE_OFFSET_MAP,
                ..layout(4, 0)
            },
            false,
        );
        fill(&mut b, &[Value::I32(7), Value::I32(8)]);
        b.seal_last();
        let got = Basket::decode(&mut RBuffer::new(&encoded(&b)), b.leaves.clone()).unwrap();
        assert_eq!(got.nevsize(), 4);
        assert!(got.io_features().contains(IoFeatures::GENERATE_OFFSET_MAP));
        assert_eq!(got.read_leaf(1, &b.leaves()[0], None).unwrap(), Value::I32(8));
    }

    #[test]
    fn variable_stride_keeps_io_features_readable() {
        let words = ["uno", "dos", "tres", "quatro", "cinco"];
        let leaf = Leaf::new("three", ElemKind::Str, Shape::Scalar).unwrap();
        let mut b = Basket::new(
            "three",
            "tree",
            leaves(leaf),
            BasketLayout {
                iobits: IoFeatures::GENERATE_OFFSET_MAP,
                ..layout(0, 4)
            },
            false,
        );
        assert_eq!(b.nevsize(), 4);
        fill(&mut b, &strings(&words));
        b.seal_last();

        let got = Basket::decode(&mut RBuffer::new(&encoded(&b)), b.leaves.clone()).unwrap();
        assert_eq!(got.nevsize(), 4);
        assert_eq!(got.nevbuf(), 5);
        assert!(got.io_features().contains(IoFeatures::GENERATE_OFFSET_MAP));
        let leaf = &b.leaves()[0];
        for (i, word) in words.iter().enumerate() {
            assert_eq!(got.read_leaf(i as i64, leaf, None).unwrap(), Value::from(*word));
        }
    }

    #[test]
    #[should_panic(expected = "layout needs a stride or an offset table")]
    fn layouts_without_stride_or_offsets_are_rejected() {
        let leaf = Leaf::new("three", ElemKind::Str, Shape::Scalar).unwrap();
        Basket::new("three", "tree", leaves(leaf), layout(0, 0), false);
    }

    #[test]
    #[should_panic(expected = "displacement table holds 1 entries, want at least 2")]
    fn short_displacement_tables_are_rejected() {
        let mut b = string_basket(&["a", "b"]);
        b.set_displacement(vec![7]);
    }

    #[test]
    fn last_is_clamped_to_bufsize() {
        let mut b = string_basket(&["abc"]);
        b.bufsize = 1;
        let got = Basket::decode(&mut RBuffer::new(&encoded(&b)), b.leaves.clone()).unwrap();
        assert_eq!(got.bufsize(), got.last());
    }

    fn reload(file: &File, b: &Basket) -> Basket {
        let n = b.key().n_bytes() as usize;
        let mut buf = vec![0u8; n];
        file.read_at(&mut buf, b.key().seek_key()).unwrap();
        let mut got = Basket::decode(&mut RBuffer::new(&buf), b.leaves.clone()).unwrap();
        assert_eq!(got.key().key_len(), b.key().key_len());
        got.attach_payload(buf[b.key().key_len() as usize..].to_vec())
            .unwrap();
        got
    }

    #[test]
    fn write_file_stores_header_then_payload_and_trailer() {
        let file = File::in_memory();
        let mut b = string_basket(&["uno", "dos"]);
        let offsets = b.offsets()[..2].to_vec();
        let (tot, zip) = b.write_file(&file).unwrap();
        assert_eq!(tot, i64::from(b.key().n_bytes()));
        assert_eq!(zip, tot);
        assert!(b.is_header_only());
        assert!(b.payload().is_empty());
        assert!(b.write_file(&file).is_err());
        assert_eq!(file.end(), rootio_file::BEGIN + tot);

        let got = reload(&file, &b);
        assert!(got.is_header_only());
        assert_eq!(got.offsets(), &[offsets[0], offsets[1], 0]);
        let leaf = &b.leaves()[0];
        assert_eq!(got.read_leaf(1, leaf, None).unwrap(), Value::from("dos"));
    }

    #[test]
    fn big_files_shift_offsets_by_eight() {
        let file = File::in_memory();
        let mut b = string_basket(&["uno", "dos"]);
        let before = b.offsets()[..2].to_vec();
        let key_len = b.key().key_len();
        file.set_end(START_BIG_FILE + 1);

        b.write_file(&file).unwrap();
        assert!(b.key().is_big());
        assert_eq!(b.key().key_len(), key_len + 8);
        assert_eq!(&b.offsets()[..2], &[before[0] + 8, before[1] + 8]);

        let got = reload(&file, &b);
        let leaf = &b.leaves()[0];
        assert_eq!(got.read_leaf(0, leaf, None).unwrap(), Value::from("uno"));
        assert_eq!(got.read_leaf(1, leaf, None).unwrap(), Value::from("dos"));
    }

    #[test]
    fn header_only_slices_reload_offsets_from_trailer() {
        let file = File::in_memory();
        let mut b = slice_basket(&[1, 3]);
        b.write_file(&file).unwrap();

        let mut hdr = WBuffer::new();
        b.encode(&mut hdr).unwrap();
        assert_eq!(flag_at(&b, hdr.bytes()), 80);

        let got = reload(&file, &b);
        assert!(got.has_generated_offsets());
        assert_eq!(got.offsets().len(), 3);
        assert_eq!(
            got.read_leaf(1, &b.leaves()[0], Some(3)).unwrap(),
            Value::Slice(Elems::from(vec![1.5f64; 3]))
        );
    }

    proptest! {
        #[test]
        fn explicit_offsets_roundtrip(words in proptest::collection::vec("[a-z]{0,12}", 1..40)) {
            let words: Vec<&str> = words.iter().map(String::as_str).collect();
            let b = string_basket(&words);
            let got = Basket::decode(&mut RBuffer::new(&encoded(&b)), b.leaves.clone()).unwrap();
            prop_assert_eq!(got.version(), b.version());
            prop_assert_eq!(got.bufsize(), b.bufsize());
            prop_assert_eq!(got.nevsize(), b.nevsize());
            prop_assert_eq!(got.nevbuf(), b.nevbuf());
            prop_assert_eq!(got.last(), b.last());
            prop_assert_eq!(got.offsets(), &b.offsets()[..words.len()]);
            prop_assert_eq!(got.payload(), b.payload());
        }

        #[test]
        fn regenerated_offsets_match(counts in proptest::collection::vec(0i64..20, 1..40)) {
            let b = slice_basket(&counts);
            let mut got = Basket::decode(&mut RBuffer::new(&encoded(&b)), b.leaves.clone()).unwrap();
            prop_assert!(got.offsets().is_empty());
            got.compute_entry_offsets(&counts);
            prop_assert_eq!(got.offsets(), &b.offsets()[..counts.len()]);
        }
    }
}
