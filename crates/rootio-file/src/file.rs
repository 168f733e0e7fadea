use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{Error, Result, BEGIN, START_BIG_FILE};

/// Positional byte storage underneath a [`File`].
pub trait Backend {
    fn read_at(&mut self, buf: &mut [u8], pos: u64) -> io::Result<()>;
    fn write_at(&mut self, buf: &[u8], pos: u64) -> io::Result<()>;
    fn len(&mut self) -> io::Result<u64>;
}

/// Sparse in-memory storage.
///
/// Writes are kept as segments keyed by their start position, so a file can
/// be pushed past the big-file boundary without allocating the gap. Holes
/// read back as zeros.
#[derive(Debug, Default)]
pub struct MemBackend {
    segments: BTreeMap<u64, Vec<u8>>,
    len: u64,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemBackend {
    fn read_at(&mut self, buf: &mut [u8], pos: u64) -> io::Result<()> {
        let end = pos + buf.len() as u64;
        if end > self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read past end of file ({end} > {})", self.len),
            ));
        }
        buf.fill(0);
        for (&start, seg) in self.segments.range(..end) {
            let seg_end = start + seg.len() as u64;
            if seg_end <= pos {
                continue;
            }
            let lo = start.max(pos);
            let hi = seg_end.min(end);
            buf[(lo - pos) as usize..(hi - pos) as usize]
                .copy_from_slice(&seg[(lo - start) as usize..(hi - start) as usize]);
        }
        Ok(())
    }

    fn write_at(&mut self, buf: &[u8], pos: u64) -> io::Result<()> {
        let end = pos + buf.len() as u64;
        // Segments stay disjoint: everything the write overlaps or touches
        // is folded into one segment, newest bytes last.
        let touched: Vec<u64> = self
            .segments
            .range(..=end)
            .filter(|(start, seg)| **start + seg.len() as u64 >= pos)
            .map(|(&start, _)| start)
            .collect();
        let lo = touched.first().map_or(pos, |&start| start.min(pos));
        let mut merged = Vec::new();
        for start in touched {
            if let Some(seg) = self.segments.remove(&start) {
                let at = (start - lo) as usize;
                if merged.len() < at + seg.len() {
                    merged.resize(at + seg.len(), 0);
                }
                merged[at..at + seg.len()].copy_from_slice(&seg);
            }
        }
        let at = (pos - lo) as usize;
        if merged.len() < at + buf.len() {
            merged.resize(at + buf.len(), 0);
        }
        merged[at..at + buf.len()].copy_from_slice(buf);
        self.segments.insert(lo, merged);
        self.len = self.len.max(end);
        Ok(())
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.len)
    }
}

/// Storage on the local filesystem.
#[derive(Debug)]
pub struct FsBackend(fs::File);

impl FsBackend {
    pub fn new(file: fs::File) -> Self {
        Self(file)
    }
}

impl Backend for FsBackend {
    fn read_at(&mut self, buf: &mut [u8], pos: u64) -> io::Result<()> {
        self.0.seek(SeekFrom::Start(pos))?;
        self.0.read_exact(buf)
    }

    fn write_at(&mut self, buf: &[u8], pos: u64) -> io::Result<()> {
        self.0.seek(SeekFrom::Start(pos))?;
        self.0.write_all(buf)
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.0.metadata()?.len())
    }
}

/// File handle shared by every branch of the trees it stores.
///
/// Interior mutability lets readers and writers hold the handle behind an
/// `Rc` while still advancing the end-of-file marker.
pub struct File {
    backend: RefCell<Box<dyn Backend>>,
    end: Cell<i64>,
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File").field("end", &self.end.get()).finish()
    }
}

impl File {
    pub fn new(backend: Box<dyn Backend>, end: i64) -> Self {
        Self {
            backend: RefCell::new(backend),
            end: Cell::new(end),
        }
    }

    /// Empty in-memory file with the header region reserved.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemBackend::new()), BEGIN)
    }

    /// Creates (or truncates) a file on disk.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let f = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::new(Box::new(FsBackend::new(f)), BEGIN))
    }

    /// Opens an existing file for reading and appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let f = fs::OpenOptions::new().read(true).write(true).open(path)?;
        let mut backend = FsBackend::new(f);
        let end = (backend.len()? as i64).max(BEGIN);
        Ok(Self::new(Box::new(backend), end))
    }

    /// Position where the next key will be written.
    pub fn end(&self) -> i64 {
        self.end.get()
    }

    pub fn set_end(&self, end: i64) {
        self.end.set(end);
    }

    /// Claims `n` bytes at the end of the file and returns their seek.
    pub fn reserve(&self, n: i64) -> i64 {
        let seek = self.end.get();
        self.end.set(seek + n);
        seek
    }

    pub fn is_big_file(&self) -> bool {
        self.end.get() > START_BIG_FILE
    }

    pub fn write_at(&self, buf: &[u8], pos: i64) -> Result<usize> {
        let at = u64::try_from(pos).map_err(|_| Error::InvalidPosition(pos))?;
        self.backend.borrow_mut().write_at(buf, at)?;
        Ok(buf.len())
    }

    pub fn read_at(&self, buf: &mut [u8], pos: i64) -> Result<()> {
        let at = u64::try_from(pos).map_err(|_| Error::InvalidPosition(pos))?;
        self.backend.borrow_mut().read_at(buf, at)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sparse_segments_assemble_on_read() {
        let mut m = MemBackend::new();
        m.write_at(&[1, 2, 3], 10).unwrap();
        m.write_at(&[4, 5], 13).unwrap();
        m.write_at(&[9], 11).unwrap();

        let mut buf = [0xffu8; 7];
        m.read_at(&mut buf, 8).unwrap();
        assert_eq!(buf, [0, 0, 1, 9, 3, 4, 5]);
        assert_eq!(m.len().unwrap(), 15);

        let mut past = [0u8; 2];
        assert!(m.read_at(&mut past, 14).is_err());
    }

    #[test]
    fn newer_writes_win_over_later_segments() {
        let mut m = MemBackend::new();
        m.write_at(&[1, 1, 1], 20).unwrap();
        m.write_at(&[2, 2, 2], 40).unwrap();
        m.write_at(&[7, 7, 7, 7], 18).unwrap();
        m.write_at(&[8; 21], 19).unwrap();

        let mut buf = [0xffu8; 25];
        m.read_at(&mut buf, 18).unwrap();
        let mut want = [8u8; 25];
        want[0] = 7;
        want[22..].copy_from_slice(&[2, 2, 2]);
        assert_eq!(buf, want);
        assert_eq!(m.segments.len(), 1);
        assert_eq!(m.len().unwrap(), 43);
    }

    #[test]
    fn big_file_threshold_is_exclusive() {
        let f = File::in_memory();
        assert_eq!(f.end(), BEGIN);
        assert_eq!(f.reserve(20), BEGIN);
        assert_eq!(f.end(), BEGIN + 20);

        f.set_end(START_BIG_FILE);
        assert!(!f.is_big_file());
        f.set_end(START_BIG_FILE + 1);
        assert!(f.is_big_file());

        f.write_at(b"far", START_BIG_FILE + 1).unwrap();
        let mut buf = [0u8; 3];
        f.read_at(&mut buf, START_BIG_FILE + 1).unwrap();
        assert_eq!(&buf, b"far");
    }

    #[test]
    fn negative_positions_are_rejected() {
        let f = File::in_memory();
        assert!(matches!(
            f.write_at(&[0], -1),
            Err(Error::InvalidPosition(-1))
        ));
    }
}
