//! Big-endian byte buffers for the ROOT on-disk format.
//!
//! ROOT serializes every header, key and basket payload in network byte
//! order. This crate provides the two cursors the rest of the workspace is
//! built on:
//!
//! - [`RBuffer`]: a checked read cursor over a borrowed slice.
//! - [`WBuffer`]: a growable write cursor.
//!
//! Both cursors carry a position *base* (`offset`). A basket payload loaded
//! from disk starts right after its key header, yet the offsets recorded in
//! the basket are absolute (they include the key length). Setting the base to
//! the key length lets callers seek with absolute positions directly.

mod error;
mod rbuffer;
mod wbuffer;

pub use error::{Error, Result};
pub use rbuffer::{RBuffer, Version};
pub use wbuffer::WBuffer;

/// Marks a 32-bit word as a byte count rather than a version/class tag.
pub const BYTE_COUNT_MASK: u32 = 0x4000_0000;

/// Length byte announcing that a ROOT string length follows as a `u32`.
pub const LONG_STRING_MARKER: u8 = 255;

/// Number of bytes [`WBuffer::write_string`] emits for `s`.
pub fn string_size(s: &str) -> usize {
    let n = s.len();
    if n < LONG_STRING_MARKER as usize {
        1 + n
    } else {
        5 + n
    }
}
