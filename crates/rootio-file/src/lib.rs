//! Storage collaborators for ROOT trees.
//!
//! The tree engine never looks at directories or object lookup; it needs
//! exactly three things from storage:
//!
//! - [`Key`]: the record header written in front of every basket,
//! - [`File`]: positional reads/writes plus the end-of-file marker that
//!   decides whether seek pointers are 32 or 64 bits wide,
//! - [`Compression`]: the algorithm/level tag stamped on branches.

mod compression;
mod error;
mod file;
mod key;

pub use compression::{Algorithm, Compression};
pub use error::{Error, Result};
pub use file::{Backend, File, FsBackend, MemBackend};
pub use key::{datime_from, datime_now, Key};

/// Files whose end grows past this many bytes switch to 64-bit key seeks.
pub const START_BIG_FILE: i64 = 2_000_000_000;

/// Bytes reserved for the file header before the first key.
pub const BEGIN: i64 = 100;
