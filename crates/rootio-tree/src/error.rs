use std::sync::Arc;

use thiserror::Error;

/// Errors raised while building, writing or reading trees.
///
/// The type is `Clone` so a scanner can keep its first failure around and
/// hand it back on every later call.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Bytes(#[from] rootio_bytes::Error),
    #[error(transparent)]
    File(Arc<rootio_file::Error>),

    #[error("branch {branch:?}: unknown basket version {got} (max={max})")]
    BasketVersion { branch: String, got: i16, max: i16 },
    #[error("branch {branch:?}: invalid basket key class {class:?}")]
    BasketClass { branch: String, class: String },
    #[error("branch {branch:?}: invalid basket: {reason}")]
    InvalidBasket { branch: String, reason: String },
    #[error("branch {branch:?}: compressed basket payloads are not supported (objlen={obj_len}, nbytes={n_bytes})")]
    Compressed {
        branch: String,
        obj_len: i32,
        n_bytes: i32,
    },
    #[error("branch {branch:?}: no basket holds entry {entry}")]
    NoBasket { branch: String, entry: i64 },

    #[error("invalid leaf {name:?}: {reason}")]
    InvalidLeaf { name: String, reason: String },
    #[error("leaf {leaf:?}: got a {got} value, want {want}")]
    ValueMismatch {
        leaf: String,
        got: String,
        want: String,
    },

    #[error("tree {tree:?} has no branch named {name:?}")]
    NoBranch { tree: String, name: String },
    #[error("tree {tree:?} has no leaf named {name:?}")]
    NoLeaf { tree: String, name: String },
    #[error("could not bind read-var {index} ({name:?}) to tree {tree:?}: {reason}")]
    Binding {
        index: usize,
        name: String,
        tree: String,
        reason: String,
    },
    #[error("could not declare write-var {index} ({name:?}): {reason}")]
    WriteBinding {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("invalid event reader range [{beg}, {end}) ({reason})")]
    Range { beg: i64, end: i64, reason: String },
    #[error("could not find tree containing entry {0}")]
    NoTreeForEntry(i64),
    #[error("cannot seek to entry {entry} (entries={entries})")]
    SeekRange { entry: i64, entries: i64 },
    #[error("no trees to join")]
    NoTreesToJoin,
    #[error("invalid number of entries in tree {tree} (got={got}, want={want})")]
    JoinEntries { tree: String, got: i64, want: i64 },
    #[error("trees {first} and {second} both have a branch named {branch}")]
    JoinCollision {
        first: String,
        second: String,
        branch: String,
    },
    #[error("cannot join chain {0:?}")]
    JoinChain(String),

    #[error("could not create scanner: {0}")]
    Scanner(Box<Error>),
    #[error("could not find all needed read-vars (missing: {})", .missing.join(", "))]
    FormulaMissing { missing: Vec<String> },
    #[error("could not process entry {entry}: {cause}")]
    Process {
        entry: i64,
        cause: Arc<dyn std::error::Error + Send + Sync>,
    },
    #[error("{0} is closed")]
    Closed(&'static str),
}

impl From<rootio_file::Error> for Error {
    fn from(err: rootio_file::Error) -> Self {
        Error::File(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
