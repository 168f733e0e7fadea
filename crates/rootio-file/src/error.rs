use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Bytes(#[from] rootio_bytes::Error),
    #[error("invalid file position {0}")]
    InvalidPosition(i64),
}

pub type Result<T> = std::result::Result<T, Error>;
