use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unexpected end of buffer (pos={pos}, want={want} bytes, len={len})")]
    UnexpectedEof { pos: i64, want: usize, len: usize },
    #[error("invalid buffer position {pos} (base={base}, len={len})")]
    InvalidPosition { pos: i64, base: u32, len: usize },
    #[error("invalid UTF-8 in string at pos {0}")]
    InvalidUtf8(i64),
    #[error("byte count mismatch for {class}: got={got}, want={want}")]
    ByteCountMismatch { class: String, got: i64, want: i64 },
    #[error("byte count overflow for {class}: {len} bytes")]
    ByteCountOverflow { class: String, len: i64 },
    #[error("length {0} does not fit the ROOT wire format")]
    LengthOverflow(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
