use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiskError>;

/// Unified error type for Aeon disk/storage operations.
#[derive(Debug, Error)]
pub enum DiskError {
    #[error("unaligned buffer length {len} (expected multiple of {alignment})")]
    UnalignedLength { len: usize, alignment: usize },

    #[error("out of bounds: offset={offset} len={len} capacity={capacity}")]
    OutOfBounds {
        offset: u64,
        len: usize,
        capacity: u64,
    },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("disk is read-only")]
    ReadOnly,

    #[error("invalid disk image: {0}")]
    InvalidImage(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
