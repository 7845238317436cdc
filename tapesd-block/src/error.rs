/// Result of validating a just-read block header (§4.1).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseBlockError {
    #[error("invalid block magic")]
    InvalidMagic,
    #[error("block sanity check failed (block_len {block_len} exceeds MAX_BLOCK_LENGTH)")]
    SanityFailed { block_len: u32 },
    #[error("block checksum mismatch")]
    ChecksumMismatch,
    #[error("buffer too small for block (need {required} bytes)")]
    BufferTooSmall { required: u32 },
    #[error("short read: only {got} bytes, need at least {need}")]
    TooShort { got: usize, need: usize },
}

/// Errors from the pure record (de)serialization primitives.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("record header truncated in block")]
    TruncatedHeader,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),
}
