use tapesd_types::{DeviceCapability, DeviceMode};

/// Default upper bound on block size for backends with no hard media
/// limit of their own (file, pipe, virtual tape).
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1024 * 1024;

/// Errors surfaced by a `Device` implementation. Kept as a closed,
/// matchable set so the record/reservation engines can react to
/// specific conditions (end of medium, short write) rather than
/// treating every failure the same way.
#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("end of medium (no space left)")]
    EndOfMedium,
    #[error("end of file mark encountered")]
    EndOfFile,
    #[error("device is not open")]
    NotOpen,
    #[error("operation not supported by this device")]
    Unsupported,
    #[error("device position is inconsistent with the OS-reported position")]
    PositionMismatch,
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// `seek`'s addressing mode (§4.4): file-backed devices synthesize
/// `(file, block)` from a flat byte offset, so the absolute address
/// used there is `(file << 32) | block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPos {
    FileBlock { file: u32, block: u32 },
    End,
}

/// Mirrors the device's notion of where it currently sits, kept by
/// the caller in sync with whatever the backend actually reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevicePosition {
    pub file: u32,
    pub block: u32,
    /// Flat byte offset, only meaningful for file-backed devices;
    /// real tape drives leave this at zero.
    pub byte_offset: u64,
}

/// The "insanity check" from §4.4: after any operation that moves the
/// tape, the caller's tracked position and what the backend itself
/// reports must agree, or something moved the media out from under us
/// (another process holding the drive, a miscounted filemark).
pub fn reconcile_os_position(tracked: DevicePosition, reported: DevicePosition) -> DeviceResult<DevicePosition> {
    if tracked.file == reported.file && tracked.block == reported.block {
        Ok(reported)
    } else {
        Err(DeviceError::PositionMismatch)
    }
}

/// Uniform operation set implemented by every backend (§4.4). `open`
/// may be deferred by a backend until the first real read/write.
pub trait Device: Send {
    fn open(&mut self, mode: DeviceMode) -> DeviceResult<()>;
    fn close(&mut self) -> DeviceResult<()>;

    /// Reads one block's worth of bytes into `buf`, returning how
    /// many bytes were actually filled. `Ok(0)` signals a filemark
    /// (logical EOF within the volume), not end of medium.
    fn read(&mut self, buf: &mut [u8]) -> DeviceResult<usize>;

    /// Writes `buf` as one block. `Ok(true)` signals that the device
    /// is at or past its logical end of medium warning; the caller
    /// must terminate the volume after this write.
    fn write(&mut self, buf: &[u8]) -> DeviceResult<bool>;

    fn seek(&mut self, pos: SeekPos) -> DeviceResult<()>;

    fn forward_space_file(&mut self, count: u32) -> DeviceResult<()>;
    fn backward_space_file(&mut self, count: u32) -> DeviceResult<()>;
    fn forward_space_record(&mut self, count: u32) -> DeviceResult<()>;
    fn backward_space_record(&mut self, count: u32) -> DeviceResult<()>;

    fn write_end_of_file(&mut self, count: u32) -> DeviceResult<()>;
    fn end_of_data(&mut self) -> DeviceResult<()>;
    fn rewind(&mut self) -> DeviceResult<()>;

    /// Mounts media into the drive (autochanger-backed devices) or is
    /// a no-op for devices that are always "loaded".
    fn load(&mut self) -> DeviceResult<()>;
    fn offline(&mut self) -> DeviceResult<()>;

    /// Reconciles the device's own position mirror against what the
    /// OS/backend actually reports, per the "insanity check" in §4.4.
    fn current_position(&mut self) -> DeviceResult<DevicePosition>;

    fn has_capability(&self, cap: DeviceCapability) -> bool;
    fn capabilities(&self) -> DeviceCapability;

    /// Minimum and maximum block size this backend will accept, used
    /// by the record engine's auto-sizing (§4.3).
    fn block_size_range(&self) -> (usize, usize);
}
