/// Errors from the device lock / mount / reservation layers that the
/// record engine and CLI need to match on (§4.4–§4.6).
#[derive(thiserror::Error, Debug)]
pub enum TapeLockError {
    #[error("device is already reserved by another job in an incompatible mode")]
    Incompatible,
    #[error("device is busy (num_writers={writers}, num_reserved={reserved})")]
    Busy { writers: u32, reserved: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum MountError {
    #[error("no suitable device found for pool '{pool}' after {passes} passes")]
    NoDeviceAvailable { pool: String, passes: u32 },
    #[error("volume '{0}' is in use by another device")]
    VolumeInUse(String),
    #[error("device refused to open: {0}")]
    OpenFailed(#[from] anyhow::Error),
    #[error("label mismatch: drive holds '{found}', expected '{expected}'")]
    LabelMismatch { found: String, expected: String },
    #[error("no label found and auto-labeling is not permitted")]
    NoLabelNotAllowed,
    #[error("changer timed out waiting for a load")]
    ChangerTimeout,
}

#[derive(thiserror::Error, Debug)]
pub enum BlockReadError {
    #[error("device error: {0}")]
    Device(#[from] tapesd_io::DeviceError),
    #[error("block parse error: {0}")]
    Block(#[from] tapesd_block::ParseBlockError),
    #[error("end of medium, no successor volume available")]
    EndOfVolumes,
}

/// Errors from the append/write path (§4.2).
#[derive(thiserror::Error, Debug)]
pub enum AppendError {
    #[error("device error: {0}")]
    Device(#[from] tapesd_io::DeviceError),
    #[error("file_index {file_index} is out of sequence (previous was {previous}); job terminated as Incomplete")]
    OutOfSequence { previous: i32, file_index: i32 },
}

/// Maps a device/codec failure onto the §7 error taxonomy's terminal
/// job status: a checksum mismatch or short block is a warning-level
/// condition a job can still finish under, everything else is fatal.
pub fn classify_io_error(err: &BlockReadError) -> tapesd_types::JobStatus {
    match err {
        BlockReadError::Block(tapesd_block::ParseBlockError::ChecksumMismatch) => {
            tapesd_types::JobStatus::Warnings
        }
        BlockReadError::Device(tapesd_io::DeviceError::EndOfFile) => tapesd_types::JobStatus::Warnings,
        BlockReadError::EndOfVolumes => tapesd_types::JobStatus::Incomplete,
        _ => tapesd_types::JobStatus::FatalError,
    }
}
