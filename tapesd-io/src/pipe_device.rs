use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use tapesd_types::{DeviceCapability, DeviceMode};

use crate::device::{Device, DeviceError, DevicePosition, DeviceResult, SeekPos};

/// A named pipe, used for streaming to/from an external program. No
/// seeking, no file marks, no random access: every byte is part of a
/// single, unbounded append stream.
pub struct PipeDevice {
    path: PathBuf,
    file: Option<File>,
    blocks_written: u32,
    blocks_read: u32,
}

impl PipeDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PipeDevice {
            path: path.into(),
            file: None,
            blocks_written: 0,
            blocks_read: 0,
        }
    }

    fn file(&mut self) -> DeviceResult<&mut File> {
        self.file.as_mut().ok_or(DeviceError::NotOpen)
    }
}

impl Device for PipeDevice {
    fn open(&mut self, mode: DeviceMode) -> DeviceResult<()> {
        let mut opts = OpenOptions::new();
        match mode {
            DeviceMode::ReadOnly => {
                opts.read(true);
            }
            _ => {
                opts.write(true);
            }
        }
        self.file = Some(opts.open(&self.path)?);
        Ok(())
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.file = None;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> DeviceResult<usize> {
        let n = self.file()?.read(buf)?;
        if n == 0 {
            return Err(DeviceError::EndOfFile);
        }
        self.blocks_read += 1;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> DeviceResult<bool> {
        self.file()?.write_all(buf)?;
        self.blocks_written += 1;
        Ok(false)
    }

    fn seek(&mut self, _pos: SeekPos) -> DeviceResult<()> {
        Err(DeviceError::Unsupported)
    }

    fn forward_space_file(&mut self, _count: u32) -> DeviceResult<()> {
        Err(DeviceError::Unsupported)
    }

    fn backward_space_file(&mut self, _count: u32) -> DeviceResult<()> {
        Err(DeviceError::Unsupported)
    }

    fn forward_space_record(&mut self, _count: u32) -> DeviceResult<()> {
        Err(DeviceError::Unsupported)
    }

    fn backward_space_record(&mut self, _count: u32) -> DeviceResult<()> {
        Err(DeviceError::Unsupported)
    }

    fn write_end_of_file(&mut self, _count: u32) -> DeviceResult<()> {
        Ok(())
    }

    fn end_of_data(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    fn rewind(&mut self) -> DeviceResult<()> {
        Err(DeviceError::Unsupported)
    }

    fn load(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    fn offline(&mut self) -> DeviceResult<()> {
        self.close()
    }

    fn current_position(&mut self) -> DeviceResult<DevicePosition> {
        Ok(DevicePosition {
            file: 0,
            block: self.blocks_written.max(self.blocks_read),
            byte_offset: 0,
        })
    }

    fn has_capability(&self, cap: DeviceCapability) -> bool {
        self.capabilities().contains(cap)
    }

    fn capabilities(&self) -> DeviceCapability {
        DeviceCapability::STREAM
    }

    fn block_size_range(&self) -> (usize, usize) {
        (1024, crate::device::DEFAULT_MAX_BLOCK_SIZE)
    }
}
