use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use tapesd_types::{DeviceCapability, DeviceMode};

use crate::device::{Device, DeviceError, DevicePosition, DeviceResult, SeekPos};

/// A regular file made to behave like a tape: filemarks are encoded
/// as zero-length reads, and `seek` synthesizes the `(file, block)`
/// position model from a flat byte offset (§4.4). Used for disk-based
/// "virtual media" and for tests.
pub struct FileDevice {
    path: PathBuf,
    file: Option<File>,
    max_size: Option<u64>,
    current_file: u32,
    current_block: u32,
    at_filemark: bool,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>, max_size: Option<u64>) -> Self {
        FileDevice {
            path: path.into(),
            file: None,
            max_size,
            current_file: 0,
            current_block: 0,
            at_filemark: false,
        }
    }

    fn file(&mut self) -> DeviceResult<&mut File> {
        self.file.as_mut().ok_or(DeviceError::NotOpen)
    }
}

impl Device for FileDevice {
    fn open(&mut self, mode: DeviceMode) -> DeviceResult<()> {
        let mut opts = OpenOptions::new();
        match mode {
            DeviceMode::ReadOnly => {
                opts.read(true);
            }
            DeviceMode::WriteOnly => {
                opts.write(true).create(true);
            }
            DeviceMode::ReadWrite => {
                opts.read(true).write(true);
            }
            DeviceMode::CreateReadWrite => {
                opts.read(true).write(true).create(true);
            }
        }
        self.file = Some(opts.open(&self.path)?);
        self.current_file = 0;
        self.current_block = 0;
        self.at_filemark = false;
        Ok(())
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.file = None;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> DeviceResult<usize> {
        if self.at_filemark {
            self.at_filemark = false;
            return Ok(0);
        }
        let n = self.file()?.read(buf)?;
        if n == 0 {
            return Err(DeviceError::EndOfFile);
        }
        self.current_block += 1;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> DeviceResult<bool> {
        if let Some(max_size) = self.max_size {
            let pos = self.file()?.stream_position()?;
            if pos + buf.len() as u64 > max_size {
                return Err(DeviceError::EndOfMedium);
            }
        }
        self.file()?.write_all(buf)?;
        self.current_block += 1;

        let leom = match self.max_size {
            Some(max_size) => {
                let pos = self.file()?.stream_position()?;
                pos + buf.len() as u64 >= max_size
            }
            None => false,
        };
        Ok(leom)
    }

    fn seek(&mut self, pos: SeekPos) -> DeviceResult<()> {
        match pos {
            SeekPos::FileBlock { file, block } => {
                let addr = ((file as u64) << 32) | block as u64;
                self.file()?.seek(SeekFrom::Start(addr))?;
                self.current_file = file;
                self.current_block = block;
            }
            SeekPos::End => {
                self.file()?.seek(SeekFrom::End(0))?;
            }
        }
        self.at_filemark = false;
        Ok(())
    }

    fn forward_space_file(&mut self, count: u32) -> DeviceResult<()> {
        for _ in 0..count {
            self.current_file += 1;
            self.current_block = 0;
        }
        Ok(())
    }

    fn backward_space_file(&mut self, count: u32) -> DeviceResult<()> {
        if count > self.current_file {
            return Err(DeviceError::PositionMismatch);
        }
        self.current_file -= count;
        self.current_block = 0;
        Ok(())
    }

    fn forward_space_record(&mut self, count: u32) -> DeviceResult<()> {
        self.current_block += count;
        Ok(())
    }

    fn backward_space_record(&mut self, count: u32) -> DeviceResult<()> {
        if count > self.current_block {
            return Err(DeviceError::PositionMismatch);
        }
        self.current_block -= count;
        Ok(())
    }

    fn write_end_of_file(&mut self, count: u32) -> DeviceResult<()> {
        for _ in 0..count {
            self.current_file += 1;
            self.current_block = 0;
        }
        self.at_filemark = true;
        Ok(())
    }

    fn end_of_data(&mut self) -> DeviceResult<()> {
        self.file()?.seek(SeekFrom::End(0))?;
        Ok(())
    }

    fn rewind(&mut self) -> DeviceResult<()> {
        self.file()?.seek(SeekFrom::Start(0))?;
        self.current_file = 0;
        self.current_block = 0;
        self.at_filemark = false;
        Ok(())
    }

    fn load(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    fn offline(&mut self) -> DeviceResult<()> {
        self.close()
    }

    fn current_position(&mut self) -> DeviceResult<DevicePosition> {
        let byte_offset = self.file()?.stream_position()?;
        Ok(DevicePosition {
            file: self.current_file,
            block: self.current_block,
            byte_offset,
        })
    }

    fn has_capability(&self, cap: DeviceCapability) -> bool {
        self.capabilities().contains(cap)
    }

    fn capabilities(&self) -> DeviceCapability {
        DeviceCapability::EOF
            | DeviceCapability::BSR
            | DeviceCapability::BSF
            | DeviceCapability::FSR
            | DeviceCapability::FSF
            | DeviceCapability::RACCESS
            | DeviceCapability::LABEL
            | DeviceCapability::ANONVOLS
            | DeviceCapability::ALWAYSOPEN
    }

    fn block_size_range(&self) -> (usize, usize) {
        (1024, crate::device::DEFAULT_MAX_BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back_one_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol1.tape");

        let mut dev = FileDevice::new(&path, None);
        dev.open(DeviceMode::CreateReadWrite).unwrap();
        let leom = dev.write(b"hello tape").unwrap();
        assert!(!leom);
        dev.rewind().unwrap();

        let mut buf = [0u8; 32];
        let n = dev.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello tape");
    }

    #[test]
    fn write_past_max_size_reports_end_of_medium() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol2.tape");

        let mut dev = FileDevice::new(&path, Some(8));
        dev.open(DeviceMode::CreateReadWrite).unwrap();
        let err = dev.write(b"this is far too long").unwrap_err();
        assert!(matches!(err, DeviceError::EndOfMedium));
    }
}
