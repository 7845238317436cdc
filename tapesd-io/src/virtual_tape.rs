use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tapesd_types::{DeviceCapability, DeviceMode};

use crate::device::{Device, DeviceError, DevicePosition, DeviceResult, SeekPos};

/// Test/debug backend emulating an autochanger-fed tape drive on a
/// plain directory: each volume is one flat file, and a small JSON
/// status file remembers which volume is currently "loaded" and at
/// what position, so state survives across process invocations.
#[derive(Serialize, Deserialize, Default)]
struct VirtualDriveStatus {
    loaded_volume: Option<String>,
}

pub struct VirtualTapeDevice {
    drive_dir: PathBuf,
    max_size: u64,
    file: Option<File>,
    current_file: u32,
    current_block: u32,
    at_filemark: bool,
}

impl VirtualTapeDevice {
    pub fn new(drive_dir: impl Into<PathBuf>, max_size: u64) -> Self {
        VirtualTapeDevice {
            drive_dir: drive_dir.into(),
            max_size,
            file: None,
            current_file: 0,
            current_block: 0,
            at_filemark: false,
        }
    }

    fn status_path(&self) -> PathBuf {
        self.drive_dir.join("drive-status.json")
    }

    fn volume_path(&self, name: &str) -> PathBuf {
        self.drive_dir.join(format!("volume-{}.tape", name))
    }

    fn load_status(&self) -> DeviceResult<VirtualDriveStatus> {
        let path = self.status_path();
        if !path.exists() {
            return Ok(VirtualDriveStatus::default());
        }
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw)
            .map_err(|err| DeviceError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))
    }

    fn store_status(&self, status: &VirtualDriveStatus) -> DeviceResult<()> {
        let raw = serde_json::to_vec_pretty(status)
            .map_err(|err| DeviceError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
        std::fs::write(self.status_path(), raw)?;
        Ok(())
    }

    /// Mounts `name`, creating its backing file if it does not
    /// already exist (mirrors the teacher's auto-create-on-load
    /// behavior for this test backend).
    pub fn load_volume(&mut self, name: &str) -> DeviceResult<()> {
        let path = self.volume_path(name);
        OpenOptions::new().read(true).write(true).create(true).open(&path)?;

        let status = VirtualDriveStatus {
            loaded_volume: Some(name.to_string()),
        };
        self.store_status(&status)?;
        Ok(())
    }

    pub fn loaded_volume(&self) -> DeviceResult<Option<String>> {
        Ok(self.load_status()?.loaded_volume)
    }

    fn file(&mut self) -> DeviceResult<&mut File> {
        self.file.as_mut().ok_or(DeviceError::NotOpen)
    }
}

impl Device for VirtualTapeDevice {
    fn open(&mut self, mode: DeviceMode) -> DeviceResult<()> {
        let status = self.load_status()?;
        let name = status.loaded_volume.ok_or(DeviceError::NotOpen)?;
        let path = self.volume_path(&name);

        let mut opts = OpenOptions::new();
        match mode {
            DeviceMode::ReadOnly => {
                opts.read(true);
            }
            DeviceMode::WriteOnly => {
                opts.write(true);
            }
            DeviceMode::ReadWrite | DeviceMode::CreateReadWrite => {
                opts.read(true).write(true).create(true);
            }
        }
        self.file = Some(opts.open(path)?);
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
        let pos = self.file()?.stream_position()?;
        if pos + buf.len() as u64 > self.max_size {
            return Err(DeviceError::EndOfMedium);
        }
        self.file()?.write_all(buf)?;
        self.current_block += 1;
        let pos = self.file()?.stream_position()?;
        Ok(pos >= self.max_size)
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
        Ok(())
    }

    fn forward_space_file(&mut self, count: u32) -> DeviceResult<()> {
        self.current_file += count;
        self.current_block = 0;
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
        self.current_file += count;
        self.current_block = 0;
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
        self.close()?;
        let mut status = self.load_status()?;
        status.loaded_volume = None;
        self.store_status(&status)
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
            | DeviceCapability::AUTOCHANGER
    }

    fn block_size_range(&self) -> (usize, usize) {
        (1024, crate::device::DEFAULT_MAX_BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_then_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = VirtualTapeDevice::new(dir.path(), 1024 * 1024);
        dev.load_volume("vol-a").unwrap();
        assert_eq!(dev.loaded_volume().unwrap(), Some("vol-a".to_string()));

        dev.open(DeviceMode::CreateReadWrite).unwrap();
        dev.write(b"payload").unwrap();
        dev.rewind().unwrap();

        let mut buf = [0u8; 16];
        let n = dev.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"payload");
    }
}
