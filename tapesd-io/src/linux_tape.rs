use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use tapesd_types::{DeviceCapability, DeviceMode};

use crate::device::{Device, DeviceError, DevicePosition, DeviceResult, SeekPos};
use crate::linux_mtio::{mtget, mtioctop, mtiocget, mtop, MTCmd};

/// A real SCSI-like tape drive accessed through the Linux `st` driver.
/// Reads and writes are variable-length: the kernel hands back
/// whatever the drive returned for one block, up to the size of the
/// caller's buffer.
pub struct LinuxTapeDevice {
    path: PathBuf,
    file: Option<File>,
    capabilities: DeviceCapability,
    min_block_size: usize,
    max_block_size: usize,
}

impl LinuxTapeDevice {
    pub fn new(path: impl Into<PathBuf>, min_block_size: usize, max_block_size: usize) -> Self {
        let capabilities = DeviceCapability::EOF
            | DeviceCapability::BSR
            | DeviceCapability::BSF
            | DeviceCapability::FSR
            | DeviceCapability::FSF
            | DeviceCapability::EOM
            | DeviceCapability::REM
            | DeviceCapability::MTIOCGET
            | DeviceCapability::AUTOMOUNT;

        LinuxTapeDevice {
            path: path.into(),
            file: None,
            capabilities,
            min_block_size,
            max_block_size,
        }
    }

    fn file(&mut self) -> DeviceResult<&mut File> {
        self.file.as_mut().ok_or(DeviceError::NotOpen)
    }

    fn mtop(&mut self, op: MTCmd, count: i32) -> DeviceResult<()> {
        let fd = self.file()?.as_raw_fd();
        let arg = mtop { mt_op: op, mt_count: count };
        unsafe { mtioctop(fd, &arg) }.map_err(|err| {
            DeviceError::Io(std::io::Error::from_raw_os_error(err as i32))
        })?;
        Ok(())
    }

    fn mtget(&mut self) -> DeviceResult<mtget> {
        let fd = self.file()?.as_raw_fd();
        let mut status = mtget::default();
        unsafe { mtiocget(fd, &mut status) }.map_err(|err| {
            DeviceError::Io(std::io::Error::from_raw_os_error(err as i32))
        })?;
        Ok(status)
    }
}

impl Device for LinuxTapeDevice {
    fn open(&mut self, mode: DeviceMode) -> DeviceResult<()> {
        let mut opts = OpenOptions::new();
        match mode {
            DeviceMode::ReadOnly => {
                opts.read(true);
            }
            DeviceMode::WriteOnly => {
                opts.write(true);
            }
            DeviceMode::ReadWrite | DeviceMode::CreateReadWrite => {
                opts.read(true).write(true);
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
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> DeviceResult<bool> {
        match self.file()?.write_all(buf) {
            Ok(()) => Ok(false),
            Err(err) if err.raw_os_error() == Some(libc::ENOSPC) => Ok(true),
            Err(err) => Err(DeviceError::Io(err)),
        }
    }

    fn seek(&mut self, _pos: SeekPos) -> DeviceResult<()> {
        Err(DeviceError::Unsupported)
    }

    fn forward_space_file(&mut self, count: u32) -> DeviceResult<()> {
        self.mtop(MTCmd::MTFSF, count as i32)
    }

    fn backward_space_file(&mut self, count: u32) -> DeviceResult<()> {
        self.mtop(MTCmd::MTBSF, count as i32)
    }

    fn forward_space_record(&mut self, count: u32) -> DeviceResult<()> {
        self.mtop(MTCmd::MTFSR, count as i32)
    }

    fn backward_space_record(&mut self, count: u32) -> DeviceResult<()> {
        self.mtop(MTCmd::MTBSR, count as i32)
    }

    fn write_end_of_file(&mut self, count: u32) -> DeviceResult<()> {
        self.mtop(MTCmd::MTWEOF, count as i32)
    }

    fn end_of_data(&mut self) -> DeviceResult<()> {
        self.mtop(MTCmd::MTEOM, 1)
    }

    fn rewind(&mut self) -> DeviceResult<()> {
        self.mtop(MTCmd::MTREW, 1)
    }

    fn load(&mut self) -> DeviceResult<()> {
        self.mtop(MTCmd::MTLOAD, 1)
    }

    fn offline(&mut self) -> DeviceResult<()> {
        self.mtop(MTCmd::MTOFFL, 1)
    }

    fn current_position(&mut self) -> DeviceResult<DevicePosition> {
        let status = self.mtget()?;
        Ok(DevicePosition {
            file: status.mt_fileno.max(0) as u32,
            block: status.mt_blkno.max(0) as u32,
            byte_offset: 0,
        })
    }

    fn has_capability(&self, cap: DeviceCapability) -> bool {
        self.capabilities.contains(cap)
    }

    fn capabilities(&self) -> DeviceCapability {
        self.capabilities
    }

    fn block_size_range(&self) -> (usize, usize) {
        (self.min_block_size, self.max_block_size)
    }
}
