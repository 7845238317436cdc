use tapesd_block::{parse_block_header, serialize_block_header, Block, Record, WriteOutcome, EOS_LABEL, SOS_LABEL};
use tapesd_io::DeviceError;
use tapesd_types::{DeviceCapability, JobMediaRecord, JobStatus};

use crate::dcr::DeviceContext;
use crate::error::AppendError;

/// Let the append pipeline ask the mount engine for a successor
/// volume when the device signals end-of-medium (§4.2 step "on ENOSPC
/// terminate the current volume" / §4.6 mount protocol).
pub trait VolumeSuccessor {
    fn mount_next_volume(&mut self, dcr: &DeviceContext) -> bool;
}

/// Drives one job's append session against its DCR (§4.2). One
/// instance is used for the lifetime of the session: from the
/// Start-Of-Session label through the End-Of-Session label.
pub struct AppendSession<'a> {
    dcr: &'a DeviceContext,
    checksum_enabled: bool,
    job_bytes: u64,
    file_size: u64,
    volume_bytes: u64,
    write_retries: u32,
    /// File number within the current volume (§4.4 `DevicePosition`),
    /// advanced by each end-of-file mark and reset on volume rollover.
    current_file: u32,
    /// Highest `file_index` seen so far this session; `None` until the
    /// first data record so a resumed job's first index is unconstrained
    /// (§4.2 step 4b, §9 Open Question 1, `RerunPolicy`).
    prev_file_index: Option<i32>,
    job_status: JobStatus,
    media_records: Vec<JobMediaRecord>,
}

impl<'a> AppendSession<'a> {
    pub fn new(dcr: &'a DeviceContext, checksum_enabled: bool) -> Self {
        AppendSession {
            dcr,
            checksum_enabled,
            job_bytes: 0,
            file_size: 0,
            volume_bytes: 0,
            write_retries: 0,
            current_file: 0,
            prev_file_index: None,
            job_status: JobStatus::Running,
            media_records: Vec::new(),
        }
    }

    pub fn job_bytes(&self) -> u64 {
        self.job_bytes
    }

    pub fn job_status(&self) -> JobStatus {
        self.job_status
    }

    /// JobMedia records emitted so far (§6.4): session start, each
    /// volume rollover, each end-of-file mark, and session end.
    pub fn job_media_records(&self) -> &[JobMediaRecord] {
        &self.media_records
    }

    /// A record stamped with this session's `(VolSessionId,
    /// VolSessionTime)` pair (§6.2) — every record this session writes
    /// goes through here, v1 and v2 format alike.
    fn new_record(&self, file_index: i32, stream_id: i32) -> Record {
        let mut record = Record::new(file_index, stream_id);
        record.volume_session_id = self.dcr.volume_session_id;
        record.volume_session_time = self.dcr.volume_session_time;
        record
    }

    /// Step 3 of §4.2: writes the Start-Of-Session label and resets
    /// the DCR's `(VolFirstIndex, VolLastIndex)` pair.
    pub fn start_session(&mut self, session_label: &[u8], successor: &mut dyn VolumeSuccessor) -> Result<(), AppendError> {
        *self.dcr.vol_first_index.lock().unwrap() = 0;
        *self.dcr.vol_last_index.lock().unwrap() = 0;
        *self.dcr.extent.lock().unwrap() = crate::dcr::DcrExtent::default();
        let record = self.new_record(SOS_LABEL, 0);
        self.write_record_inner(&record, session_label, successor)?;
        let end_block = self.dcr.block.lock().unwrap().block_number;
        self.emit_job_media_record(end_block);
        Ok(())
    }

    /// Step 5 of §4.2: writes the End-Of-Session label and flushes
    /// the current block even if partial.
    pub fn end_session(&mut self, session_label: &[u8], successor: &mut dyn VolumeSuccessor) -> Result<(), AppendError> {
        let record = self.new_record(EOS_LABEL, 0);
        self.write_record_inner(&record, session_label, successor)?;
        self.flush_block(successor)?;
        let end_block = self.dcr.block.lock().unwrap().block_number;
        self.emit_job_media_record(end_block);
        if self.job_status == JobStatus::Running {
            self.job_status = JobStatus::Terminated;
        }
        Ok(())
    }

    /// Writes a label record (VOL_LABEL, EOM_LABEL, ...) outside the
    /// SOS/EOS bracket. Label records never count toward `job_bytes`.
    pub fn write_label(
        &mut self,
        file_index: i32,
        payload: &[u8],
        successor: &mut dyn VolumeSuccessor,
    ) -> Result<(), AppendError> {
        let record = self.new_record(file_index, 0);
        self.write_record_inner(&record, payload, successor)
    }

    /// Writes one data record (stream > 0); only data records
    /// increment `job_bytes` (§4.2 `write_record` semantics).
    ///
    /// Validates §4.2 step 4b before writing: `file_index` must be
    /// greater than or equal to the previous one and at most one
    /// greater. A resumed/rerunning job's first record is exempt,
    /// since no previous index has been tracked yet this session.
    /// Violating it terminates the job as `JS_Incomplete`.
    pub fn write_data_record(
        &mut self,
        file_index: i32,
        stream_id: i32,
        data: &[u8],
        successor: &mut dyn VolumeSuccessor,
    ) -> Result<(), AppendError> {
        self.check_file_index_sequence(file_index)?;
        let record = self.new_record(file_index, stream_id);
        self.write_record_inner(&record, data, successor)?;
        self.job_bytes += data.len() as u64;
        Ok(())
    }

    fn check_file_index_sequence(&mut self, file_index: i32) -> Result<(), AppendError> {
        if let Some(previous) = self.prev_file_index {
            if file_index < previous || file_index > previous + 1 {
                self.job_status = JobStatus::Incomplete;
                return Err(AppendError::OutOfSequence { previous, file_index });
            }
        }
        self.prev_file_index = Some(file_index);
        Ok(())
    }

    /// Builds and stores a JobMedia boundary record (§6.4) covering the
    /// extent written since the last one, then starts a fresh extent at
    /// `end_block`.
    fn emit_job_media_record(&mut self, end_block: u32) {
        let volume_name = self.dcr.volume_name.lock().unwrap().clone().unwrap_or_default();
        let mut extent = self.dcr.extent.lock().unwrap();
        let record = JobMediaRecord {
            job_id: self.dcr.job_id,
            volume_name: volume_name.clone(),
            first_index: *self.dcr.vol_first_index.lock().unwrap() as i64,
            last_index: *self.dcr.vol_last_index.lock().unwrap() as i64,
            start_file: extent.start_file,
            start_block: extent.start_block,
            end_file: self.current_file,
            end_block,
            media_id: volume_name,
        };
        log::debug!(
            "job {:?}: JobMedia volume={} file_index=[{}, {}] block=[{}/{}, {}/{}]",
            record.job_id,
            record.volume_name,
            record.first_index,
            record.last_index,
            record.start_file,
            record.start_block,
            record.end_file,
            record.end_block,
        );
        extent.start_file = self.current_file;
        extent.start_block = end_block;
        self.media_records.push(record);
    }

    fn write_record_inner(
        &mut self,
        record: &Record,
        data: &[u8],
        successor: &mut dyn VolumeSuccessor,
    ) -> Result<(), AppendError> {
        let mut remaining = data;
        let mut continuing = false;
        loop {
            let outcome = {
                let mut block = self.dcr.block.lock().unwrap();
                if continuing {
                    tapesd_block::serialize_record_continuation(&mut block, record, remaining)
                } else {
                    tapesd_block::write_record_payload_slice(&mut block, record, remaining)
                }
            };
            match outcome {
                WriteOutcome::Complete { written } => {
                    remaining = &remaining[written..];
                    if remaining.is_empty() {
                        return Ok(());
                    }
                    continuing = true;
                }
                WriteOutcome::Partial { written } => {
                    remaining = &remaining[written..];
                    continuing = true;
                    self.flush_block(successor)?;
                }
                WriteOutcome::NoRoom => {
                    self.flush_block(successor)?;
                }
            }
        }
    }

    /// Re-read verification after writing a volume-terminator EOF mark
    /// (§4.2, §9 Open Question 4): backs up over the mark and the last
    /// data block just written, re-reads it, and compares its
    /// `block_number` against what we wrote. A delta of exactly one is
    /// a driver miscount and is logged as a warning; anything larger is
    /// treated as possible data loss and fails the session. Only
    /// attempted when the device advertises `BSR` — without it there
    /// is no way to back up over a record at all.
    fn verify_last_written_block(&mut self, last_block: u32, format_version: u8) -> Result<(), AppendError> {
        let has_bsr = self.dcr.device.with_device(|dev| dev.has_capability(DeviceCapability::BSR));
        if !has_bsr {
            return Ok(());
        }

        let checksum_enabled = self.checksum_enabled;
        let continue_on_checksum_error = self.dcr.recovery.continue_on_checksum_error;
        let max_block_size = self.dcr.device.config.max_block_size as usize;

        let readback = self.dcr.device.with_device(|dev| -> Result<u32, DeviceError> {
            dev.backward_space_file(1)?;
            dev.backward_space_record(1)?;
            let mut block = Block::new(max_block_size, format_version);
            block.reset_for_read();
            let n = dev.read(block.as_mut_bytes_for_device_read())?;
            block.set_used_len(n);
            parse_block_header(&mut block, checksum_enabled, continue_on_checksum_error)
                .map_err(|_| DeviceError::PositionMismatch)?;
            dev.forward_space_record(1)?;
            dev.forward_space_file(1)?;
            Ok(block.block_number)
        })?;

        match last_block.checked_sub(readback) {
            Some(0) => Ok(()),
            Some(1) => {
                log::warn!(
                    "read-after-write: block_number delta of 1 after verify (wrote {}, read back {}); likely driver miscount",
                    last_block,
                    readback
                );
                Ok(())
            }
            _ => {
                log::error!(
                    "read-after-write: block_number mismatch (wrote {}, read back {}); possible data loss",
                    last_block,
                    readback
                );
                Err(AppendError::Device(DeviceError::PositionMismatch))
            }
        }
    }

    /// `write_block_to_device()` (§4.2): embeds the checksum, issues
    /// the write with EBUSY retries, handles end-of-medium by asking
    /// `successor` for a new volume, and resets the block for reuse.
    /// Emits a JobMedia boundary record (§6.4) at each volume rollover
    /// and each end-of-file mark.
    fn flush_block(&mut self, successor: &mut dyn VolumeSuccessor) -> Result<(), AppendError> {
        let (used_len, block_number) = {
            let mut block = self.dcr.block.lock().unwrap();
            if block.used_len() == block.header_len() {
                return Ok(());
            }
            serialize_block_header(&mut block, self.checksum_enabled);
            (block.used_len(), block.block_number)
        };

        let max_volume_size = self.dcr.device.config.max_volume_size.unwrap_or(u64::MAX);
        if self.volume_bytes + used_len as u64 >= max_volume_size {
            self.emit_job_media_record(block_number);
            if !successor.mount_next_volume(self.dcr) {
                return Err(AppendError::Device(DeviceError::EndOfMedium));
            }
            self.volume_bytes = 0;
            self.file_size = 0;
            self.current_file = 0;
            *self.dcr.extent.lock().unwrap() = crate::dcr::DcrExtent::default();
        }

        let write_result = self.dcr.device.with_device(|dev| {
            let buf = {
                let block = self.dcr.block.lock().unwrap();
                block.as_bytes().to_vec()
            };
            dev.write(&buf)
        });

        match write_result {
            Ok(_leom) => {
                self.write_retries = 0;
                self.volume_bytes += used_len as u64;
                self.file_size += used_len as u64;

                let mut block = self.dcr.block.lock().unwrap();
                block.block_number = block_number + 1;

                let first = block.first_file_index;
                let mut vol_first = self.dcr.vol_first_index.lock().unwrap();
                if *vol_first == 0 && first != 0 {
                    *vol_first = first;
                }
                let mut vol_last = self.dcr.vol_last_index.lock().unwrap();
                let last = block.last_file_index;
                if last != 0 {
                    *vol_last = last;
                }
                drop(vol_first);
                drop(vol_last);

                let max_file_size = self.dcr.device.config.max_file_size.unwrap_or(u64::MAX);
                if self.file_size >= max_file_size {
                    self.file_size = 0;
                    let last_block = block_number;
                    let format_version = block.format_version;
                    drop(block);
                    self.dcr.device.with_device(|dev| dev.write_end_of_file(1))?;
                    *self.dcr.new_file_needed.lock().unwrap() = true;
                    self.verify_last_written_block(last_block, format_version)?;
                    self.emit_job_media_record(last_block);
                    self.current_file += 1;
                    let mut block = self.dcr.block.lock().unwrap();
                    block.reset();
                } else {
                    block.reset();
                }
                Ok(())
            }
            Err(DeviceError::EndOfMedium) => {
                self.emit_job_media_record(block_number);
                if successor.mount_next_volume(self.dcr) {
                    self.volume_bytes = 0;
                    self.file_size = 0;
                    self.current_file = 0;
                    *self.dcr.extent.lock().unwrap() = crate::dcr::DcrExtent::default();
                    let mut block = self.dcr.block.lock().unwrap();
                    block.reset();
                    Ok(())
                } else {
                    Err(AppendError::Device(DeviceError::EndOfMedium))
                }
            }
            Err(err) => {
                self.write_retries += 1;
                if self.write_retries <= self.dcr.recovery.max_write_error_retries {
                    std::thread::sleep(std::time::Duration::from_secs(5));
                    self.flush_block(successor)
                } else {
                    Err(AppendError::Device(err))
                }
            }
        }
    }
}
