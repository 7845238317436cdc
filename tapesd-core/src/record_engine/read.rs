use std::collections::HashMap;

use tapesd_block::{is_label_index, parse_block_header, parse_record_from_block, ParseBlockError, ParseRecordOutcome, Record};
use tapesd_io::DeviceError;

use crate::bsr::Bsr;
use crate::dcr::DeviceContext;
use crate::error::BlockReadError;

/// Callbacks the read pipeline drives (§4.3): one record at a time,
/// plus a hook to mount a successor volume when the current one is
/// exhausted.
pub trait ReadCallback {
    fn on_record(&mut self, dcr: &DeviceContext, record: &Record) -> bool;
    fn on_mount_next_volume(&mut self, dcr: &DeviceContext) -> bool;
}

/// Drives the read side of the record engine against one DCR (§4.3).
pub struct ReadSession<'a> {
    dcr: &'a DeviceContext,
    bsr: Option<Bsr>,
    checksum_enabled: bool,
    in_flight: HashMap<(u32, u32), Record>,
}

impl<'a> ReadSession<'a> {
    pub fn new(dcr: &'a DeviceContext, bsr: Option<Bsr>, checksum_enabled: bool) -> Self {
        ReadSession {
            dcr,
            bsr,
            checksum_enabled,
            in_flight: HashMap::new(),
        }
    }

    /// Runs the block/record loop until the BSR is satisfied or every
    /// volume is exhausted (§4.3).
    pub fn run(&mut self, callback: &mut dyn ReadCallback) -> Result<(), BlockReadError> {
        loop {
            match self.read_next_block() {
                Ok(true) => {}
                Ok(false) => {
                    if !callback.on_mount_next_volume(self.dcr) {
                        return Ok(());
                    }
                    continue;
                }
                Err(BlockReadError::Device(DeviceError::EndOfFile)) => {
                    if !callback.on_mount_next_volume(self.dcr) {
                        return Ok(());
                    }
                    continue;
                }
                Err(err) => {
                    if self.dcr.recovery.continue_on_checksum_error {
                        continue;
                    }
                    return Err(err);
                }
            }

            if !self.drain_block_records(callback) {
                return Ok(());
            }
        }
    }

    /// Reads and validates one block, auto-growing the buffer if the
    /// on-media block turns out larger than the current buffer
    /// (§4.3 auto-sizing). Returns `Ok(false)` on device end-of-medium
    /// (the caller must mount a successor volume).
    fn read_next_block(&mut self) -> Result<bool, BlockReadError> {
        loop {
            let read_result = {
                let mut block = self.dcr.block.lock().unwrap();
                block.reset_for_read();
                let n = self.dcr.device.with_device(|dev| {
                    let buf = block.as_mut_bytes_for_device_read();
                    dev.read(buf)
                });
                n
            };

            let n = match read_result {
                Ok(n) => n,
                Err(DeviceError::EndOfFile) => return Err(BlockReadError::Device(DeviceError::EndOfFile)),
                Err(err) => return Err(BlockReadError::Device(err)),
            };

            if n == 0 {
                return Ok(false);
            }

            let mut block = self.dcr.block.lock().unwrap();
            block.set_used_len(n);
            match parse_block_header(&mut block, self.checksum_enabled, self.dcr.recovery.continue_on_checksum_error) {
                Ok(()) => return Ok(true),
                Err(ParseBlockError::BufferTooSmall { required }) => {
                    block.grow(required as usize);
                    continue;
                }
                Err(err) => return Err(BlockReadError::Block(err)),
            }
        }
    }

    /// Walks every record fragment in the current block, applying the
    /// BSR and delivering complete records to `callback`. Returns
    /// false once the BSR signals the whole read is done.
    fn drain_block_records(&mut self, callback: &mut dyn ReadCallback) -> bool {
        loop {
            let outcome = {
                let mut block = self.dcr.block.lock().unwrap();
                parse_record_from_block(&mut block)
            };

            let (mut record, is_continuation, fragment_complete) = match outcome {
                Ok(ParseRecordOutcome::Fragment { record, is_continuation, fragment_complete }) => {
                    (record, is_continuation, fragment_complete)
                }
                Ok(ParseRecordOutcome::EndOfBlock) => return true,
                Err(_) => return true,
            };

            let key = (record.volume_session_id, record.volume_session_time);

            if is_continuation {
                // REC_NO_MATCH (§4.1): a continuation with no prior
                // fragment in flight. Nothing to extend; treat the
                // fragment's own payload as all there is.
                if let Some(mut existing) = self.in_flight.remove(&key) {
                    existing.data.extend_from_slice(&record.data);
                    record = existing;
                }
            } else {
                // A fresh origin header always starts a new record; any
                // stale entry under the same session key is abandoned.
                self.in_flight.remove(&key);
            }

            if !fragment_complete {
                self.in_flight.insert(key, record);
                continue;
            }

            if is_label_index(record.file_index) {
                if !callback.on_record(self.dcr, &record) {
                    return false;
                }
                continue;
            }

            if let Some(bsr) = &mut self.bsr {
                let volume_name = self.dcr.volume_name.lock().unwrap().clone().unwrap_or_default();
                if !bsr.match_bsr(&volume_name, &record) {
                    continue;
                }
                if !callback.on_record(self.dcr, &record) {
                    return false;
                }
                if bsr.is_this_bsr_done(&record) && !bsr.advance() {
                    return false;
                }
            } else if !callback.on_record(self.dcr, &record) {
                return false;
            }
        }
    }
}
