use std::sync::{Arc, Mutex};

use tapesd_block::Block;
use tapesd_types::{JobId, RecoveryPolicy, RerunPolicy};

use crate::device_handle::DeviceHandle;
use crate::device_lock::DeviceLockGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcrMode {
    Append,
    Read,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DcrExtent {
    pub start_file: u32,
    pub start_block: u32,
    pub end_file: u32,
    pub end_block: u32,
}

/// Per-job per-device handle (§3 DCR). Owns the working block and
/// bookkeeping for one extent of writes or reads against `device`.
pub struct DeviceContext {
    pub job_id: JobId,
    pub device: Arc<DeviceHandle>,
    pub mode: DcrMode,
    pub volume_name: Mutex<Option<String>>,
    /// Constant for the lifetime of the session (§6.2): identifies
    /// which job/run wrote a record, independent of `JobId` reuse.
    pub volume_session_id: u32,
    pub volume_session_time: u32,
    pub pool_name: String,
    pub pool_type: String,
    pub media_type: String,
    pub recovery: RecoveryPolicy,
    pub rerun: RerunPolicy,

    pub will_write: bool,
    pub reserved: Mutex<bool>,
    pub new_volume_needed: Mutex<bool>,
    pub new_file_needed: Mutex<bool>,
    pub wrote_volume: Mutex<bool>,
    pub spooling: Mutex<bool>,
    pub despooling: Mutex<bool>,

    pub extent: Mutex<DcrExtent>,
    pub vol_first_index: Mutex<i32>,
    pub vol_last_index: Mutex<i32>,

    pub block: Mutex<Block>,
}

impl DeviceContext {
    pub fn new(
        job_id: JobId,
        device: Arc<DeviceHandle>,
        mode: DcrMode,
        volume_session_id: u32,
        volume_session_time: u32,
        pool_name: String,
        pool_type: String,
        media_type: String,
        recovery: RecoveryPolicy,
        format_version: u8,
    ) -> Self {
        let max = device.config.max_block_size as usize;
        let mut block = Block::new(max, format_version);
        block.volume_session_id = volume_session_id;
        block.volume_session_time = volume_session_time;
        DeviceContext {
            job_id,
            device,
            mode,
            volume_name: Mutex::new(None),
            volume_session_id,
            volume_session_time,
            pool_name,
            pool_type,
            media_type,
            recovery,
            rerun: RerunPolicy::default(),
            will_write: mode == DcrMode::Append,
            reserved: Mutex::new(false),
            new_volume_needed: Mutex::new(true),
            new_file_needed: Mutex::new(true),
            wrote_volume: Mutex::new(false),
            spooling: Mutex::new(false),
            despooling: Mutex::new(false),
            extent: Mutex::new(DcrExtent::default()),
            vol_first_index: Mutex::new(0),
            vol_last_index: Mutex::new(0),
            block: Mutex::new(block),
        }
    }

    /// The DCR's `mLock`: acquires the underlying device's recursive
    /// lock. Rust's own borrow/Drop discipline replaces the source's
    /// manual use-count — the returned guard is held exactly as long
    /// as the caller's critical section needs it, and nested calls
    /// within the same thread are simply nested borrows of the same
    /// `DeviceLock`, which `rlock()` already permits while blocked.
    pub fn mlock(&self) -> DeviceLockGuard<'_> {
        self.device.rlock()
    }

    pub fn mark_reserved(&self) {
        let mut reserved = self.reserved.lock().unwrap();
        if !*reserved {
            *reserved = true;
            self.device.inc_reserved();
        }
    }

    pub fn unreserve(&self) {
        let mut reserved = self.reserved.lock().unwrap();
        if *reserved {
            *reserved = false;
            self.device.dec_reserved();
        }
    }

    pub fn found_in_use(&self) -> bool {
        self.device.mounted_volume() == *self.volume_name.lock().unwrap()
            && self.volume_name.lock().unwrap().is_some()
    }
}

impl DcrMode {
    pub fn is_append(self) -> bool {
        matches!(self, DcrMode::Append)
    }
}
