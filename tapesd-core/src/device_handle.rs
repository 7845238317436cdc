use std::sync::Mutex;

use tapesd_io::{reconcile_os_position, Device, DeviceError, DevicePosition};
use tapesd_types::DeviceConfig;

use crate::device_lock::{BlockedState, DeviceLock, DeviceLockGuard};

#[derive(Debug, Default, Clone, Copy)]
struct DeviceCounts {
    num_writers: u32,
    num_reserved: u32,
    num_readers: u32,
}

/// The process-wide, per-configured-device state (§3 DEVICE):
/// capability-backed I/O, the blocked-state lock, writer/reader/
/// reservation counts, and the currently mounted volume.
pub struct DeviceHandle {
    pub config: DeviceConfig,
    device: Mutex<Box<dyn Device>>,
    lock: DeviceLock,
    counts: Mutex<DeviceCounts>,
    mounted_volume: Mutex<Option<String>>,
    position: Mutex<DevicePosition>,
}

impl DeviceHandle {
    pub fn new(config: DeviceConfig, device: Box<dyn Device>) -> Self {
        DeviceHandle {
            config,
            device: Mutex::new(device),
            lock: DeviceLock::new(),
            counts: Mutex::new(DeviceCounts::default()),
            mounted_volume: Mutex::new(None),
            position: Mutex::new(DevicePosition::default()),
        }
    }

    pub fn rlock(&self) -> DeviceLockGuard<'_> {
        self.lock.rlock()
    }

    pub fn block_device(&self, guard: &DeviceLockGuard<'_>, state: BlockedState) {
        self.lock.block_device(guard, state)
    }

    pub fn unblock_device(&self) {
        self.lock.unblock_device()
    }

    pub fn blocked_state(&self) -> BlockedState {
        self.lock.blocked_state()
    }

    pub fn steal_device_lock(&self, new_state: BlockedState) -> BlockedState {
        self.lock.steal_device_lock(new_state)
    }

    pub fn give_back_device_lock(&self, saved: BlockedState) {
        self.lock.give_back_device_lock(saved)
    }

    /// Runs `f` against the backend with exclusive I/O access. Callers
    /// are expected to already hold an `rlock()` guard for the
    /// duration of the logical operation this belongs to.
    pub fn with_device<R>(&self, f: impl FnOnce(&mut dyn Device) -> R) -> R {
        let mut dev = self.device.lock().unwrap();
        f(dev.as_mut())
    }

    pub fn mounted_volume(&self) -> Option<String> {
        self.mounted_volume.lock().unwrap().clone()
    }

    pub fn set_mounted_volume(&self, name: Option<String>) {
        *self.mounted_volume.lock().unwrap() = name;
    }

    pub fn position(&self) -> DevicePosition {
        *self.position.lock().unwrap()
    }

    pub fn set_position(&self, pos: DevicePosition) {
        *self.position.lock().unwrap() = pos;
    }

    /// Queries the backend's own position and checks it against what
    /// we last recorded (§4.4 "insanity check"). On agreement, the
    /// tracked position is refreshed and returned.
    pub fn sync_position(&self) -> Result<DevicePosition, DeviceError> {
        let tracked = self.position();
        let reported = self.with_device(|dev| dev.current_position())?;
        let reconciled = reconcile_os_position(tracked, reported)?;
        self.set_position(reconciled);
        Ok(reconciled)
    }

    pub fn num_writers(&self) -> u32 {
        self.counts.lock().unwrap().num_writers
    }

    pub fn num_reserved(&self) -> u32 {
        self.counts.lock().unwrap().num_reserved
    }

    pub fn num_readers(&self) -> u32 {
        self.counts.lock().unwrap().num_readers
    }

    pub fn can_append(&self) -> bool {
        let counts = self.counts.lock().unwrap();
        counts.num_readers == 0
    }

    pub fn can_read(&self) -> bool {
        let counts = self.counts.lock().unwrap();
        counts.num_writers == 0
    }

    pub fn inc_writers(&self) {
        self.counts.lock().unwrap().num_writers += 1;
    }

    pub fn dec_writers(&self) {
        let mut counts = self.counts.lock().unwrap();
        counts.num_writers = counts.num_writers.saturating_sub(1);
    }

    pub fn inc_readers(&self) {
        self.counts.lock().unwrap().num_readers += 1;
    }

    pub fn dec_readers(&self) {
        let mut counts = self.counts.lock().unwrap();
        counts.num_readers = counts.num_readers.saturating_sub(1);
    }

    pub fn inc_reserved(&self) {
        self.counts.lock().unwrap().num_reserved += 1;
    }

    pub fn dec_reserved(&self) {
        let mut counts = self.counts.lock().unwrap();
        counts.num_reserved = counts.num_reserved.saturating_sub(1);
    }
}
