use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tapesd_types::JobId;

use crate::dcr::DeviceContext;
use crate::device_handle::DeviceHandle;

struct VolumeState {
    device: Option<Arc<DeviceHandle>>,
    in_use: bool,
    swapping: bool,
    reading: bool,
    slot: Option<u64>,
    job_id: Option<JobId>,
    ref_count: u32,
}

/// A process-wide VOLUME reservation object (§3, §4.5): which device
/// currently holds this volume name, and how many DCRs reference it.
pub struct VolumeEntry {
    pub name: String,
    state: Mutex<VolumeState>,
}

impl VolumeEntry {
    pub fn device(&self) -> Option<Arc<DeviceHandle>> {
        self.state.lock().unwrap().device.clone()
    }

    pub fn ref_count(&self) -> u32 {
        self.state.lock().unwrap().ref_count
    }

    pub fn is_swapping(&self) -> bool {
        self.state.lock().unwrap().swapping
    }
}

/// The ordered set of live VOLUME entries keyed by volume name (§4.5).
/// Exactly one entry exists per live volume name; a device's
/// `mounted_volume` equals this entry's name iff it is the attached
/// device.
#[derive(Default)]
pub struct VolumeManager {
    volumes: RwLock<HashMap<String, Arc<VolumeEntry>>>,
}

impl VolumeManager {
    pub fn new() -> Self {
        VolumeManager { volumes: RwLock::new(HashMap::new()) }
    }

    /// Attaches `name` to `dcr.device`, stealing it from whatever
    /// device currently holds it if necessary (marking `swapping` on
    /// the source for the duration — the only permitted transitional
    /// state, per §5 ordering guarantees).
    pub fn reserve_volume(&self, dcr: &DeviceContext, name: &str) -> Arc<VolumeEntry> {
        let mut volumes = self.volumes.write().unwrap();

        if let Some(entry) = volumes.get(name) {
            let mut state = entry.state.lock().unwrap();
            let same_device = state
                .device
                .as_ref()
                .map(|d| Arc::ptr_eq(d, &dcr.device))
                .unwrap_or(false);

            if same_device {
                state.ref_count += 1;
                state.in_use = true;
                drop(state);
                return Arc::clone(entry);
            }

            state.swapping = true;
            state.device = Some(Arc::clone(&dcr.device));
            state.swapping = false;
            state.ref_count += 1;
            state.in_use = true;
            drop(state);
            return Arc::clone(entry);
        }

        let entry = Arc::new(VolumeEntry {
            name: name.to_string(),
            state: Mutex::new(VolumeState {
                device: Some(Arc::clone(&dcr.device)),
                in_use: true,
                swapping: false,
                reading: dcr.mode == crate::dcr::DcrMode::Read,
                slot: None,
                job_id: Some(dcr.job_id),
                ref_count: 1,
            }),
        });
        volumes.insert(name.to_string(), Arc::clone(&entry));
        entry
    }

    /// Drops the device's current reservation once no DCR references
    /// it any longer.
    pub fn free_volume(&self, device: &Arc<DeviceHandle>) {
        let volumes = self.volumes.read().unwrap();
        for entry in volumes.values() {
            let mut state = entry.state.lock().unwrap();
            let is_owner = state.device.as_ref().map(|d| Arc::ptr_eq(d, device)).unwrap_or(false);
            if is_owner && state.ref_count == 0 {
                state.device = None;
                state.in_use = false;
            }
        }
    }

    /// Marks the volume attached to `dcr.device` as not in use,
    /// making it eligible for another drive.
    pub fn volume_unused(&self, dcr: &DeviceContext) {
        if let Some(name) = dcr.volume_name.lock().unwrap().clone() {
            let volumes = self.volumes.read().unwrap();
            if let Some(entry) = volumes.get(&name) {
                let mut state = entry.state.lock().unwrap();
                state.ref_count = state.ref_count.saturating_sub(1);
                if state.ref_count == 0 {
                    state.in_use = false;
                }
            }
        }
    }

    /// Whether the DCR's intended volume is free to attach to its
    /// device (no other drive has it reserved incompatibly).
    pub fn can_i_use_volume(&self, dcr: &DeviceContext) -> bool {
        let name = match dcr.volume_name.lock().unwrap().clone() {
            Some(name) => name,
            None => return true,
        };
        let volumes = self.volumes.read().unwrap();
        match volumes.get(&name) {
            None => true,
            Some(entry) => {
                let state = entry.state.lock().unwrap();
                match &state.device {
                    None => true,
                    Some(device) => Arc::ptr_eq(device, &dcr.device),
                }
            }
        }
    }

    pub fn foreach_vol<F: FnMut(&VolumeEntry)>(&self, mut f: F) {
        let volumes = self.volumes.read().unwrap();
        for entry in volumes.values() {
            f(entry);
        }
    }

    pub fn foreach_read_vol<F: FnMut(&VolumeEntry)>(&self, mut f: F) {
        let volumes = self.volumes.read().unwrap();
        for entry in volumes.values() {
            if entry.state.lock().unwrap().reading {
                f(entry);
            }
        }
    }

    pub fn list_volumes(&self) -> Vec<String> {
        self.volumes.read().unwrap().keys().cloned().collect()
    }
}
