use serde::Serialize;
use tapesd_types::{HeaderStatus, WaitReservationEntry};

use crate::device_handle::DeviceHandle;
use crate::volume_manager::VolumeManager;

/// One device line in a `.status devices` report.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatusLine {
    pub name: String,
    pub mounted_volume: Option<String>,
    pub num_writers: u32,
    pub num_reserved: u32,
    pub num_readers: u32,
}

/// A structured snapshot answering the `.status <keyword>` protocol
/// (§6.6). Rendering this to the line-oriented wire protocol is the
/// (out-of-scope) network layer's job.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub header: HeaderStatus,
    pub devices: Vec<DeviceStatusLine>,
    pub volumes: Vec<String>,
}

pub fn device_status_line(device: &DeviceHandle) -> DeviceStatusLine {
    DeviceStatusLine {
        name: device.config.name.clone(),
        mounted_volume: device.mounted_volume(),
        num_writers: device.num_writers(),
        num_reserved: device.num_reserved(),
        num_readers: device.num_readers(),
    }
}

pub fn build_status_report(
    header: HeaderStatus,
    devices: &[std::sync::Arc<DeviceHandle>],
    volumes: &VolumeManager,
) -> StatusReport {
    StatusReport {
        header,
        devices: devices.iter().map(|d| device_status_line(d)).collect(),
        volumes: volumes.list_volumes(),
    }
}

/// Entries for the `.status waitreservation` keyword: jobs currently
/// parked in the reservation engine's wait loop. The engine itself
/// only exposes pass counts per call; callers track per-job state
/// externally and pass it in here for rendering.
pub fn wait_reservation_report(entries: Vec<WaitReservationEntry>) -> Vec<WaitReservationEntry> {
    entries
}
