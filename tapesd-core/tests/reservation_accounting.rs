//! Reservation engine phase selection and device-level concurrency
//! accounting (§4.6), plus volume-name uniqueness across devices
//! (§4.5).

use std::sync::Arc;

use tapesd_core::{DcrMode, DeviceHandle, ReservationEngine, ReservationRequest};
use tapesd_io::VirtualTapeDevice;
use tapesd_types::{DeviceCapability, DeviceConfig, DeviceKind, JobId};

fn device(name: &str, max_concurrent_jobs: u32) -> Arc<DeviceHandle> {
    let config = DeviceConfig {
        name: name.to_string(),
        kind: DeviceKind::Vtape,
        path: String::new(),
        media_type: "virtual".to_string(),
        min_block_size: 64,
        max_block_size: 256,
        max_file_size: None,
        max_volume_size: None,
        max_concurrent_jobs,
        max_changer_wait_secs: 60,
        capabilities: DeviceCapability::empty(),
        mount_point: None,
        pool: None,
        changer: None,
        free_space_command: None,
        label_command: None,
        automount: false,
    };
    let vtape = VirtualTapeDevice::new("/nonexistent", 1024);
    Arc::new(DeviceHandle::new(config, Box::new(vtape)))
}

fn request() -> ReservationRequest {
    ReservationRequest {
        job_id: JobId(1),
        pool_name: "Default".to_string(),
        pool_type: "Backup".to_string(),
        media_type: "virtual".to_string(),
        preferred_devices: Vec::new(),
        mode: DcrMode::Append,
    }
}

#[test]
fn unmounted_idle_device_is_preferred_over_busy_one() {
    let busy = device("drive-busy", 4);
    busy.inc_writers();
    busy.set_mounted_volume(Some("vol-busy".to_string()));

    let idle = device("drive-idle", 4);

    let engine = ReservationEngine::new(vec![busy.clone(), idle.clone()], Arc::new(tapesd_core::VolumeManager::new()), false);
    let picked = engine.reserve(&request(), |_| panic!("should not need to wait")).unwrap();

    assert_eq!(picked.config.name, "drive-idle");
    assert_eq!(picked.num_reserved(), 1);
}

#[test]
fn device_at_concurrency_cap_is_skipped() {
    let maxed = device("drive-maxed", 1);
    maxed.inc_writers();
    maxed.set_mounted_volume(Some("vol-1".to_string()));

    let engine = ReservationEngine::new(vec![maxed.clone()], Arc::new(tapesd_core::VolumeManager::new()), false);
    let waited = std::cell::Cell::new(false);
    let result = engine.reserve(&request(), |_| waited.set(true));

    assert!(result.is_err());
    assert!(waited.get(), "reserve() should have waited between the 3 passes before giving up");
}

#[test]
fn volume_manager_steals_reservation_between_devices() {
    let manager = tapesd_core::VolumeManager::new();
    let dev_a = device("drive-a", 4);
    let dev_b = device("drive-b", 4);

    let dcr_a = tapesd_core::DeviceContext::new(
        JobId(1),
        dev_a.clone(),
        DcrMode::Append,
        1,
        100,
        "Default".to_string(),
        "Backup".to_string(),
        "virtual".to_string(),
        tapesd_types::RecoveryPolicy::default(),
        2,
    );
    let entry = manager.reserve_volume(&dcr_a, "vol-shared");
    assert!(Arc::ptr_eq(&entry.device().unwrap(), &dev_a));

    let dcr_b = tapesd_core::DeviceContext::new(
        JobId(2),
        dev_b.clone(),
        DcrMode::Append,
        2,
        200,
        "Default".to_string(),
        "Backup".to_string(),
        "virtual".to_string(),
        tapesd_types::RecoveryPolicy::default(),
        2,
    );
    let entry = manager.reserve_volume(&dcr_b, "vol-shared");
    assert!(Arc::ptr_eq(&entry.device().unwrap(), &dev_b), "volume should now belong to the stealing device");
    assert_eq!(entry.ref_count(), 2, "both DCRs still hold a reference");
}
