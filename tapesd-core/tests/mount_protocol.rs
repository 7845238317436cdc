//! `mount_append_volume`'s `MountState` machine (§4.6), exercising the
//! changer-driven `LoadChanger` state and the label-mismatch/operator
//! path.

use std::cell::RefCell;
use std::sync::Arc;

use anyhow::{bail, Result};
use tapesd_changer::{ChangerStatus, DriveSlotStatus, MediaChanger, SlotContent, StorageSlotStatus};
use tapesd_core::{mount_append_volume, DeviceHandle, FindVolumeOutcome, MountCollaborator};
use tapesd_io::VirtualTapeDevice;
use tapesd_types::{DeviceCapability, DeviceConfig, DeviceKind};

const FORMAT_VERSION: u8 = 2;

/// Builds a device backed by `drive_dir` with `volume` already
/// "loaded" (as a changer would leave it after `load_media`), so
/// `mount_append_volume`'s `OpenDevice` state can actually open it.
/// The caller must keep the backing temp directory alive for as long
/// as the returned handle is used.
fn device(drive_dir: &std::path::Path, name: &str, volume: &str) -> Arc<DeviceHandle> {
    let config = DeviceConfig {
        name: name.to_string(),
        kind: DeviceKind::Vtape,
        path: String::new(),
        media_type: "virtual".to_string(),
        min_block_size: 64,
        max_block_size: 256,
        max_file_size: None,
        max_volume_size: None,
        max_concurrent_jobs: 1,
        max_changer_wait_secs: 60,
        capabilities: DeviceCapability::LABEL | DeviceCapability::BSR,
        mount_point: None,
        pool: None,
        changer: None,
        free_space_command: None,
        label_command: None,
        automount: false,
    };
    let mut vtape = VirtualTapeDevice::new(drive_dir.to_path_buf(), 1024);
    vtape.load_volume(volume).unwrap();
    Arc::new(DeviceHandle::new(config, Box::new(vtape)))
}

/// A one-drive changer whose only storage slot holds `vol-1`.
struct FakeChanger {
    slot_volume: String,
    load_calls: RefCell<u32>,
}

impl MediaChanger for FakeChanger {
    fn drive_number(&self) -> u64 {
        0
    }

    fn drive_name(&self) -> &str {
        "drive0"
    }

    fn status(&mut self) -> Result<ChangerStatus> {
        Ok(ChangerStatus {
            drives: vec![DriveSlotStatus { loaded_slot: None, status: SlotContent::Empty }],
            slots: vec![StorageSlotStatus {
                element_address: 1,
                import_export: false,
                status: SlotContent::VolumeTag(self.slot_volume.clone()),
            }],
        })
    }

    fn load_media_from_slot(&mut self, _slot: u64) -> Result<ChangerStatus> {
        *self.load_calls.borrow_mut() += 1;
        self.status()
    }

    fn unload_media(&mut self, _target_slot: Option<u64>) -> Result<ChangerStatus> {
        self.status()
    }

    fn transfer_media(&mut self, _from: u64, _to: u64) -> Result<ChangerStatus> {
        bail!("not used in this test")
    }
}

struct AlwaysCreateNew;

impl MountCollaborator for AlwaysCreateNew {
    fn find_volume_for_append(&self, _pool_name: &str) -> FindVolumeOutcome {
        FindVolumeOutcome::CreateNew { volume_name: "vol-1".to_string() }
    }

    fn ask_operator_mount(&self, _device_name: &str, _volume_name: &str) -> bool {
        true
    }
}

#[test]
fn accepted_mount_drives_the_changer_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let dev = device(dir.path(), "drive0", "vol-1");
    let mut changer = FakeChanger { slot_volume: "vol-1".to_string(), load_calls: RefCell::new(0) };
    let collaborator = AlwaysCreateNew;

    let volume = mount_append_volume(&dev, Some(&mut changer), &collaborator, "Default", FORMAT_VERSION).unwrap();

    assert_eq!(volume, "vol-1");
    assert_eq!(*changer.load_calls.borrow(), 1, "LoadChanger state should call load_media exactly once");
    assert_eq!(dev.mounted_volume(), Some("vol-1".to_string()));
}

#[test]
fn no_volume_available_fails_before_touching_the_changer() {
    struct NoVolume;
    impl MountCollaborator for NoVolume {
        fn find_volume_for_append(&self, _pool_name: &str) -> FindVolumeOutcome {
            FindVolumeOutcome::NoVolumeAvailable
        }
        fn ask_operator_mount(&self, _device_name: &str, _volume_name: &str) -> bool {
            panic!("should never be asked")
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let dev = device(dir.path(), "drive0", "vol-1");
    let mut changer = FakeChanger { slot_volume: "vol-1".to_string(), load_calls: RefCell::new(0) };
    let result = mount_append_volume(&dev, Some(&mut changer), &NoVolume, "Default", FORMAT_VERSION);

    assert!(result.is_err());
    assert_eq!(*changer.load_calls.borrow(), 0);
}

#[test]
fn mount_without_a_changer_skips_loadchanger_but_still_mounts() {
    let dir = tempfile::tempdir().unwrap();
    let dev = device(dir.path(), "drive0", "vol-1");
    let collaborator = AlwaysCreateNew;

    let volume = mount_append_volume(&dev, None, &collaborator, "Default", FORMAT_VERSION).unwrap();

    assert_eq!(volume, "vol-1");
    assert_eq!(dev.mounted_volume(), Some("vol-1".to_string()));
}
