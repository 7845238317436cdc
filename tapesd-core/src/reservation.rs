use std::sync::Arc;
use std::time::Duration;

use tapesd_block::{parse_block_header, parse_record_from_block, serialize_block_header, Block, ParseRecordOutcome, Record, VOL_LABEL};
use tapesd_changer::MediaChanger;
use tapesd_io::DeviceError;
use tapesd_types::{DeviceMode, JobId};

use crate::dcr::DcrMode;
use crate::device_handle::DeviceHandle;
use crate::error::MountError;
use crate::volume_manager::VolumeManager;

/// What the director asked for (§4.6): a recurrent `use storage`
/// carrying pool/media type and preferred device names.
pub struct ReservationRequest {
    pub job_id: JobId,
    pub pool_name: String,
    pub pool_type: String,
    pub media_type: String,
    pub preferred_devices: Vec<String>,
    pub mode: DcrMode,
}

/// Outcome the director gives back for the "find next appendable
/// volume" sub-protocol that drives the mount path (§4.6 step 1).
/// Modeled as a plain enum since the network round trip itself is
/// out of scope.
pub enum FindVolumeOutcome {
    Use { volume_name: String, recorded_bytes: u64 },
    CreateNew { volume_name: String },
    NoVolumeAvailable,
}

/// The director/operator side of the mount protocol, supplied by the
/// caller. The wire protocol to reach it is deliberately out of scope
/// (§1); this is the declared interface the engine drives.
pub trait MountCollaborator {
    fn find_volume_for_append(&self, pool_name: &str) -> FindVolumeOutcome;
    fn ask_operator_mount(&self, device_name: &str, volume_name: &str) -> bool;
}

/// The small state machine replacing the source's `goto`-based label
/// read/retry loop (§9 REDESIGN FLAGS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    FindVolume,
    LoadChanger,
    OpenDevice,
    ReadLabel,
    AutoLabel,
    AskOperator,
    Accepted,
    Failed,
}

/// Five outcomes of reading the first block of a newly-opened volume
/// (§4.6 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeLabelOutcome {
    VolOk,
    VolNameError { found: String },
    VolIoError,
    VolNoLabel,
    VolNoMedia,
}

pub struct ReservationEngine {
    devices: Vec<Arc<DeviceHandle>>,
    volumes: Arc<VolumeManager>,
    reserve_by_mediatype: bool,
}

impl ReservationEngine {
    pub fn new(devices: Vec<Arc<DeviceHandle>>, volumes: Arc<VolumeManager>, reserve_by_mediatype: bool) -> Self {
        ReservationEngine { devices, volumes, reserve_by_mediatype }
    }

    /// Runs the selection loop (§4.6): phases 1-6 in order, with up to
    /// three full passes separated by a wait on device release.
    pub fn reserve(&self, req: &ReservationRequest, wait: impl Fn(Duration)) -> Result<Arc<DeviceHandle>, MountError> {
        let mut low_use_drive: Option<Arc<DeviceHandle>> = None;

        for pass in 0..3 {
            if let Some(device) = self.phase_unmounted_idle(req) {
                device.inc_reserved();
                return Ok(device);
            }
            if low_use_drive.is_none() {
                low_use_drive = self.phase_lowest_use_busy(req);
            }
            if let Some(device) = &low_use_drive {
                if self.device_suitable(device, req) {
                    device.inc_reserved();
                    return Ok(Arc::clone(device));
                }
            }
            if let Some(device) = self.phase_any_unmounted(req) {
                device.inc_reserved();
                return Ok(device);
            }
            if let Some(device) = self.phase_mounted_exact_volume(req) {
                device.inc_reserved();
                return Ok(device);
            }
            if let Some(device) = self.phase_mounted_any(req) {
                device.inc_reserved();
                return Ok(device);
            }
            if let Some(device) = self.phase_any_ignoring_preferences(req) {
                device.inc_reserved();
                return Ok(device);
            }

            if pass < 2 {
                wait(Duration::from_secs(30));
            }
        }

        Err(MountError::NoDeviceAvailable { pool: req.pool_name.clone(), passes: 3 })
    }

    fn candidates(&self) -> impl Iterator<Item = &Arc<DeviceHandle>> {
        self.devices.iter()
    }

    fn media_type_matches(&self, device: &DeviceHandle, req: &ReservationRequest) -> bool {
        if self.reserve_by_mediatype {
            device.config.media_type == req.media_type
        } else {
            device.config.media_type == req.media_type
                && req.preferred_devices.iter().any(|name| name == &device.config.name)
        }
    }

    /// Per-device reservation check (§4.6): media type, concurrency
    /// cap, and append/read mode compatibility.
    fn device_suitable(&self, device: &Arc<DeviceHandle>, req: &ReservationRequest) -> bool {
        if !self.media_type_matches(device, req) {
            return false;
        }
        if device.num_writers() + device.num_reserved() >= device.config.max_concurrent_jobs {
            return false;
        }
        match req.mode {
            DcrMode::Append => device.can_append(),
            DcrMode::Read => device.can_read(),
        }
    }

    fn phase_unmounted_idle(&self, req: &ReservationRequest) -> Option<Arc<DeviceHandle>> {
        self.candidates()
            .find(|d| d.mounted_volume().is_none() && self.device_suitable(d, req))
            .cloned()
    }

    fn phase_lowest_use_busy(&self, req: &ReservationRequest) -> Option<Arc<DeviceHandle>> {
        self.candidates()
            .filter(|d| self.media_type_matches(d, req))
            .min_by_key(|d| d.num_writers() + d.num_reserved())
            .cloned()
    }

    fn phase_any_unmounted(&self, req: &ReservationRequest) -> Option<Arc<DeviceHandle>> {
        self.candidates()
            .find(|d| d.mounted_volume().is_none() && self.media_type_matches(d, req))
            .cloned()
    }

    fn phase_mounted_exact_volume(&self, req: &ReservationRequest) -> Option<Arc<DeviceHandle>> {
        self.candidates()
            .find(|d| {
                req.preferred_devices.iter().any(|name| name == &d.config.name)
                    && self.device_suitable(d, req)
            })
            .cloned()
    }

    fn phase_mounted_any(&self, req: &ReservationRequest) -> Option<Arc<DeviceHandle>> {
        self.candidates()
            .find(|d| d.mounted_volume().is_some() && self.device_suitable(d, req))
            .cloned()
    }

    fn phase_any_ignoring_preferences(&self, req: &ReservationRequest) -> Option<Arc<DeviceHandle>> {
        self.candidates()
            .find(|d| {
                d.config.max_concurrent_jobs > d.num_writers() + d.num_reserved()
                    && match req.mode {
                        DcrMode::Append => d.can_append(),
                        DcrMode::Read => d.can_read(),
                    }
            })
            .cloned()
    }

    pub fn volumes(&self) -> &Arc<VolumeManager> {
        &self.volumes
    }
}

/// Reads the first block of the currently open device and decodes its
/// volume label record (§4.6 step 4). `format_version` must match the
/// block codec version the device was labeled with.
fn read_volume_label(device: &Arc<DeviceHandle>, format_version: u8, expected_volume: &str) -> VolumeLabelOutcome {
    let max_block_size = device.config.max_block_size as usize;

    let result = device.with_device(|dev| -> Result<Option<(i32, Vec<u8>)>, DeviceError> {
        dev.rewind()?;
        let mut block = Block::new(max_block_size, format_version);
        block.reset_for_read();
        let n = dev.read(block.as_mut_bytes_for_device_read())?;
        block.set_used_len(n);
        parse_block_header(&mut block, false, false).map_err(|_| DeviceError::PositionMismatch)?;
        match parse_record_from_block(&mut block) {
            Ok(ParseRecordOutcome::Fragment { record, .. }) => Ok(Some((record.file_index, record.data))),
            Ok(ParseRecordOutcome::EndOfBlock) => Ok(None),
            Err(_) => Err(DeviceError::PositionMismatch),
        }
    });

    match result {
        Ok(Some((file_index, data))) if file_index == VOL_LABEL => match String::from_utf8(data) {
            Ok(found) if found == expected_volume => VolumeLabelOutcome::VolOk,
            Ok(found) => VolumeLabelOutcome::VolNameError { found },
            Err(_) => VolumeLabelOutcome::VolIoError,
        },
        Ok(_) => VolumeLabelOutcome::VolNoLabel,
        Err(DeviceError::EndOfFile) => VolumeLabelOutcome::VolNoLabel,
        Err(DeviceError::NotOpen) => VolumeLabelOutcome::VolNoMedia,
        Err(_) => VolumeLabelOutcome::VolIoError,
    }
}

/// Writes a fresh volume label to the currently open, rewound device
/// (§4.6 `AutoLabel`). The label is a lone VOL_LABEL record in its own
/// block, written outside of any job session.
fn write_volume_label(device: &Arc<DeviceHandle>, volume_name: &str, format_version: u8) -> Result<(), MountError> {
    let max_block_size = device.config.max_block_size as usize;
    let mut block = Block::new(max_block_size, format_version);
    let record = Record::new(VOL_LABEL, 0);
    tapesd_block::write_record_payload_slice(&mut block, &record, volume_name.as_bytes());
    serialize_block_header(&mut block, false);

    device
        .with_device(|dev| -> Result<(), DeviceError> {
            dev.rewind()?;
            dev.write(block.as_bytes())?;
            Ok(())
        })
        .map_err(|err| MountError::OpenFailed(anyhow::anyhow!(err)))
}

/// Drives the mount protocol (§4.6) for one device via the
/// `MountState` state machine, loading through the optional
/// changer, opening the device, reading its on-media volume label,
/// and asking the collaborator to resolve label mismatches.
/// `format_version` is the block codec version used to write and read
/// labels on this device.
pub fn mount_append_volume(
    device: &Arc<DeviceHandle>,
    mut changer: Option<&mut dyn MediaChanger>,
    collaborator: &dyn MountCollaborator,
    pool_name: &str,
    format_version: u8,
) -> Result<String, MountError> {
    let mut state = MountState::FindVolume;
    let mut volume_name = String::new();

    loop {
        state = match state {
            MountState::FindVolume => match collaborator.find_volume_for_append(pool_name) {
                FindVolumeOutcome::Use { volume_name: name, .. } | FindVolumeOutcome::CreateNew { volume_name: name } => {
                    volume_name = name;
                    MountState::LoadChanger
                }
                FindVolumeOutcome::NoVolumeAvailable => MountState::Failed,
            },
            MountState::LoadChanger => {
                if let Some(changer) = changer.as_mut() {
                    if let Err(err) = changer.load_media(&volume_name) {
                        log::warn!("changer load of '{}' failed: {:#}", volume_name, err);
                        return Err(MountError::ChangerTimeout);
                    }
                }
                MountState::OpenDevice
            }
            MountState::OpenDevice => {
                let opened = device.with_device(|dev| dev.open(DeviceMode::ReadWrite));
                match opened {
                    Ok(()) => {
                        device.set_mounted_volume(Some(volume_name.clone()));
                        MountState::ReadLabel
                    }
                    Err(err) => {
                        log::warn!("opening device '{}' failed: {}", device.config.name, err);
                        return Err(MountError::OpenFailed(anyhow::anyhow!(err)));
                    }
                }
            }
            MountState::ReadLabel => match read_volume_label(device, format_version, &volume_name) {
                VolumeLabelOutcome::VolOk => MountState::Accepted,
                VolumeLabelOutcome::VolNameError { found } => {
                    if device.config.capabilities.contains(tapesd_types::DeviceCapability::LABEL) {
                        MountState::AutoLabel
                    } else if collaborator.ask_operator_mount(&device.config.name, &found) {
                        volume_name = found;
                        MountState::Accepted
                    } else {
                        MountState::AskOperator
                    }
                }
                VolumeLabelOutcome::VolNoLabel => {
                    if device.config.capabilities.contains(tapesd_types::DeviceCapability::LABEL) {
                        MountState::AutoLabel
                    } else {
                        MountState::Failed
                    }
                }
                VolumeLabelOutcome::VolNoMedia | VolumeLabelOutcome::VolIoError => MountState::Failed,
            },
            MountState::AutoLabel => {
                write_volume_label(device, &volume_name, format_version)?;
                device.set_mounted_volume(Some(volume_name.clone()));
                MountState::Accepted
            }
            MountState::AskOperator => {
                if collaborator.ask_operator_mount(&device.config.name, &volume_name) {
                    MountState::Accepted
                } else {
                    MountState::Failed
                }
            }
            MountState::Accepted => return Ok(volume_name),
            MountState::Failed => {
                return Err(MountError::VolumeInUse(volume_name));
            }
        };
    }
}
