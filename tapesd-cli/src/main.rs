//! Driver binary for exercising the storage daemon core directly
//! against a directory-backed virtual drive, in the spirit of the
//! library's own low-level `pmt` tool: no director protocol, no
//! autochanger, just enough plumbing to label, append to, and read
//! back a volume from the command line.

use std::io::Read;
use std::sync::Arc;

use anyhow::{bail, Context, Error};
use log::info;

use tapesd_block::{Record, VOL_LABEL};
use tapesd_core::{
    AppendSession, DeviceContext, DeviceHandle, DcrMode, ReadCallback, ReadSession,
    StatusReport, VolumeSuccessor, build_status_report, device_status_line,
};
use tapesd_io::{Device, VirtualTapeDevice};
use tapesd_types::{DeviceCapability, DeviceConfig, DeviceKind, HeaderStatus, JobId, RecoveryPolicy};

const FORMAT_VERSION: u8 = 2;

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_default();

    match command.as_str() {
        "label" => {
            let drive_dir = args.next().context("usage: tapesd-cli label <drive-dir> <volume>")?;
            let volume = args.next().context("usage: tapesd-cli label <drive-dir> <volume>")?;
            cmd_label(&drive_dir, &volume)
        }
        "append" => {
            let drive_dir = args.next().context("usage: tapesd-cli append <drive-dir> <volume> <file>")?;
            let volume = args.next().context("usage: tapesd-cli append <drive-dir> <volume> <file>")?;
            let path = args.next().context("usage: tapesd-cli append <drive-dir> <volume> <file>")?;
            cmd_append(&drive_dir, &volume, &path)
        }
        "read" => {
            let drive_dir = args.next().context("usage: tapesd-cli read <drive-dir> <volume>")?;
            let volume = args.next().context("usage: tapesd-cli read <drive-dir> <volume>")?;
            cmd_read(&drive_dir, &volume)
        }
        "status" => {
            let drive_dir = args.next().context("usage: tapesd-cli status <drive-dir>")?;
            cmd_status(&drive_dir)
        }
        other => bail!(
            "unknown command '{}' (expected one of: label, append, read, status)",
            other
        ),
    }
}

fn device_config(drive_dir: &str) -> DeviceConfig {
    DeviceConfig {
        name: "vtape0".to_string(),
        kind: DeviceKind::Vtape,
        path: drive_dir.to_string(),
        media_type: "virtual".to_string(),
        min_block_size: 1024,
        max_block_size: 1024 * 1024,
        max_file_size: None,
        max_volume_size: None,
        max_concurrent_jobs: 1,
        max_changer_wait_secs: 300,
        capabilities: DeviceCapability::empty(),
        mount_point: None,
        pool: None,
        changer: None,
        free_space_command: None,
        label_command: None,
        automount: false,
    }
}

/// Opens `volume` on a fresh virtual device and wraps it in a
/// `DeviceHandle` ready for a `DeviceContext`.
fn open_device_handle(drive_dir: &str, volume: &str, mode: tapesd_types::DeviceMode) -> Result<Arc<DeviceHandle>, Error> {
    std::fs::create_dir_all(drive_dir)?;
    let mut vtape = VirtualTapeDevice::new(drive_dir, 64 * 1024 * 1024);
    vtape.load_volume(volume)?;
    vtape.open(mode)?;

    let handle = Arc::new(DeviceHandle::new(device_config(drive_dir), Box::new(vtape)));
    handle.set_mounted_volume(Some(volume.to_string()));
    Ok(handle)
}

/// A single-volume demo never offers a successor; an append that hits
/// end-of-medium simply fails, same as a one-device job with no spare
/// media configured.
struct NoSuccessor;

impl VolumeSuccessor for NoSuccessor {
    fn mount_next_volume(&mut self, _dcr: &DeviceContext) -> bool {
        false
    }
}

fn cmd_label(drive_dir: &str, volume: &str) -> Result<(), Error> {
    let device = open_device_handle(drive_dir, volume, tapesd_types::DeviceMode::CreateReadWrite)?;
    let dcr = DeviceContext::new(
        JobId(0),
        device,
        DcrMode::Append,
        1,
        0,
        "Default".to_string(),
        "Backup".to_string(),
        "virtual".to_string(),
        RecoveryPolicy::default(),
        FORMAT_VERSION,
    );
    *dcr.volume_name.lock().unwrap() = Some(volume.to_string());

    let mut session = AppendSession::new(&dcr, true);
    session.write_label(VOL_LABEL, volume.as_bytes(), &mut NoSuccessor)?;
    info!("wrote volume label for '{}'", volume);
    Ok(())
}

fn cmd_append(drive_dir: &str, volume: &str, path: &str) -> Result<(), Error> {
    let mut data = Vec::new();
    std::fs::File::open(path)
        .with_context(|| format!("opening {}", path))?
        .read_to_end(&mut data)?;

    let device = open_device_handle(drive_dir, volume, tapesd_types::DeviceMode::ReadWrite)?;
    device.with_device(|dev| dev.end_of_data())?;

    let dcr = DeviceContext::new(
        JobId(1),
        device,
        DcrMode::Append,
        1,
        1,
        "Default".to_string(),
        "Backup".to_string(),
        "virtual".to_string(),
        RecoveryPolicy::default(),
        FORMAT_VERSION,
    );
    *dcr.volume_name.lock().unwrap() = Some(volume.to_string());

    let mut session = AppendSession::new(&dcr, true);
    session.start_session(b"session", &mut NoSuccessor)?;
    session.write_data_record(1, 1, &data, &mut NoSuccessor)?;
    session.end_session(b"session", &mut NoSuccessor)?;

    info!("appended {} bytes to volume '{}' ({} job bytes)", data.len(), volume, session.job_bytes());
    Ok(())
}

struct PrintRecords {
    count: u32,
}

impl ReadCallback for PrintRecords {
    fn on_record(&mut self, _dcr: &DeviceContext, record: &Record) -> bool {
        if tapesd_block::is_label_index(record.file_index) {
            println!("label file_index={} bytes={}", record.file_index, record.data.len());
        } else {
            self.count += 1;
            println!(
                "record #{} file_index={} stream_id={} bytes={}",
                self.count,
                record.file_index,
                record.stream_id,
                record.data.len()
            );
        }
        true
    }

    fn on_mount_next_volume(&mut self, _dcr: &DeviceContext) -> bool {
        false
    }
}

fn cmd_read(drive_dir: &str, volume: &str) -> Result<(), Error> {
    let device = open_device_handle(drive_dir, volume, tapesd_types::DeviceMode::ReadOnly)?;
    device.with_device(|dev| dev.rewind())?;

    let dcr = DeviceContext::new(
        JobId(2),
        device,
        DcrMode::Read,
        1,
        1,
        "Default".to_string(),
        "Backup".to_string(),
        "virtual".to_string(),
        RecoveryPolicy::default(),
        FORMAT_VERSION,
    );
    *dcr.volume_name.lock().unwrap() = Some(volume.to_string());

    let mut session = ReadSession::new(&dcr, None, true);
    let mut callback = PrintRecords { count: 0 };
    session.run(&mut callback)?;
    info!("read {} data record(s) from volume '{}'", callback.count, volume);
    Ok(())
}

fn cmd_status(drive_dir: &str) -> Result<(), Error> {
    std::fs::create_dir_all(drive_dir)?;
    let vtape = VirtualTapeDevice::new(drive_dir, 64 * 1024 * 1024);
    let device = Arc::new(DeviceHandle::new(device_config(drive_dir), Box::new(vtape)));
    let volumes = tapesd_core::VolumeManager::new();

    let header = HeaderStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        start_time: 0,
        jobs_running: 0,
        jobs_terminated_today: 0,
    };
    let report: StatusReport = build_status_report(header, &[device.clone()], &volumes);
    let line = device_status_line(&device);
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("device '{}' mounted={:?}", line.name, line.mounted_volume);

    match device.sync_position() {
        Ok(pos) => info!("device position confirmed: file={} block={}", pos.file, pos.block),
        Err(err) => info!("device position check skipped: {}", err),
    }
    Ok(())
}
