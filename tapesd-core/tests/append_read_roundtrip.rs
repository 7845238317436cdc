//! End-to-end append/read roundtrip against a directory-backed virtual
//! drive: a label, two data records (one of which is forced to span a
//! block boundary), and the session-end label, verified record for
//! record on the read side.

use std::sync::Arc;

use tapesd_block::{is_label_index, Record, VOL_LABEL};
use tapesd_core::{AppendSession, DcrMode, DeviceContext, DeviceHandle, ReadCallback, ReadSession, VolumeSuccessor};
use tapesd_io::{Device, VirtualTapeDevice};
use tapesd_types::{DeviceCapability, DeviceConfig, DeviceKind, DeviceMode, JobId, RecoveryPolicy};

fn device_config() -> DeviceConfig {
    DeviceConfig {
        name: "drive0".to_string(),
        kind: DeviceKind::Vtape,
        path: String::new(),
        media_type: "virtual".to_string(),
        min_block_size: 64,
        max_block_size: 256,
        max_file_size: None,
        max_volume_size: None,
        max_concurrent_jobs: 1,
        max_changer_wait_secs: 60,
        capabilities: DeviceCapability::empty(),
        mount_point: None,
        pool: None,
        changer: None,
        free_space_command: None,
        label_command: None,
        automount: false,
    }
}

fn open_handle(dir: &std::path::Path, volume: &str, mode: DeviceMode) -> Arc<DeviceHandle> {
    let mut vtape = VirtualTapeDevice::new(dir, 64 * 1024);
    vtape.load_volume(volume).unwrap();
    vtape.open(mode).unwrap();
    let handle = Arc::new(DeviceHandle::new(device_config(), Box::new(vtape)));
    handle.set_mounted_volume(Some(volume.to_string()));
    handle
}

struct NoSuccessor;

impl VolumeSuccessor for NoSuccessor {
    fn mount_next_volume(&mut self, _dcr: &DeviceContext) -> bool {
        false
    }
}

struct Collector {
    labels: Vec<i32>,
    data: Vec<(i32, i32, Vec<u8>)>,
}

impl ReadCallback for Collector {
    fn on_record(&mut self, _dcr: &DeviceContext, record: &Record) -> bool {
        if is_label_index(record.file_index) {
            self.labels.push(record.file_index);
        } else {
            self.data.push((record.file_index, record.stream_id, record.data.clone()));
        }
        true
    }

    fn on_mount_next_volume(&mut self, _dcr: &DeviceContext) -> bool {
        false
    }
}

#[test]
fn append_then_read_back_preserves_records_and_session() {
    let dir = tempfile::tempdir().unwrap();

    {
        let device = open_handle(dir.path(), "vol-a", DeviceMode::CreateReadWrite);
        let dcr = DeviceContext::new(
            JobId(1),
            device,
            DcrMode::Append,
            42,
            1000,
            "Default".to_string(),
            "Backup".to_string(),
            "virtual".to_string(),
            RecoveryPolicy::default(),
            2,
        );
        *dcr.volume_name.lock().unwrap() = Some("vol-a".to_string());

        let mut session = AppendSession::new(&dcr, true);
        session.write_label(VOL_LABEL, b"vol-a", &mut NoSuccessor).unwrap();
        session.start_session(b"sos", &mut NoSuccessor).unwrap();
        // Payload sized to force a continuation across the 256-byte max block.
        let big_payload = vec![0x42u8; 400];
        session.write_data_record(1, 5, &big_payload, &mut NoSuccessor).unwrap();
        session.write_data_record(2, 5, b"small", &mut NoSuccessor).unwrap();
        session.end_session(b"eos", &mut NoSuccessor).unwrap();

        assert_eq!(session.job_bytes(), big_payload.len() as u64 + 5);
    }

    let device = open_handle(dir.path(), "vol-a", DeviceMode::ReadOnly);
    device.with_device(|dev| dev.rewind()).unwrap();
    let dcr = DeviceContext::new(
        JobId(2),
        device,
        DcrMode::Read,
        42,
        1000,
        "Default".to_string(),
        "Backup".to_string(),
        "virtual".to_string(),
        RecoveryPolicy::default(),
        2,
    );
    *dcr.volume_name.lock().unwrap() = Some("vol-a".to_string());

    let mut session = ReadSession::new(&dcr, None, true);
    let mut collector = Collector { labels: Vec::new(), data: Vec::new() };
    session.run(&mut collector).unwrap();

    assert_eq!(collector.labels, vec![VOL_LABEL, tapesd_block::SOS_LABEL, tapesd_block::EOS_LABEL]);
    assert_eq!(collector.data.len(), 2);
    assert_eq!(collector.data[0].0, 1);
    assert_eq!(collector.data[0].2, vec![0x42u8; 400]);
    assert_eq!(collector.data[1].0, 2);
    assert_eq!(collector.data[1].2, b"small".to_vec());
}
