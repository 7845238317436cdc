use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tapesd_types::{JobId, JobLevel, JobStatus, JobType};

use crate::dcr::DeviceContext;

/// The core's view of an external unit of work (§3 JOB). Everything
/// beyond job id/type/level/cancellation and the two DCR lists is the
/// director's business, not this engine's.
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub level: JobLevel,
    canceled: AtomicBool,
    status: Mutex<JobStatus>,
    pub read_contexts: Mutex<Vec<Arc<DeviceContext>>>,
    pub write_contexts: Mutex<Vec<Arc<DeviceContext>>>,
}

impl Job {
    pub fn new(id: JobId, job_type: JobType, level: JobLevel) -> Self {
        Job {
            id,
            job_type,
            level,
            canceled: AtomicBool::new(false),
            status: Mutex::new(JobStatus::Created),
            read_contexts: Mutex::new(Vec::new()),
            write_contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> JobStatus {
        *self.status.lock().unwrap()
    }

    pub fn set_status(&self, status: JobStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn add_write_context(&self, dcr: Arc<DeviceContext>) {
        self.write_contexts.lock().unwrap().push(dcr);
    }

    pub fn add_read_context(&self, dcr: Arc<DeviceContext>) {
        self.read_contexts.lock().unwrap().push(dcr);
    }
}
