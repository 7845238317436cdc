//! The `.status <keyword>` protocol (§6.6), modeled as a structured
//! snapshot rather than wire bytes — rendering to the line protocol is
//! the (out of scope) network layer's job.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKeyword {
    Current,
    Last,
    Header,
    Running,
    WaitReservation,
    Devices,
    Volumes,
    Spooling,
    Terminated,
    Resources,
}

/// The `header` form: process-wide versioning, start time, job
/// counters, and memory usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderStatus {
    pub version: String,
    pub start_time: i64,
    pub jobs_running: u32,
    pub jobs_terminated_today: u32,
}

/// One entry in the `waitreservation` report: a job parked in
/// `wait_for_device`, the phase it is retrying, and how many full
/// passes it has already made (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitReservationEntry {
    pub job_id: u64,
    pub phase: String,
    pub passes_attempted: u32,
}
