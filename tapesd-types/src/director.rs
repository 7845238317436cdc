//! The director command grammar (§6.5) and the JobMedia record (§6.4).
//!
//! These types describe the shape of the director protocol; the wire
//! framing/parsing of that protocol is out of scope (§1 Non-goals) —
//! the reservation engine consumes already-parsed values of these
//! types.

use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// One `use storage=... media_type=... pool_name=...` block, possibly
/// followed by several `use device=<name>` lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseStorage {
    pub storage: String,
    pub media_type: String,
    pub pool_name: String,
    pub pool_type: String,
    pub append: bool,
    pub copy: bool,
    pub stripe: bool,
    /// Device names offered by the director, in preference order.
    pub devices: Vec<String>,
}

/// A job's full request to the reservation engine: one or more storage
/// blocks (distinct blocks allowed for separate read/write storages).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirStoreRequest {
    pub blocks: Vec<UseStorage>,
}

/// Responses the mount engine can hand back to the director (§6.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectorResponse {
    /// `3000 OK use device device=<name>`
    Ok { device: String },
    /// `3924 Device "<name>" not in SD Device resources or no matching Media Type.`
    DeviceNotFound { device: String },
    /// `3913 Bad use command: <text>`
    BadCommand { text: String },
}

impl std::fmt::Display for DirectorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectorResponse::Ok { device } => {
                write!(f, "3000 OK use device device={}", device)
            }
            DirectorResponse::DeviceNotFound { device } => write!(
                f,
                "3924 Device \"{}\" not in SD Device resources or no matching Media Type.",
                device
            ),
            DirectorResponse::BadCommand { text } => {
                write!(f, "3913 Bad use command: {}", text)
            }
        }
    }
}

/// Logical tuple persisted via the director channel at volume/file
/// boundaries (§6.4). Written at session start (after the label),
/// session end, each volume rollover, and each end-of-file mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMediaRecord {
    pub job_id: JobId,
    pub volume_name: String,
    pub first_index: i64,
    pub last_index: i64,
    pub start_file: u32,
    pub start_block: u32,
    pub end_file: u32,
    pub end_block: u32,
    pub media_id: String,
}
