//! Configuration surface (§6.7): everything a device needs to be
//! instantiated, plus the pool binding it is configured against.

use serde::{Deserialize, Serialize};

use crate::capability::{DeviceCapability, DeviceKind};

/// Per-device configuration, as read from the (out of scope) section
/// config file at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub kind: DeviceKind,
    /// Backend path or spec (device node, directory, or fifo path).
    pub path: String,
    pub media_type: String,
    pub min_block_size: u32,
    pub max_block_size: u32,
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default)]
    pub max_volume_size: Option<u64>,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
    #[serde(default = "default_max_changer_wait")]
    pub max_changer_wait_secs: u64,
    #[serde(default)]
    pub capabilities: DeviceCapability,
    #[serde(default)]
    pub mount_point: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub changer: Option<String>,
    #[serde(default)]
    pub free_space_command: Option<String>,
    #[serde(default)]
    pub label_command: Option<String>,
    #[serde(default)]
    pub automount: bool,
}

fn default_max_concurrent_jobs() -> u32 {
    1
}

fn default_max_changer_wait() -> u64 {
    5 * 60
}

/// Pool configuration: which devices/media belong together, and the
/// policy used when choosing append-vs-read targets (§4.5/§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub pool_type: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub max_jobs_per_volume: Option<u32>,
    #[serde(default)]
    pub reserve_by_mediatype: bool,
}
