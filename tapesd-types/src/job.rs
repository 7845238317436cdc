//! Job identity and the closed status set a job terminates with (§7).

use proxmox_schema::api;
use serde::{Deserialize, Serialize};

/// Opaque identifier for an external unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[api()]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// What kind of work the job performs.
pub enum JobType {
    Backup,
    Restore,
    Verify,
    System,
}

#[api()]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Backup level, or the restore/verify equivalent.
pub enum JobLevel {
    Full,
    Incremental,
    Differential,
    VerifyVolumeToCatalog,
    VerifyCatalogToVolume,
    VerifyDiskToCatalog,
}

#[api()]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
/// Final status a job carries on termination. Every termination is
/// accompanied by an EOS-label attempt, a spool commit-or-discard
/// decision, device release, and a status notification (§7).
pub enum JobStatus {
    Created,
    Running,
    Terminated,
    Warnings,
    Canceled,
    Differences,
    ErrorTerminated,
    FatalError,
    Incomplete,
}

impl JobStatus {
    /// True for statuses from which no further record I/O may occur.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Created | JobStatus::Running)
    }
}

/// `rerunning` mode per Design Note (spec.md §9, Open Question 1): a
/// resumed incomplete job may restart its first `file_index` at any
/// value instead of requiring strict continuation from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RerunPolicy {
    pub rerunning: bool,
}
