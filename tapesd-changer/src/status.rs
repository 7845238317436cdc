use serde::{Deserialize, Serialize};

/// What occupies a drive or storage-element slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotContent {
    Empty,
    Full,
    VolumeTag(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSlotStatus {
    pub loaded_slot: Option<u64>,
    pub status: SlotContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSlotStatus {
    pub element_address: u16,
    pub import_export: bool,
    pub status: SlotContent,
}

/// A snapshot of the whole changer: drives, storage slots, and
/// transport (robot) elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangerStatus {
    pub drives: Vec<DriveSlotStatus>,
    pub slots: Vec<StorageSlotStatus>,
}

impl ChangerStatus {
    pub fn empty() -> Self {
        ChangerStatus { drives: Vec::new(), slots: Vec::new() }
    }
}
