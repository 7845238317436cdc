//! The autochanger adapter (§4.6 step 2, §4.4 "owning autochanger
//! handle"): loading and unloading volumes between storage slots and
//! drive slots for devices that have `DeviceCapability::AUTOCHANGER`.

mod status;

pub use status::*;

use anyhow::{bail, Result};

/// One drive's view of its controlling changer. `load_media_from_slot`
/// is the primitive the mount engine (§4.6 step 2) drives directly;
/// the others support operator/CLI-level volume management.
pub trait MediaChanger {
    fn drive_number(&self) -> u64;
    fn drive_name(&self) -> &str;

    fn status(&mut self) -> Result<ChangerStatus>;

    fn load_media_from_slot(&mut self, slot: u64) -> Result<ChangerStatus>;
    fn unload_media(&mut self, target_slot: Option<u64>) -> Result<ChangerStatus>;
    fn transfer_media(&mut self, from: u64, to: u64) -> Result<ChangerStatus>;

    /// Loads the volume named `label_text`, unloading whatever is
    /// currently in this drive first if it differs. Refuses labels
    /// sitting in import/export slots.
    fn load_media(&mut self, label_text: &str) -> Result<ChangerStatus> {
        let mut status = self.status()?;

        for (i, drive) in status.drives.iter().enumerate() {
            if let SlotContent::VolumeTag(tag) = &drive.status {
                if tag == label_text {
                    if i as u64 != self.drive_number() {
                        bail!(
                            "unable to load media '{}' - media in wrong drive ({} != {})",
                            label_text,
                            i,
                            self.drive_number()
                        );
                    }
                    return Ok(status);
                }
            }
        }

        let currently_loaded = status
            .drives
            .get(self.drive_number() as usize)
            .map(|d| !matches!(d.status, SlotContent::Empty))
            .unwrap_or(false);
        if currently_loaded {
            status = self.unload_media(None)?;
        }

        let slot = status
            .slots
            .iter()
            .enumerate()
            .find(|(_, slot)| matches!(&slot.status, SlotContent::VolumeTag(tag) if tag == label_text))
            .map(|(i, slot)| (i, slot.import_export));

        match slot {
            None => bail!("unable to find media '{}' (offline?)", label_text),
            Some((_, true)) => {
                bail!("unable to load media '{}' - inside import/export slot", label_text)
            }
            Some((i, false)) => self.load_media_from_slot((i + 1) as u64),
        }
    }

    /// Label texts of every volume currently accessible (loaded in a
    /// drive, or in an ordinary storage slot) — excludes import/export
    /// slots and cleaning cartridges.
    fn online_media_label_texts(&mut self) -> Result<Vec<String>> {
        let status = self.status()?;
        let mut list = Vec::new();

        for drive in &status.drives {
            if let SlotContent::VolumeTag(tag) = &drive.status {
                list.push(tag.clone());
            }
        }
        for slot in &status.slots {
            if slot.import_export {
                continue;
            }
            if let SlotContent::VolumeTag(tag) = &slot.status {
                if !tag.starts_with("CLN") {
                    list.push(tag.clone());
                }
            }
        }
        Ok(list)
    }
}
