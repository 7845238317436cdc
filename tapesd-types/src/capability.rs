//! Device capability flags (§6.3): a closed set. Every higher layer
//! consults `Device::has_capability` rather than branching on device
//! kind directly.

bitflags::bitflags! {
    /// Capabilities a configured device backend actually supports.
    #[derive(serde::Serialize, serde::Deserialize)]
    pub struct DeviceCapability: u32 {
        /// Can backspace over an end-of-file mark.
        const EOF            = 0b0000_0000_0000_0001;
        /// Supports backspace-record (used for read-after-write verify).
        const BSR            = 0b0000_0000_0000_0010;
        /// Supports backspace-file.
        const BSF            = 0b0000_0000_0000_0100;
        /// Supports forward-space-record.
        const FSR            = 0b0000_0000_0000_1000;
        /// Supports forward-space-file.
        const FSF            = 0b0000_0000_0001_0000;
        /// Fast forward-space-file (driver-assisted, skips data).
        const FASTFSF        = 0b0000_0000_0010_0000;
        /// Backspace-file works at end-of-medium.
        const BSFATEOM       = 0b0000_0000_0100_0000;
        /// Supports positioning to end-of-medium directly.
        const EOM            = 0b0000_0000_1000_0000;
        /// Removable media.
        const REM            = 0b0000_0001_0000_0000;
        /// Supports random access (non-sequential seek).
        const RACCESS        = 0b0000_0010_0000_0000;
        /// Media may be auto-mounted on open.
        const AUTOMOUNT      = 0b0000_0100_0000_0000;
        /// Supports writing a volume label (auto-label).
        const LABEL          = 0b0000_1000_0000_0000;
        /// Accepts any volume name, does not require a pre-registered one.
        const ANONVOLS       = 0b0001_0000_0000_0000;
        /// Device should be opened eagerly at process start.
        const ALWAYSOPEN     = 0b0010_0000_0000_0000;
        /// Supports querying status via an `MTIOCGET`-style call.
        const MTIOCGET       = 0b0100_0000_0000_0000;
        /// Supports adjusting write size to match a short physical block.
        const ADJWRITESIZE   = 0b1000_0000_0000_0000;
        /// Device imposes a single fixed block size (streaming mode).
        const STREAM         = 0b0001_0000_0000_0000_0000;
        /// Device should be closed between idle polls.
        const CLOSEONPOLL    = 0b0010_0000_0000_0000_0000;
        /// Device is attached to an autochanger.
        const AUTOCHANGER    = 0b0100_0000_0000_0000_0000;
        /// Device goes offline (ejects) on unmount rather than just closing.
        const OFFLINEUNMOUNT = 0b1000_0000_0000_0000_0000;
        /// Device writes two filemarks at end-of-volume instead of one.
        const TWOEOF         = 0b0001_0000_0000_0000_0000_0000;
    }
}

impl Default for DeviceCapability {
    fn default() -> Self {
        DeviceCapability::empty()
    }
}

/// The kind of backend a configured `Device` is implemented by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Real SCSI-like tape drive (e.g. Linux `st`/`nst` driver).
    Tape,
    /// A regular file treated as tape-like media.
    File,
    /// A named pipe (write-only or read-only streaming device).
    Pipe,
    /// An in-process / directory backed virtual tape, used for tests.
    Vtape,
}

/// Open mode requested by a caller of `Device::open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    ReadOnly,
    ReadWrite,
    WriteOnly,
    CreateReadWrite,
}
