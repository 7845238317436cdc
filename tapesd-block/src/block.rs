use crate::{block_header_len, ParseBlockError, MAGIC_V1, MAGIC_V2, MAX_BLOCK_LENGTH,
            MIN_BLOCK_HEADER_LEN};

/// The unit of media I/O (§3). Created empty, reused across writes;
/// the byte buffer is never reallocated except to grow it when a read
/// reveals a block larger than the current buffer (§4.3 auto-sizing).
pub struct Block {
    buf: Vec<u8>,
    /// Bytes of `buf` that are meaningful (header + all record
    /// fragments written so far, or the full size of a block just
    /// read from the device).
    used_len: usize,
    /// Read cursor into `buf`, used only while parsing records back
    /// out of a block that came from the device.
    read_pos: usize,
    pub block_number: u32,
    pub volume_session_id: u32,
    pub volume_session_time: u32,
    /// Range of logical (positive) file indices whose data records
    /// are contained in this block; 0 if none.
    pub first_file_index: i32,
    pub last_file_index: i32,
    pub read_from_device: bool,
    pub write_failed: bool,
    pub format_version: u8,
    /// Count of checksum/parse errors seen on this block instance;
    /// used to log only the first error per block unless verbose.
    read_errors: u32,
}

impl Block {
    /// Allocates a new block with `buf_len` bytes of backing storage,
    /// with the write cursor already advanced past the header region
    /// so callers can start appending record fragments immediately.
    pub fn new(buf_len: usize, format_version: u8) -> Self {
        let mut block = Block {
            buf: vec![0u8; buf_len],
            used_len: 0,
            read_pos: 0,
            block_number: 0,
            volume_session_id: 0,
            volume_session_time: 0,
            first_file_index: 0,
            last_file_index: 0,
            read_from_device: false,
            write_failed: false,
            format_version,
            read_errors: 0,
        };
        block.reset();
        block
    }

    /// Clears the block for reuse as a fresh write target, keeping the
    /// allocated buffer. `block_number` is left untouched; the caller
    /// (record engine) increments it on successful write.
    pub fn reset(&mut self) {
        self.used_len = self.header_len();
        self.read_pos = 0;
        self.first_file_index = 0;
        self.last_file_index = 0;
        self.read_from_device = false;
        self.write_failed = false;
        self.read_errors = 0;
    }

    /// Resets the block to receive bytes read from a device: write
    /// cursor semantics do not apply, `used_len` will be set by the
    /// caller to however many bytes were actually read.
    pub fn reset_for_read(&mut self) {
        self.used_len = 0;
        self.read_pos = 0;
        self.read_errors = 0;
        self.read_from_device = true;
    }

    pub fn header_len(&self) -> usize {
        block_header_len(self.format_version)
    }

    pub fn buf_len(&self) -> usize {
        self.buf.len()
    }

    pub fn used_len(&self) -> usize {
        self.used_len
    }

    pub fn set_used_len(&mut self, len: usize) {
        self.used_len = len;
    }

    pub fn free_bytes(&self) -> usize {
        self.buf.len().saturating_sub(self.used_len)
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn has_more_records(&self) -> bool {
        self.read_pos < self.used_len
    }

    /// Checksum/parse error count seen on this block instance (mirrors
    /// `DEV_BLOCK::read_errors` in the source).
    pub fn error_count(&self) -> u32 {
        self.read_errors
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.used_len]
    }

    /// The exact byte range the checksum covers, shared by serialize
    /// and parse so the covered range can never drift between them.
    pub fn checksum_region(&self) -> &[u8] {
        &self.buf[4..self.used_len]
    }

    pub fn as_bytes_for_parse(&self) -> &[u8] {
        &self.buf[..self.used_len]
    }

    pub fn set_read_pos(&mut self, pos: usize) {
        self.read_pos = pos;
    }

    pub fn as_mut_bytes_for_device_read(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Grows the backing buffer to at least `new_len` bytes. Used by
    /// the read engine's auto-sizing when a parsed `block_len` exceeds
    /// the current buffer (§4.3).
    pub fn grow(&mut self, new_len: usize) {
        if self.buf.len() < new_len {
            self.buf.resize(new_len, 0);
        }
    }

    fn raw(&mut self, range: std::ops::Range<usize>) -> &mut [u8] {
        &mut self.buf[range]
    }
}

/// Writes the block header at offset 0 in the chosen format version.
/// Returns the computed checksum (zero when `checksum_enabled` is
/// false). Must be called after all record fragments for this block
/// have already been written into the buffer, since the checksum
/// covers `[4 .. used_len)`.
pub fn serialize_block_header(block: &mut Block, checksum_enabled: bool) -> u32 {
    let magic = if block.format_version >= 2 { MAGIC_V2 } else { MAGIC_V1 };
    let used_len = block.used_len;

    block.raw(4..8).copy_from_slice(&(used_len as u32).to_be_bytes());
    block.raw(8..12).copy_from_slice(&block.block_number.to_be_bytes());
    block.raw(12..16).copy_from_slice(&magic);

    if block.format_version >= 2 {
        block
            .raw(16..20)
            .copy_from_slice(&block.volume_session_id.to_be_bytes());
        block
            .raw(20..24)
            .copy_from_slice(&block.volume_session_time.to_be_bytes());
    }

    let checksum = if checksum_enabled {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(block.checksum_region());
        hasher.finalize()
    } else {
        0
    };
    block.raw(0..4).copy_from_slice(&checksum.to_be_bytes());
    checksum
}

/// Validates a block header that was just read from the device into
/// `block`'s buffer (with `block.used_len` set to the number of bytes
/// actually read). `forge_on` mirrors the source's global flag,
/// threaded in explicitly per spec.md Design Notes §9.
pub fn parse_block_header(
    block: &mut Block,
    checksum_enabled: bool,
    forge_on: bool,
) -> Result<(), ParseBlockError> {
    let len = block.used_len;
    if len < MIN_BLOCK_HEADER_LEN {
        return Err(ParseBlockError::TooShort {
            got: len,
            need: MIN_BLOCK_HEADER_LEN,
        });
    }

    let magic = &block.buf[12..16];
    let format_version = if magic == MAGIC_V2 {
        2
    } else if magic == MAGIC_V1 {
        1
    } else {
        return Err(ParseBlockError::InvalidMagic);
    };

    let block_len = u32::from_be_bytes(block.buf[4..8].try_into().unwrap());
    if block_len > MAX_BLOCK_LENGTH {
        return Err(ParseBlockError::SanityFailed { block_len });
    }
    if block_len as usize > block.buf.len() {
        return Err(ParseBlockError::BufferTooSmall { required: block_len });
    }

    let header_len = block_header_len(format_version);
    if (len as u32) < block_len || len < header_len {
        return Err(ParseBlockError::TooShort {
            got: len,
            need: header_len.max(block_len as usize),
        });
    }

    block.format_version = format_version;
    block.block_number = u32::from_be_bytes(block.buf[8..12].try_into().unwrap());
    block.used_len = block_len as usize;

    if format_version >= 2 {
        block.volume_session_id = u32::from_be_bytes(block.buf[16..20].try_into().unwrap());
        block.volume_session_time = u32::from_be_bytes(block.buf[20..24].try_into().unwrap());
    }

    if checksum_enabled {
        let stored = u32::from_be_bytes(block.buf[0..4].try_into().unwrap());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(block.checksum_region());
        let computed = hasher.finalize();
        if stored != computed {
            block.read_errors += 1;
            if block.read_errors == 1 {
                log::warn!(
                    "block {}: checksum mismatch (stored {:#010x}, computed {:#010x})",
                    block.block_number,
                    stored,
                    computed
                );
            } else {
                log::debug!(
                    "block {}: additional checksum mismatch (error #{})",
                    block.block_number,
                    block.read_errors
                );
            }
            if !forge_on {
                return Err(ParseBlockError::ChecksumMismatch);
            }
        }
    }

    block.read_pos = header_len;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_v1() {
        let mut block = Block::new(4096, 1);
        block.block_number = 7;
        serialize_block_header(&mut block, true);
        let used = block.used_len();
        let mut read_block = Block::new(4096, 1);
        read_block.reset_for_read();
        read_block.as_mut_bytes_for_device_read()[..used].copy_from_slice(block.as_bytes());
        read_block.set_used_len(used);
        parse_block_header(&mut read_block, true, false).unwrap();
        assert_eq!(read_block.block_number, 7);
        assert_eq!(read_block.format_version, 1);
    }

    #[test]
    fn header_roundtrip_v2_carries_session() {
        let mut block = Block::new(4096, 2);
        block.block_number = 3;
        block.volume_session_id = 55;
        block.volume_session_time = 1234;
        serialize_block_header(&mut block, true);
        let used = block.used_len();

        let mut read_block = Block::new(4096, 2);
        read_block.reset_for_read();
        read_block.as_mut_bytes_for_device_read()[..used].copy_from_slice(block.as_bytes());
        read_block.set_used_len(used);
        parse_block_header(&mut read_block, true, false).unwrap();
        assert_eq!(read_block.volume_session_id, 55);
        assert_eq!(read_block.volume_session_time, 1234);
    }

    #[test]
    fn checksum_mismatch_detected_unless_forged() {
        let mut block = Block::new(256, 1);
        serialize_block_header(&mut block, true);
        let used = block.used_len();
        let mut raw = block.as_bytes().to_vec();
        // flip a byte in the payload/header region covered by the checksum
        raw[10] ^= 0xff;

        let mut read_block = Block::new(256, 1);
        read_block.reset_for_read();
        read_block.as_mut_bytes_for_device_read()[..used].copy_from_slice(&raw);
        read_block.set_used_len(used);
        let err = parse_block_header(&mut read_block, true, false).unwrap_err();
        assert_eq!(err, ParseBlockError::ChecksumMismatch);

        let mut read_block2 = Block::new(256, 1);
        read_block2.reset_for_read();
        read_block2.as_mut_bytes_for_device_read()[..used].copy_from_slice(&raw);
        read_block2.set_used_len(used);
        parse_block_header(&mut read_block2, true, true).expect("forge_on should continue");
    }

    #[test]
    fn oversized_block_len_is_sanity_failure_even_with_forge_on() {
        let mut block = Block::new(64, 1);
        // claim an enormous block_len regardless of what we actually wrote
        block.set_used_len(64);
        serialize_block_header(&mut block, false);
        block.as_mut_bytes_for_device_read()[4..8]
            .copy_from_slice(&(super::super::MAX_BLOCK_LENGTH + 1).to_be_bytes());
        let err = parse_block_header(&mut block, false, true).unwrap_err();
        assert!(matches!(err, ParseBlockError::SanityFailed { .. }));
    }
}
