use crate::{record_header_len, Block, CodecError};

/// A logical record as seen by a client of the block layer: a stream
/// of bytes tagged with a `file_index` (positive for ordinary data, a
/// negative sentinel for session/label markers, §6.2) and a signed
/// `stream_id` whose sign marks continuation (§4.1/§4.2).
#[derive(Debug, Clone)]
pub struct Record {
    pub volume_session_id: u32,
    pub volume_session_time: u32,
    pub file_index: i32,
    pub stream_id: i32,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(file_index: i32, stream_id: i32) -> Self {
        Record {
            volume_session_id: 0,
            volume_session_time: 0,
            file_index,
            stream_id,
            data: Vec::new(),
        }
    }
}

/// Outcome of writing one record header + as much of its payload as
/// fits into the remaining free space of the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The whole record (header + payload) fit; `written` bytes of
    /// payload were copied.
    Complete { written: usize },
    /// Only a header, or header plus a partial payload, fit. The
    /// caller must close the block, start a new one, and continue
    /// with a continuation record (negative `stream_id`) carrying the
    /// remaining `data[written..]`.
    Partial { written: usize },
    /// Not even the header fits; the caller must close the block
    /// first and retry against a fresh one.
    NoRoom,
}

/// Writes a record's origin header at the block's current write
/// position, followed by as much of `data` as fits. Does not itself
/// call `serialize_block_header` — the caller does that once the
/// block is full or the session ends. `data` must be the record's
/// full remaining payload (§4.1 `record.remainder`); the header's
/// `data_len` field carries that full length, not just whatever
/// happens to fit in this block — only the stored payload bytes are
/// clipped to what fits (§6.2, scenario 2).
pub fn write_record_payload_slice(block: &mut Block, record: &Record, data: &[u8]) -> WriteOutcome {
    write_record_fragment(block, record, data, false)
}

/// Writes a continuation record header carrying the tail of a payload
/// that spilled across a block boundary. `stream_id` is always
/// negated here regardless of whether this fragment itself finishes
/// the record — the sign marks "this is a continuation", not "more
/// will follow" — and `data_len` is `remaining.len()`, the bytes still
/// outstanding as of this fragment, not the original record length.
pub fn serialize_record_continuation(
    block: &mut Block,
    record: &Record,
    remaining: &[u8],
) -> WriteOutcome {
    write_record_fragment(block, record, remaining, true)
}

fn write_record_fragment(block: &mut Block, record: &Record, data: &[u8], continuation: bool) -> WriteOutcome {
    let header_len = record_header_len(block.format_version);
    let free = block.free_bytes();
    if free < header_len {
        return WriteOutcome::NoRoom;
    }

    let available_for_payload = free - header_len;
    let to_write = data.len().min(available_for_payload);
    let complete = to_write == data.len();

    let data_len = data.len() as u32;
    let start = block.used_len();

    {
        let buf = block.as_mut_bytes_for_device_read();
        let mut off = start;

        if block.format_version < 2 {
            buf[off..off + 4].copy_from_slice(&record.volume_session_id.to_be_bytes());
            off += 4;
            buf[off..off + 4].copy_from_slice(&record.volume_session_time.to_be_bytes());
            off += 4;
        }

        buf[off..off + 4].copy_from_slice(&record.file_index.to_be_bytes());
        off += 4;

        let stream_id = if continuation { -record.stream_id.abs() } else { record.stream_id };
        buf[off..off + 4].copy_from_slice(&stream_id.to_be_bytes());
        off += 4;

        buf[off..off + 4].copy_from_slice(&data_len.to_be_bytes());
        off += 4;

        buf[off..off + to_write].copy_from_slice(&data[..to_write]);
        off += to_write;

        debug_assert_eq!(off, start + header_len + to_write);
    }

    block.set_used_len(start + header_len + to_write);

    if record.file_index > 0 {
        if block.first_file_index == 0 {
            block.first_file_index = record.file_index;
        }
        block.last_file_index = record.file_index;
    }

    if complete {
        WriteOutcome::Complete { written: to_write }
    } else {
        WriteOutcome::Partial { written: to_write }
    }
}

/// Header-only write, used when the caller wants to reserve space for
/// a record before it knows the exact payload length (rare — present
/// for parity with the source's two-phase record writer).
pub fn serialize_record_header(block: &mut Block, record: &Record, data_len: u32) -> bool {
    let header_len = record_header_len(block.format_version);
    if block.free_bytes() < header_len {
        return false;
    }
    let start = block.used_len();
    {
        let buf = block.as_mut_bytes_for_device_read();
        let mut off = start;
        if block.format_version < 2 {
            buf[off..off + 4].copy_from_slice(&record.volume_session_id.to_be_bytes());
            off += 4;
            buf[off..off + 4].copy_from_slice(&record.volume_session_time.to_be_bytes());
            off += 4;
        }
        buf[off..off + 4].copy_from_slice(&record.file_index.to_be_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&record.stream_id.to_be_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&data_len.to_be_bytes());
    }
    block.set_used_len(start + header_len);
    true
}

/// Outcome of attempting to parse one record fragment at the block's
/// current read position.
#[derive(Debug)]
pub enum ParseRecordOutcome {
    /// A full header plus payload fragment was parsed.
    Fragment {
        record: Record,
        /// True when `stream_id` carried a negative sign: this
        /// fragment continues a record whose origin header was in an
        /// earlier block (§6.2), and reassembly must key off
        /// `(volume_session_id, volume_session_time)` rather than
        /// treat it as a new record.
        is_continuation: bool,
        /// True when this fragment's payload is the whole of
        /// `data_len` (i.e. the fragment wasn't clipped by the
        /// block's free space) — the record is complete and ready to
        /// deliver. False means the caller must keep reading
        /// continuation fragments from subsequent blocks.
        fragment_complete: bool,
    },
    /// The block has no more record headers (`read_pos == used_len`).
    EndOfBlock,
}

/// Parses one record header and its payload fragment out of `block`
/// at the current read position, advancing it past the fragment.
///
/// `data_len` in the header is the record's full *remaining* length
/// as of this fragment (§6.2), not necessarily the number of payload
/// bytes physically present here — a fragment only ever carries as
/// much as fits in what's left of the block. The number of bytes
/// actually read is `data_len.min(bytes left in block)`.
pub fn parse_record_from_block(block: &mut Block) -> Result<ParseRecordOutcome, CodecError> {
    if !block.has_more_records() {
        return Ok(ParseRecordOutcome::EndOfBlock);
    }

    let header_len = record_header_len(block.format_version);
    let pos = block.read_pos();
    let used = block.used_len();
    if pos + header_len > used {
        return Err(CodecError::TruncatedHeader);
    }

    let buf = block.as_bytes_for_parse();
    let mut off = pos;

    let (volume_session_id, volume_session_time) = if block.format_version < 2 {
        let vsi = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let vst = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        (vsi, vst)
    } else {
        (block.volume_session_id, block.volume_session_time)
    };

    let file_index = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
    off += 4;
    let raw_stream_id = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
    off += 4;
    let data_len = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
    off += 4;

    let data_len = data_len as usize;
    let present = data_len.min(used.saturating_sub(off));

    let data = buf[off..off + present].to_vec();
    off += present;

    block.set_read_pos(off);

    let is_continuation = raw_stream_id < 0;
    let stream_id = raw_stream_id.abs();
    let fragment_complete = present == data_len;

    Ok(ParseRecordOutcome::Fragment {
        record: Record {
            volume_session_id,
            volume_session_time,
            file_index,
            stream_id,
            data,
        },
        is_continuation,
        fragment_complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_one_record(format_version: u8, block_len: usize, payload_len: usize) {
        let mut block = Block::new(block_len, format_version);
        let record = Record::new(42, 7);
        let payload = vec![0xab; payload_len];

        let outcome = write_record_payload_slice(&mut block, &record, &payload);
        assert_eq!(outcome, WriteOutcome::Complete { written: payload_len });
        crate::serialize_block_header(&mut block, true);

        let used = block.used_len();
        let mut read_block = Block::new(block_len, format_version);
        read_block.reset_for_read();
        read_block.as_mut_bytes_for_device_read()[..used].copy_from_slice(block.as_bytes());
        read_block.set_used_len(used);
        crate::parse_block_header(&mut read_block, true, false).unwrap();

        match parse_record_from_block(&mut read_block).unwrap() {
            ParseRecordOutcome::Fragment { record: got, is_continuation, fragment_complete } => {
                assert!(!is_continuation);
                assert!(fragment_complete);
                assert_eq!(got.file_index, 42);
                assert_eq!(got.stream_id, 7);
                assert_eq!(got.data, payload);
            }
            ParseRecordOutcome::EndOfBlock => panic!("expected a fragment"),
        }

        assert!(matches!(
            parse_record_from_block(&mut read_block).unwrap(),
            ParseRecordOutcome::EndOfBlock
        ));
    }

    #[test]
    fn small_record_roundtrips_v1() {
        roundtrip_one_record(1, 4096, 100);
    }

    #[test]
    fn small_record_roundtrips_v2() {
        roundtrip_one_record(2, 4096, 100);
    }

    /// Writes `payload` the way `AppendSession::write_record_inner`
    /// does: the origin fragment via `write_record_payload_slice`,
    /// every later fragment via `serialize_record_continuation`.
    fn write_split_across_blocks(format_version: u8, block_len: usize, record: &Record, payload: &[u8]) -> Vec<(Block, usize)> {
        let mut remaining = payload;
        let mut blocks = Vec::new();
        let mut is_continuation = false;

        loop {
            let mut block = Block::new(block_len, format_version);
            let outcome = if is_continuation {
                serialize_record_continuation(&mut block, record, remaining)
            } else {
                write_record_payload_slice(&mut block, record, remaining)
            };
            match outcome {
                WriteOutcome::Complete { written } | WriteOutcome::Partial { written } => {
                    remaining = &remaining[written..];
                    is_continuation = true;
                    crate::serialize_block_header(&mut block, true);
                    let used = block.used_len();
                    blocks.push((block, used));
                    if remaining.is_empty() {
                        break;
                    }
                }
                WriteOutcome::NoRoom => panic!("header should always fit in a fresh block"),
            }
        }

        blocks
    }

    #[test]
    fn continuation_splits_payload_across_blocks() {
        let format_version = 2;
        let block_len = 64;
        let record = Record::new(10, 3);
        let payload = vec![0x5a; 500];

        let blocks = write_split_across_blocks(format_version, block_len, &record, &payload);
        assert!(blocks.len() > 1, "payload should have spilled across multiple blocks");

        let mut reassembled = Vec::new();
        for (block, used) in blocks.iter() {
            let mut read_block = Block::new(block_len, format_version);
            read_block.reset_for_read();
            read_block.as_mut_bytes_for_device_read()[..*used].copy_from_slice(block.as_bytes());
            read_block.set_used_len(*used);
            crate::parse_block_header(&mut read_block, true, false).unwrap();

            if let ParseRecordOutcome::Fragment { record: got, .. } =
                parse_record_from_block(&mut read_block).unwrap()
            {
                reassembled.extend_from_slice(&got.data);
            }
        }

        assert_eq!(reassembled, payload);
    }

    /// Bit-exact check of scenario 2 (§8): the origin header carries
    /// the positive `stream_id` and the *full* `data_len`; the
    /// continuation header carries `-stream_id` and `data_len =
    /// original - prefix_len`, not the per-fragment physical length.
    #[test]
    fn scenario_2_continuation_header_fields_match_spec() {
        let format_version = 2;
        let block_len = 64512;
        let record = Record::new(1, 9);
        let payload = vec![0x11u8; 70000];

        let blocks = write_split_across_blocks(format_version, block_len, &record, &payload);
        assert_eq!(blocks.len(), 2, "a 70000-byte record in a 64512-byte block should split into exactly two blocks");

        let block_hdr_len = crate::block_header_len(format_version);
        let rec_hdr_len = record_header_len(format_version);
        let prefix_len = block_len - block_hdr_len - rec_hdr_len;

        let (block1, used1) = &blocks[0];
        assert_eq!(*used1, block_len);
        let stream1 = i32::from_be_bytes(block1.as_bytes()[block_hdr_len + 4..block_hdr_len + 8].try_into().unwrap());
        let data_len1 = u32::from_be_bytes(block1.as_bytes()[block_hdr_len + 8..block_hdr_len + 12].try_into().unwrap());
        assert_eq!(stream1, 9, "origin header must carry the positive stream_id");
        assert_eq!(data_len1, 70000, "origin header's data_len is the full record length");

        let (block2, used2) = &blocks[1];
        let remaining = payload.len() - prefix_len;
        assert_eq!(*used2, block_hdr_len + rec_hdr_len + remaining);
        let stream2 = i32::from_be_bytes(block2.as_bytes()[block_hdr_len + 4..block_hdr_len + 8].try_into().unwrap());
        let data_len2 = u32::from_be_bytes(block2.as_bytes()[block_hdr_len + 8..block_hdr_len + 12].try_into().unwrap());
        assert_eq!(stream2, -9, "continuation header must carry the negated stream_id");
        assert_eq!(data_len2, remaining as u32, "continuation header's data_len is what's still outstanding");

        let mut read_block1 = Block::new(block_len, format_version);
        read_block1.reset_for_read();
        read_block1.as_mut_bytes_for_device_read()[..*used1].copy_from_slice(block1.as_bytes());
        read_block1.set_used_len(*used1);
        crate::parse_block_header(&mut read_block1, true, false).unwrap();
        match parse_record_from_block(&mut read_block1).unwrap() {
            ParseRecordOutcome::Fragment { is_continuation, fragment_complete, .. } => {
                assert!(!is_continuation);
                assert!(!fragment_complete, "the origin fragment alone doesn't carry the whole record");
            }
            ParseRecordOutcome::EndOfBlock => panic!("expected a fragment"),
        }

        let mut read_block2 = Block::new(block_len, format_version);
        read_block2.reset_for_read();
        read_block2.as_mut_bytes_for_device_read()[..*used2].copy_from_slice(block2.as_bytes());
        read_block2.set_used_len(*used2);
        crate::parse_block_header(&mut read_block2, true, false).unwrap();
        match parse_record_from_block(&mut read_block2).unwrap() {
            ParseRecordOutcome::Fragment { is_continuation, fragment_complete, .. } => {
                assert!(is_continuation);
                assert!(fragment_complete, "the whole remainder fit in the second block");
            }
            ParseRecordOutcome::EndOfBlock => panic!("expected a fragment"),
        }
    }
}
