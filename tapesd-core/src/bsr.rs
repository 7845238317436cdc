use tapesd_block::Record;

/// One closed interval in a BSR match expression. `None` on either
/// bound means "unbounded in that direction"; an unset `Option` field
/// entirely means "don't filter on this dimension at all".
#[derive(Debug, Clone, Default)]
pub struct BsrInterval {
    pub volume_name: Option<String>,
    pub session_id: Option<(u32, u32)>,
    pub session_time: Option<(u32, u32)>,
    pub file_index: Option<(i32, i32)>,
    pub block_address: Option<((u32, u32), (u32, u32))>,
    pub stream_id: Option<(i32, i32)>,
}

/// A Backup Set Restrictor: an ordered list of match intervals walked
/// in order during restore (§3, §8 property P8).
#[derive(Debug, Clone, Default)]
pub struct Bsr {
    intervals: Vec<BsrInterval>,
    current: usize,
}

impl Bsr {
    pub fn new(intervals: Vec<BsrInterval>) -> Self {
        Bsr { intervals, current: 0 }
    }

    fn in_range_u32(value: u32, range: (u32, u32)) -> bool {
        value >= range.0 && value <= range.1
    }

    fn in_range_i32(value: i32, range: (i32, i32)) -> bool {
        value >= range.0 && value <= range.1
    }

    /// Cheap pre-filter at block granularity: true if the block's
    /// session/file-index range could plausibly contain a matching
    /// record for the interval currently being walked.
    pub fn match_bsr_block(
        &self,
        volume_session_id: u32,
        volume_session_time: u32,
        first_file_index: i32,
        last_file_index: i32,
    ) -> bool {
        let interval = match self.intervals.get(self.current) {
            Some(i) => i,
            None => return false,
        };

        if let Some(range) = interval.session_id {
            if !Self::in_range_u32(volume_session_id, range) {
                return false;
            }
        }
        if let Some(range) = interval.session_time {
            if !Self::in_range_u32(volume_session_time, range) {
                return false;
            }
        }
        if let Some(range) = interval.file_index {
            if last_file_index != 0 && last_file_index < range.0 {
                return false;
            }
            if first_file_index != 0 && first_file_index > range.1 {
                return false;
            }
        }
        true
    }

    /// The exact, record-level filter. `volume_name` is the name of
    /// the volume the record was read from.
    pub fn match_bsr(&self, volume_name: &str, record: &Record) -> bool {
        let interval = match self.intervals.get(self.current) {
            Some(i) => i,
            None => return false,
        };

        if let Some(name) = &interval.volume_name {
            if name != volume_name {
                return false;
            }
        }
        if let Some(range) = interval.session_id {
            if !Self::in_range_u32(record.volume_session_id, range) {
                return false;
            }
        }
        if let Some(range) = interval.session_time {
            if !Self::in_range_u32(record.volume_session_time, range) {
                return false;
            }
        }
        if let Some(range) = interval.file_index {
            if !Self::in_range_i32(record.file_index, range) {
                return false;
            }
        }
        if let Some(range) = interval.stream_id {
            if !Self::in_range_i32(record.stream_id, range) {
                return false;
            }
        }
        true
    }

    /// Start address of the interval currently being walked, for
    /// repositioning the device.
    pub fn get_bsr_start_addr(&self) -> Option<(u32, u32)> {
        self.intervals
            .get(self.current)
            .and_then(|i| i.block_address)
            .map(|(start, _end)| start)
    }

    /// True once `record` satisfies the upper bound of the interval
    /// currently being walked, meaning the reader should advance to
    /// the next interval (or stop, if this was the last).
    pub fn is_this_bsr_done(&self, record: &Record) -> bool {
        let interval = match self.intervals.get(self.current) {
            Some(i) => i,
            None => return true,
        };
        match interval.file_index {
            Some((_, hi)) => record.file_index >= hi,
            None => false,
        }
    }

    /// Advances to the next interval; returns false once every
    /// interval has been walked (the read loop should stop).
    pub fn advance(&mut self) -> bool {
        self.current += 1;
        self.current < self.intervals.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.current >= self.intervals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file_index: i32) -> Record {
        Record {
            volume_session_id: 1,
            volume_session_time: 100,
            file_index,
            stream_id: 1,
            data: Vec::new(),
        }
    }

    #[test]
    fn file_index_range_matches_inclusively() {
        let bsr = Bsr::new(vec![BsrInterval {
            file_index: Some((2, 5)),
            ..Default::default()
        }]);
        assert!(bsr.match_bsr("vol1", &record(2)));
        assert!(bsr.match_bsr("vol1", &record(5)));
        assert!(!bsr.match_bsr("vol1", &record(6)));
    }

    #[test]
    fn advance_walks_intervals_in_order() {
        let mut bsr = Bsr::new(vec![BsrInterval::default(), BsrInterval::default()]);
        assert!(!bsr.is_exhausted());
        assert!(bsr.advance());
        assert!(!bsr.advance());
        assert!(bsr.is_exhausted());
    }
}
