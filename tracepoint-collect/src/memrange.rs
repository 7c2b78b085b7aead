//! Memory ranges and the interval merger

use serde::{Deserialize, Serialize};

/// What a range's addresses are relative to
///
/// Ordering compares register kinds by number and puts `Absolute` after all
/// of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RangeKind {
    /// Offset from the live value of this remote register
    Register(u32),
    /// Plain virtual address
    Absolute,
}

/// Half-open byte range `[start, end)` to collect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemRange {
    pub kind: RangeKind,
    pub start: i64,
    pub end: i64,
}

impl MemRange {
    pub fn new(kind: RangeKind, start: i64, end: i64) -> Self {
        debug_assert!(start <= end, "range start {} past end {}", start, end);
        Self { kind, start, end }
    }

    /// Number of bytes covered
    pub fn size(&self) -> u64 {
        self.end.abs_diff(self.start)
    }
}

/// Sort `ranges` by kind and start, then coalesce overlapping or adjacent
/// ranges of the same kind in place
pub fn merge_ranges(ranges: &mut Vec<MemRange>) {
    if ranges.is_empty() {
        return;
    }
    ranges.sort_by_key(|r| (r.kind, r.start));

    let mut a = 0;
    for b in 1..ranges.len() {
        let next = ranges[b];
        let acc = &mut ranges[a];
        if acc.kind == next.kind && next.start <= acc.end {
            acc.end = acc.end.max(next.end);
            continue;
        }
        a += 1;
        ranges[a] = next;
    }
    ranges.truncate(a + 1);
}
