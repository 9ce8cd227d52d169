//! Published spans and the per-sequence metadata that opens them

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Metadata supplied when the writer opens a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    /// Time tag of the first sample in the span
    pub time_tag: u64,
    pub nsrc: usize,
    /// Size of each source's region
    pub source_bytes: usize,
    /// Opaque header handed to readers unchanged
    pub header: Bytes,
}

impl SequenceInfo {
    pub fn new(time_tag: u64, nsrc: usize, source_bytes: usize) -> Self {
        Self {
            time_tag,
            nsrc,
            source_bytes,
            header: Bytes::new(),
        }
    }

    pub fn with_header(mut self, header: impl Into<Bytes>) -> Self {
        self.header = header.into();
        self
    }

    pub fn span_bytes(&self) -> usize {
        self.nsrc * self.source_bytes
    }
}

/// One published span: a read-only view of every source's region
///
/// The data is laid out source-major, `source_bytes` per source. Cloning a
/// span clones reference-counted views and never copies sample data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub index: u64,
    pub time_tag: u64,
    pub nsrc: usize,
    pub source_bytes: usize,
    pub header: Bytes,
    pub data: Bytes,
    pub(crate) complete: bool,
}

impl Span {
    /// True if every byte of every source region was written
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Region of one source, empty if `source` is out of range
    pub fn source(&self, source: usize) -> Bytes {
        if source >= self.nsrc {
            return Bytes::new();
        }
        let start = source * self.source_bytes;
        self.data.slice(start..start + self.source_bytes)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Snapshot of ring bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingStats {
    /// Spans published since the ring opened
    pub published: u64,
    /// Index of the oldest retained span, if any
    pub oldest: Option<u64>,
    pub retained: usize,
    pub guaranteed_readers: usize,
    pub writing_ended: bool,
}

/// Byte-range coverage of one source region
///
/// Ranges are kept sorted and merged, so completeness is exact even when
/// writes arrive out of order or overlap.
#[derive(Debug, Clone, Default)]
pub(crate) struct Coverage {
    ranges: Vec<(usize, usize)>,
}

impl Coverage {
    pub(crate) fn insert(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let pos = self.ranges.partition_point(|&(_, e)| e < start);
        let mut merged = (start, end);
        let mut last = pos;
        while last < self.ranges.len() && self.ranges[last].0 <= merged.1 {
            merged.0 = merged.0.min(self.ranges[last].0);
            merged.1 = merged.1.max(self.ranges[last].1);
            last += 1;
        }
        self.ranges.splice(pos..last, [merged]);
    }

    pub(crate) fn covers(&self, len: usize) -> bool {
        len == 0 || self.ranges.first() == Some(&(0, len))
    }
}
