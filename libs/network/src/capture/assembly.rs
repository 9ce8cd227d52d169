//! Bookkeeping for the span being assembled
//!
//! The bytes themselves live in the ring's open write sequence; this only
//! tracks which (time, source) slots have arrived.

use bytes::Bytes;
use codec::{DataType, PacketHeader, Protocol};
use serde::{Deserialize, Serialize};

use super::CaptureConfig;

/// Fixed by the first valid packet of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Origin {
    pub seq0: u64,
    pub payload_size: usize,
    pub ticks_per_seq: u64,
}

/// Received map of one interval, indexed `source * span_ntime + t`
#[derive(Debug)]
pub(crate) struct Assembly {
    pub interval: u64,
    received: Vec<bool>,
    nreceived: usize,
    span_ntime: usize,
}

impl Assembly {
    pub fn new(interval: u64, nsrc: usize, span_ntime: usize) -> Self {
        Self {
            interval,
            received: vec![false; nsrc * span_ntime],
            nreceived: 0,
            span_ntime,
        }
    }

    /// Mark a slot received; false if it already was
    pub fn mark(&mut self, source: usize, t: usize) -> bool {
        let slot = source * self.span_ntime + t;
        if self.received[slot] {
            return false;
        }
        self.received[slot] = true;
        self.nreceived += 1;
        true
    }

    pub fn is_full(&self) -> bool {
        self.nreceived == self.received.len()
    }

    pub fn missing_slots(&self) -> usize {
        self.received.len() - self.nreceived
    }
}

/// Metadata attached to every captured span, serialized as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceHeader {
    pub protocol: Protocol,
    pub time_tag: u64,
    /// Sequence number of the span's first time step
    pub seq0: u64,
    pub nsrc: usize,
    pub src0: u32,
    pub span_ntime: u64,
    /// Payload bytes of one packet
    pub payload_size: usize,
    pub dtype: DataType,
    pub chan0: u32,
    pub nchan: u32,
    pub tuning: u32,
    pub decimation: u32,
}

impl SequenceHeader {
    pub(crate) fn describe(
        header: &PacketHeader,
        dtype: DataType,
        time_tag: u64,
        seq0: u64,
        config: &CaptureConfig,
        payload_size: usize,
    ) -> Self {
        let channels = header.channels();
        Self {
            protocol: header.protocol(),
            time_tag,
            seq0,
            nsrc: config.nsrc,
            src0: config.src0,
            span_ntime: config.span_ntime,
            payload_size,
            dtype,
            chan0: channels.chan0,
            nchan: channels.nchan,
            tuning: channels.tuning,
            decimation: channels.decimation,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        // a struct of plain fields always serializes
        Bytes::from(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
