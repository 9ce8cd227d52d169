//! Per-instance byte accounting
//!
//! Every capture and transmit instance owns one [`StreamStats`]. Counters
//! only ever grow; consumers derive rates and loss from the deltas of
//! successive [`StatsSnapshot`]s.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod sinks;

pub use sinks::{sink_from_config, LogSink, MemorySink, MetricsSink, NullSink, ProcLogSink};

/// Lock-free counters shared between the owning loop and any observer
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    good: Arc<AtomicU64>,
    missing: Arc<AtomicU64>,
    invalid: Arc<AtomicU64>,
    late: Arc<AtomicU64>,
    nvalid: Arc<AtomicU64>,
}

/// Counters pin at `u64::MAX` instead of wrapping
#[inline]
fn saturating_add(counter: &AtomicU64, n: u64) {
    // the closure never returns None, so the update cannot fail
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_add(n))
    });
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one accepted packet carrying `bytes` of payload
    #[inline]
    pub fn record_good(&self, bytes: usize) {
        saturating_add(&self.good, bytes as u64);
        saturating_add(&self.nvalid, 1);
    }

    #[inline]
    pub fn add_missing(&self, bytes: u64) {
        saturating_add(&self.missing, bytes);
    }

    #[inline]
    pub fn add_invalid(&self, bytes: usize) {
        saturating_add(&self.invalid, bytes as u64);
    }

    #[inline]
    pub fn add_late(&self, bytes: usize) {
        saturating_add(&self.late, bytes as u64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            good: self.good.load(Ordering::Relaxed),
            missing: self.missing.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
            nvalid: self.nvalid.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
///
/// Byte counts except `nvalid`, which counts accepted packets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub good: u64,
    pub missing: u64,
    pub invalid: u64,
    pub late: u64,
    pub nvalid: u64,
}

impl StatsSnapshot {
    /// `missing / (good + missing)`, zero before any data
    pub fn loss_fraction(&self) -> f64 {
        let total = self.good as f64 + self.missing as f64;
        if total == 0.0 {
            0.0
        } else {
            self.missing as f64 / total
        }
    }

    /// Growth since `prev`
    pub fn delta(&self, prev: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            good: self.good.saturating_sub(prev.good),
            missing: self.missing.saturating_sub(prev.missing),
            invalid: self.invalid.saturating_sub(prev.invalid),
            late: self.late.saturating_sub(prev.late),
            nvalid: self.nvalid.saturating_sub(prev.nvalid),
        }
    }

    /// Good bytes per second since `prev`
    pub fn rate(&self, prev: &StatsSnapshot, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.delta(prev).good as f64 / secs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Capture,
    Transmit,
}

/// Stable identifier of one instance in the statistics export
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    pub role: Role,
    pub name: String,
}

impl BlockId {
    pub fn capture(name: impl Into<String>) -> Self {
        Self {
            role: Role::Capture,
            name: name.into(),
        }
    }

    pub fn transmit(name: impl Into<String>) -> Self {
        Self {
            role: Role::Transmit,
            name: name.into(),
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            Role::Capture => "udp_capture",
            Role::Transmit => "udp_transmit",
        };
        write!(f, "{}/{}", role, self.name)
    }
}
