//! Statistics sinks
//!
//! Capture and transmit publish counters through [`MetricsSink::put`] and
//! never learn where they go.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::{BlockId, StatsSnapshot};
use crate::{Result, TransportError};

pub trait MetricsSink: Send + Sync {
    fn put(&self, block: &BlockId, stats: &StatsSnapshot);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn put(&self, _block: &BlockId, _stats: &StatsSnapshot) {}
}

/// Emits one `info!` event per publish
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn put(&self, block: &BlockId, stats: &StatsSnapshot) {
        info!(
            block = %block,
            good = stats.good,
            missing = stats.missing,
            invalid = stats.invalid,
            late = stats.late,
            nvalid = stats.nvalid,
            loss = stats.loss_fraction(),
            "stream stats"
        );
    }
}

/// Keeps the latest snapshot of every block for polling
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    latest: Arc<RwLock<HashMap<BlockId, StatsSnapshot>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, block: &BlockId) -> Option<StatsSnapshot> {
        self.latest.read().get(block).copied()
    }

    pub fn blocks(&self) -> Vec<BlockId> {
        self.latest.read().keys().cloned().collect()
    }
}

impl MetricsSink for MemorySink {
    fn put(&self, block: &BlockId, stats: &StatsSnapshot) {
        self.latest.write().insert(block.clone(), *stats);
    }
}

/// Writes `<dir>/<pid>/<block>/stats` as `key : value` lines
///
/// The file is rewritten whole on every publish so pollers always see one
/// consistent set of counters.
#[derive(Debug, Clone)]
pub struct ProcLogSink {
    root: PathBuf,
}

impl ProcLogSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            root: dir.as_ref().join(std::process::id().to_string()),
        }
    }

    pub fn path_for(&self, block: &BlockId) -> PathBuf {
        self.root.join(block.to_string()).join("stats")
    }

    pub fn write(&self, block: &BlockId, stats: &StatsSnapshot) -> Result<()> {
        let path = self.path_for(block);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                TransportError::io(format!("Failed to create {}", parent.display()), e)
            })?;
        }
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)
            .map_err(|e| TransportError::io(format!("Failed to create {}", tmp.display()), e))?;
        write!(
            file,
            "ngood_bytes : {}\nnmissing_bytes : {}\nninvalid_bytes : {}\nnlate_bytes : {}\nnvalid : {}\n",
            stats.good, stats.missing, stats.invalid, stats.late, stats.nvalid
        )
        .map_err(|e| TransportError::io(format!("Failed to write {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .map_err(|e| TransportError::io(format!("Failed to replace {}", path.display()), e))
    }
}

impl MetricsSink for ProcLogSink {
    fn put(&self, block: &BlockId, stats: &StatsSnapshot) {
        if let Err(e) = self.write(block, stats) {
            warn!("Dropping stats for {}: {}", block, e);
        }
    }
}

/// Sink selected by the `[stats]` table
pub fn sink_from_config(config: &config::StatsConfig) -> Arc<dyn MetricsSink> {
    match config.sink {
        config::SinkKind::None => Arc::new(NullSink),
        config::SinkKind::Log => Arc::new(LogSink),
        config::SinkKind::Proclog => Arc::new(ProcLogSink::new(&config.proclog_dir)),
    }
}
