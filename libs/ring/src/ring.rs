//! Ring handle, shared state and the process-wide name registry
//!
//! All bookkeeping that writer and readers share lives behind one
//! `parking_lot::Mutex`: the retained spans, the guaranteed cursors and the
//! lifecycle flags. Sample data itself is never touched under the lock; the
//! writer fills its own buffer and readers receive reference-counted views.
//!
//! Two `Notify` handles carry wakeups: `published` wakes readers waiting for
//! a span, `released` wakes a writer waiting for the slowest guaranteed
//! cursor to move past the oldest retained span.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{RingError, RingResult};
use crate::reader::{Guarantee, RingReader};
use crate::span::{RingStats, Span};
use crate::writer::RingWriter;

static REGISTRY: Lazy<Mutex<HashMap<String, Weak<Shared>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Ring sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    /// Largest span the ring accepts, in bytes
    pub slot_size: usize,
    /// Spans retained for readers before the oldest is reclaimed
    pub backlog: usize,
}

impl RingConfig {
    pub fn new(slot_size: usize, backlog: usize) -> Self {
        Self { slot_size, backlog }
    }

    fn validate(&self) -> RingResult<()> {
        if self.slot_size == 0 {
            return Err(RingError::invalid_config("slot_size", "must be non-zero"));
        }
        if self.backlog == 0 {
            return Err(RingError::invalid_config("backlog", "must be non-zero"));
        }
        Ok(())
    }
}

pub(crate) struct State {
    pub(crate) spans: VecDeque<Span>,
    /// Index the next published span receives
    pub(crate) next_index: u64,
    pub(crate) last_time_tag: Option<u64>,
    /// Next unread index of every live guaranteed reader, by reader id
    pub(crate) cursors: HashMap<u64, u64>,
    next_reader_id: u64,
    pub(crate) writer_live: bool,
    pub(crate) writing_ended: bool,
    pub(crate) closed: bool,
}

impl State {
    pub(crate) fn oldest_index(&self) -> u64 {
        self.spans
            .front()
            .map(|s| s.index)
            .unwrap_or(self.next_index)
    }

    /// Retained span at `index`, if still held
    pub(crate) fn span_at(&self, index: u64) -> Option<&Span> {
        let offset = index.checked_sub(self.oldest_index())?;
        self.spans.get(usize::try_from(offset).ok()?)
    }

    /// True if some guaranteed cursor has not yet consumed the oldest span
    pub(crate) fn oldest_pinned(&self) -> bool {
        let oldest = self.oldest_index();
        self.cursors.values().any(|&next| next <= oldest)
    }
}

pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) config: RingConfig,
    pub(crate) state: Mutex<State>,
    pub(crate) published: Notify,
    pub(crate) released: Notify,
}

impl Shared {
    pub(crate) fn closed_error(&self) -> RingError {
        RingError::Closed {
            name: self.name.clone(),
        }
    }

    pub(crate) fn register_reader(&self, guarantee: Guarantee) -> (Option<u64>, u64) {
        let mut state = self.state.lock();
        let start = state.oldest_index();
        let id = match guarantee {
            Guarantee::Guaranteed => {
                let id = state.next_reader_id;
                state.next_reader_id += 1;
                state.cursors.insert(id, start);
                Some(id)
            }
            Guarantee::BestEffort => None,
        };
        (id, start)
    }

    pub(crate) fn unregister_reader(&self, id: u64) {
        self.state.lock().cursors.remove(&id);
        self.released.notify_waiters();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let mut registry = REGISTRY.lock();
        if registry
            .get(&self.name)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            registry.remove(&self.name);
        }
    }
}

/// Named span buffer shared by one writer and any number of readers
///
/// Cloning the handle shares the same ring. The name stays reserved until
/// the last handle, writer and reader has been dropped.
#[derive(Clone)]
pub struct Ring {
    shared: Arc<Shared>,
}

impl Ring {
    pub fn open(name: impl Into<String>, config: RingConfig) -> RingResult<Self> {
        let name = name.into();
        config.validate()?;

        let mut registry = REGISTRY.lock();
        if registry.get(&name).is_some_and(|weak| weak.strong_count() > 0) {
            return Err(RingError::AlreadyExists { name });
        }

        let shared = Arc::new(Shared {
            name: name.clone(),
            config,
            state: Mutex::new(State {
                spans: VecDeque::with_capacity(config.backlog),
                next_index: 0,
                last_time_tag: None,
                cursors: HashMap::new(),
                next_reader_id: 0,
                writer_live: false,
                writing_ended: false,
                closed: false,
            }),
            published: Notify::new(),
            released: Notify::new(),
        });
        registry.insert(name.clone(), Arc::downgrade(&shared));
        debug!(ring = %name, slot_size = config.slot_size, backlog = config.backlog, "ring opened");
        Ok(Self { shared })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> RingConfig {
        self.shared.config
    }

    /// Take the single writer of this ring
    pub fn writer(&self) -> RingResult<RingWriter> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(self.shared.closed_error());
        }
        if state.writer_live {
            return Err(RingError::WriterBusy {
                name: self.shared.name.clone(),
            });
        }
        if state.writing_ended {
            return Err(RingError::WritingEnded {
                name: self.shared.name.clone(),
            });
        }
        state.writer_live = true;
        let last_time_tag = state.last_time_tag;
        drop(state);
        Ok(RingWriter::new(Arc::clone(&self.shared), last_time_tag))
    }

    /// Open a cursor at the oldest retained span
    pub fn open_reader(&self, guarantee: Guarantee) -> RingReader {
        RingReader::new(Arc::clone(&self.shared), guarantee)
    }

    /// End the stream and wake every waiter
    ///
    /// Readers see `End` from their next call on, guaranteed readers
    /// included, even with retained spans still unread; the writer's next
    /// operation fails with `Closed`. For a drained shutdown end writing
    /// with [`RingWriter::end_writing`] instead and let readers reach `End`
    /// on their own.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.writing_ended = true;
        }
        debug!(ring = %self.shared.name, "ring closed");
        self.shared.published.notify_waiters();
        self.shared.released.notify_waiters();
    }

    pub fn writing_ended(&self) -> bool {
        self.shared.state.lock().writing_ended
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn stats(&self) -> RingStats {
        let state = self.shared.state.lock();
        RingStats {
            published: state.next_index,
            oldest: state.spans.front().map(|s| s.index),
            retained: state.spans.len(),
            guaranteed_readers: state.cursors.len(),
            writing_ended: state.writing_ended,
        }
    }
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .finish()
    }
}
