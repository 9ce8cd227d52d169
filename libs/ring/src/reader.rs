//! Reader cursors
//!
//! A guaranteed cursor is registered with the ring and pins every span it
//! has not yet consumed; the writer waits rather than reclaim one. A
//! best-effort cursor is private to the reader: when the writer laps it, the
//! next read reports how many spans were reclaimed unread and resumes at the
//! oldest span still retained.

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ring::Shared;
use crate::span::Span;

/// Delivery guarantee of a reader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guarantee {
    /// Never misses a span; throttles the writer up to the backlog
    #[default]
    Guaranteed,
    /// Never blocks anyone; may observe gaps
    BestEffort,
}

/// Outcome of one read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    Span(Span),
    /// `missed` spans were reclaimed before this cursor reached them
    Gap { missed: u64 },
    /// Nothing new yet (best-effort and `try_next` only)
    Empty,
    /// Writing has ended and every retained span has been read
    End,
}

pub struct RingReader {
    shared: Arc<Shared>,
    guarantee: Guarantee,
    id: Option<u64>,
    cursor: u64,
}

impl RingReader {
    pub(crate) fn new(shared: Arc<Shared>, guarantee: Guarantee) -> Self {
        let (id, cursor) = shared.register_reader(guarantee);
        Self {
            shared,
            guarantee,
            id,
            cursor,
        }
    }

    pub fn guarantee(&self) -> Guarantee {
        self.guarantee
    }

    /// Index of the next span this cursor will return
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Next event; guaranteed readers wait for data or end of stream
    pub async fn next(&mut self) -> ReadEvent {
        match self.guarantee {
            Guarantee::Guaranteed => self.wait_next().await,
            Guarantee::BestEffort => self.try_next(),
        }
    }

    /// Next event without waiting
    pub fn try_next(&mut self) -> ReadEvent {
        self.poll_ring().unwrap_or(ReadEvent::Empty)
    }

    /// Spans and gaps until end of stream
    ///
    /// The stream waits for new spans in both modes; a best-effort stream
    /// still never holds back the writer.
    pub fn into_stream(self) -> impl Stream<Item = ReadEvent> {
        stream::unfold(self, |mut reader| async move {
            match reader.wait_next().await {
                ReadEvent::End => None,
                event => Some((event, reader)),
            }
        })
    }

    async fn wait_next(&mut self) -> ReadEvent {
        let shared = Arc::clone(&self.shared);
        loop {
            let published = shared.published.notified();
            tokio::pin!(published);
            published.as_mut().enable();

            if let Some(event) = self.poll_ring() {
                return event;
            }
            published.await;
        }
    }

    /// `None` when the cursor is caught up and writing continues
    fn poll_ring(&mut self) -> Option<ReadEvent> {
        let event = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Some(ReadEvent::End);
            }

            let oldest = state.oldest_index();
            let event = if self.cursor < oldest {
                let missed = oldest - self.cursor;
                self.cursor = oldest;
                ReadEvent::Gap { missed }
            } else if let Some(span) = state.span_at(self.cursor) {
                let span = span.clone();
                self.cursor += 1;
                ReadEvent::Span(span)
            } else if state.writing_ended {
                return Some(ReadEvent::End);
            } else {
                return None;
            };

            if let Some(id) = self.id {
                state.cursors.insert(id, self.cursor);
            }
            event
        };

        if self.id.is_some() {
            self.shared.released.notify_waiters();
        }
        Some(event)
    }
}

impl Drop for RingReader {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.shared.unregister_reader(id);
        }
    }
}
