//! The single producer side of a ring
//!
//! The open sequence is owned by the writer, so `write` never takes the
//! shared lock. Publishing hands the frozen buffer to the ring; from then on
//! the bytes are immutable and shared with every reader.

use bytes::BytesMut;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{RingError, RingResult};
use crate::ring::Shared;
use crate::span::{Coverage, SequenceInfo, Span};

struct OpenSequence {
    info: SequenceInfo,
    data: BytesMut,
    coverage: Vec<Coverage>,
}

impl OpenSequence {
    fn is_complete(&self) -> bool {
        self.coverage
            .iter()
            .all(|c| c.covers(self.info.source_bytes))
    }
}

pub struct RingWriter {
    shared: Arc<Shared>,
    open: Option<OpenSequence>,
    last_time_tag: Option<u64>,
    ended: bool,
}

impl RingWriter {
    pub(crate) fn new(shared: Arc<Shared>, last_time_tag: Option<u64>) -> Self {
        Self {
            shared,
            open: None,
            last_time_tag,
            ended: false,
        }
    }

    pub fn ring_name(&self) -> &str {
        &self.shared.name
    }

    /// Time tag of the sequence currently open, if any
    pub fn open_time_tag(&self) -> Option<u64> {
        self.open.as_ref().map(|o| o.info.time_tag)
    }

    /// Open a new sequence, force-closing any sequence still open
    ///
    /// The force-closed sequence is published with its completeness flag
    /// cleared if any of its bytes were never written. Publishing may wait
    /// on a guaranteed reader, hence `async`.
    pub async fn begin_sequence(&mut self, info: SequenceInfo) -> RingResult<()> {
        if info.nsrc == 0 {
            return Err(RingError::invalid_config("nsrc", "must be non-zero"));
        }
        if info.source_bytes == 0 {
            return Err(RingError::invalid_config("source_bytes", "must be non-zero"));
        }
        let size = info.span_bytes();
        if size > self.shared.config.slot_size {
            return Err(RingError::SpanTooLarge {
                size,
                slot_size: self.shared.config.slot_size,
            });
        }
        let last = self.open_time_tag().or(self.last_time_tag);
        if let Some(last) = last {
            if info.time_tag <= last {
                return Err(RingError::OutOfOrder {
                    time_tag: info.time_tag,
                    last,
                });
            }
        }

        if let Some(open) = self.open.take() {
            warn!(
                ring = %self.shared.name,
                time_tag = open.info.time_tag,
                "force-closing open sequence"
            );
            self.publish(open).await?;
        }

        let coverage = vec![Coverage::default(); info.nsrc];
        self.open = Some(OpenSequence {
            data: BytesMut::zeroed(size),
            info,
            coverage,
        });
        Ok(())
    }

    /// Copy `bytes` into one source's region at `offset`
    ///
    /// Out-of-range writes are rejected whole and leave the span untouched.
    pub fn write(&mut self, source: usize, offset: usize, bytes: &[u8]) -> RingResult<()> {
        let open = self.open.as_mut().ok_or(RingError::NoOpenSequence)?;
        let SequenceInfo {
            nsrc, source_bytes, ..
        } = open.info;
        if source >= nsrc {
            return Err(RingError::SourceOutOfRange {
                source_index: source,
                nsrc,
            });
        }
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= source_bytes)
            .ok_or(RingError::OutOfRange {
                offset,
                len: bytes.len(),
                region: source_bytes,
            })?;

        let base = source * source_bytes;
        open.data[base + offset..base + end].copy_from_slice(bytes);
        open.coverage[source].insert(offset, end);
        Ok(())
    }

    /// Publish the open sequence and return its span index
    ///
    /// Waits while a guaranteed reader pins a full backlog. Dropping the
    /// future before it completes discards the sequence; the writer stays
    /// usable.
    pub async fn end_sequence(&mut self) -> RingResult<u64> {
        let open = self.open.take().ok_or(RingError::NoOpenSequence)?;
        self.publish(open).await
    }

    /// Publish anything still open, then end the stream for all readers
    pub async fn end_writing(mut self) -> RingResult<()> {
        let result = match self.open.take() {
            Some(open) => self.publish(open).await.map(|_| ()),
            None => Ok(()),
        };
        self.finish();
        result
    }

    async fn publish(&mut self, open: OpenSequence) -> RingResult<u64> {
        let complete = open.is_complete();
        let SequenceInfo {
            time_tag,
            nsrc,
            source_bytes,
            header,
        } = open.info;
        let mut span = Some(Span {
            index: 0,
            time_tag,
            nsrc,
            source_bytes,
            header,
            data: open.data.freeze(),
            complete,
        });

        loop {
            let released = self.shared.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let published = {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return Err(self.shared.closed_error());
                }
                if state.spans.len() >= self.shared.config.backlog && !state.oldest_pinned() {
                    state.spans.pop_front();
                }
                if state.spans.len() < self.shared.config.backlog {
                    let mut span = span.take().ok_or(RingError::NoOpenSequence)?;
                    span.index = state.next_index;
                    state.next_index += 1;
                    state.last_time_tag = Some(span.time_tag);
                    let index = span.index;
                    state.spans.push_back(span);
                    Some(index)
                } else {
                    None
                }
            };

            match published {
                Some(index) => {
                    self.last_time_tag = Some(time_tag);
                    self.shared.published.notify_waiters();
                    debug!(ring = %self.shared.name, index, time_tag, complete, "span published");
                    return Ok(index);
                }
                None => {
                    debug!(ring = %self.shared.name, time_tag, "backlog full, waiting for guaranteed reader");
                    released.await;
                }
            }
        }
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        {
            let mut state = self.shared.state.lock();
            state.writing_ended = true;
            state.writer_live = false;
        }
        self.shared.published.notify_waiters();
    }
}

impl Drop for RingWriter {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        if let Some(open) = self.open.take() {
            warn!(
                ring = %self.shared.name,
                time_tag = open.info.time_tag,
                "writer dropped with an open sequence, discarding it"
            );
        }
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Guarantee, ReadEvent, Ring, RingConfig};

    #[tokio::test]
    async fn rejected_write_leaves_span_untouched() {
        let ring = Ring::open("writer_bounds", RingConfig::new(64, 4)).unwrap();
        let mut reader = ring.open_reader(Guarantee::Guaranteed);
        let mut writer = ring.writer().unwrap();

        writer.begin_sequence(SequenceInfo::new(1, 2, 4)).await.unwrap();
        writer.write(0, 0, &[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            writer.write(1, 2, &[9, 9, 9]),
            Err(RingError::OutOfRange { offset: 2, len: 3, region: 4 })
        ));
        assert!(matches!(
            writer.write(2, 0, &[9]),
            Err(RingError::SourceOutOfRange { source_index: 2, nsrc: 2 })
        ));
        assert!(writer.write(0, usize::MAX, &[9]).is_err());
        writer.write(1, 0, &[5, 6, 7, 8]).unwrap();
        writer.end_sequence().await.unwrap();

        let ReadEvent::Span(span) = reader.next().await else {
            panic!("expected span");
        };
        assert_eq!(&span.data[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(span.is_complete());
    }

    #[tokio::test]
    async fn order_and_size_checks() {
        let ring = Ring::open("writer_order", RingConfig::new(8, 4)).unwrap();
        let mut writer = ring.writer().unwrap();

        assert!(matches!(
            writer.begin_sequence(SequenceInfo::new(1, 3, 4)).await,
            Err(RingError::SpanTooLarge { size: 12, slot_size: 8 })
        ));
        assert!(matches!(writer.end_sequence().await, Err(RingError::NoOpenSequence)));
        assert!(matches!(writer.write(0, 0, &[1]), Err(RingError::NoOpenSequence)));

        writer.begin_sequence(SequenceInfo::new(10, 2, 4)).await.unwrap();
        writer.end_sequence().await.unwrap();
        assert_eq!(
            writer.begin_sequence(SequenceInfo::new(10, 2, 4)).await.unwrap_err(),
            RingError::OutOfOrder { time_tag: 10, last: 10 }
        );
    }

    #[tokio::test]
    async fn force_close_publishes_incomplete() {
        let ring = Ring::open("writer_force_close", RingConfig::new(64, 4)).unwrap();
        let mut reader = ring.open_reader(Guarantee::Guaranteed);
        let mut writer = ring.writer().unwrap();

        writer.begin_sequence(SequenceInfo::new(1, 2, 4)).await.unwrap();
        writer.write(0, 0, &[1, 1, 1, 1]).unwrap();
        writer.begin_sequence(SequenceInfo::new(2, 2, 4)).await.unwrap();
        writer.write(0, 0, &[2, 2, 2, 2]).unwrap();
        writer.write(1, 0, &[2, 2, 2, 2]).unwrap();
        writer.end_writing().await.unwrap();

        let ReadEvent::Span(first) = reader.next().await else {
            panic!("expected span");
        };
        assert!(!first.is_complete());
        assert_eq!(&first.source(1)[..], &[0, 0, 0, 0]);
        let ReadEvent::Span(second) = reader.next().await else {
            panic!("expected span");
        };
        assert!(second.is_complete());
        assert_eq!(reader.next().await, ReadEvent::End);
    }

    #[tokio::test]
    async fn dropped_writer_discards_open_sequence() {
        let ring = Ring::open("writer_drop", RingConfig::new(64, 4)).unwrap();
        let mut reader = ring.open_reader(Guarantee::Guaranteed);
        {
            let mut writer = ring.writer().unwrap();
            writer.begin_sequence(SequenceInfo::new(1, 1, 4)).await.unwrap();
        }
        assert!(ring.writing_ended());
        assert_eq!(reader.next().await, ReadEvent::End);
        assert_eq!(ring.stats().published, 0);
    }

    #[tokio::test]
    async fn closed_ring_rejects_publish() {
        let ring = Ring::open("writer_closed", RingConfig::new(64, 4)).unwrap();
        let mut writer = ring.writer().unwrap();
        writer.begin_sequence(SequenceInfo::new(1, 1, 4)).await.unwrap();
        ring.close();
        assert!(matches!(writer.end_sequence().await, Err(RingError::Closed { .. })));
    }

    #[tokio::test]
    async fn cancelled_publish_leaves_writer_usable() {
        let ring = Ring::open("writer_cancel_publish", RingConfig::new(64, 1)).unwrap();
        let mut reader = ring.open_reader(Guarantee::Guaranteed);
        let mut writer = ring.writer().unwrap();
        writer.begin_sequence(SequenceInfo::new(1, 1, 4)).await.unwrap();
        writer.end_sequence().await.unwrap();

        writer.begin_sequence(SequenceInfo::new(2, 1, 4)).await.unwrap();
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            writer.end_sequence(),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(writer.open_time_tag(), None);

        assert!(matches!(reader.try_next(), ReadEvent::Span(s) if s.time_tag == 1));
        writer.begin_sequence(SequenceInfo::new(3, 1, 4)).await.unwrap();
        assert_eq!(writer.end_sequence().await.unwrap(), 1);
        assert!(matches!(reader.try_next(), ReadEvent::Span(s) if s.time_tag == 3));
    }
}
