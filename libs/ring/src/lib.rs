//! # Stream Ring
//!
//! ## Purpose
//!
//! Sequence-addressable hand-off of assembled spans from one producer to
//! any number of independently paced consumers, in bounded memory.
//!
//! ## Architecture Role
//!
//! ```text
//! capture ──▶ RingWriter ──▶ [retained spans, ≤ backlog] ──▶ RingReader (guaranteed)
//!                                                        └─▶ RingReader (best effort)
//! ```
//!
//! Spans become visible in strictly increasing `time_tag` order. A
//! guaranteed reader never misses a span: when `backlog` spans are retained
//! and the oldest is still unread by a guaranteed cursor, the writer waits.
//! Best-effort readers never hold the writer back and are told, through
//! [`ReadEvent::Gap`], how many spans were reclaimed before they got there.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo() -> stream_ring::RingResult<()> {
//! use stream_ring::{Guarantee, ReadEvent, Ring, RingConfig, SequenceInfo};
//!
//! let ring = Ring::open("capture_tbn", RingConfig::new(1 << 20, 16))?;
//! let mut reader = ring.open_reader(Guarantee::Guaranteed);
//! let mut writer = ring.writer()?;
//!
//! writer.begin_sequence(SequenceInfo::new(0, 2, 1024)).await?;
//! writer.write(1, 0, &[0u8; 1024])?;
//! writer.end_sequence().await?;
//! writer.end_writing().await?;
//!
//! while let ReadEvent::Span(span) = reader.next().await {
//!     assert!(!span.is_complete());
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod reader;
pub mod ring;
pub mod span;
pub mod writer;

pub use error::{RingError, RingResult};
pub use reader::{Guarantee, ReadEvent, RingReader};
pub use ring::{Ring, RingConfig};
pub use span::{RingStats, SequenceInfo, Span};
pub use writer::RingWriter;
