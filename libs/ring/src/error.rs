//! Ring error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    /// Another live ring holds this name
    #[error("Ring '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("Invalid ring configuration: {field} {message}")]
    InvalidConfig {
        field: &'static str,
        message: String,
    },

    /// A live writer already owns this ring
    #[error("Ring '{name}' already has a writer")]
    WriterBusy { name: String },

    /// Writing was ended on this ring and cannot resume
    #[error("Writing has ended on ring '{name}'")]
    WritingEnded { name: String },

    #[error("No open sequence to write into")]
    NoOpenSequence,

    /// Spans must be published in strictly increasing time_tag order
    #[error("Sequence time_tag {time_tag} not after last published {last}")]
    OutOfOrder { time_tag: u64, last: u64 },

    #[error("Span of {size} bytes exceeds slot size {slot_size}")]
    SpanTooLarge { size: usize, slot_size: usize },

    #[error("Source {source_index} out of range (nsrc {nsrc})")]
    SourceOutOfRange { source_index: usize, nsrc: usize },

    /// Write would cross the end of its source region
    #[error("Write of {len} bytes at offset {offset} exceeds source region of {region} bytes")]
    OutOfRange {
        offset: usize,
        len: usize,
        region: usize,
    },

    #[error("Ring '{name}' is closed")]
    Closed { name: String },
}

impl RingError {
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}

pub type RingResult<T> = std::result::Result<T, RingError>;
