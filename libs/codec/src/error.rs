//! Codec errors for packet header processing
//!
//! Decode failures are per-packet and recoverable: the capture loop counts
//! them as invalid bytes and moves on. Encode failures surface to the caller
//! of the transmit path, since they indicate a parameter that cannot be
//! represented on the wire.

use thiserror::Error;

/// Header codec errors with enough context to tell which field or layout failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Datagram cannot be decoded as a header of the given protocol
    #[error("Invalid {protocol} header: {reason}")]
    InvalidHeader {
        protocol: &'static str,
        reason: String,
    },

    /// A header field does not fit in its declared wire width
    #[error("Invalid field {field}: value {value} exceeds maximum {max}")]
    InvalidField {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// A field used as a divisor or 1-based index is zero
    #[error("Invalid field {field}: must be non-zero")]
    ZeroField { field: &'static str },

    /// Output buffer cannot hold the encoded header
    #[error("Buffer too small for {protocol} header: need {need} bytes, got {got}")]
    BufferTooSmall {
        protocol: &'static str,
        need: usize,
        got: usize,
    },

    /// Protocol name not present in the registry
    #[error("Unknown protocol '{name}': supported protocols are simple, tbn, drx, pbeam, chips")]
    UnknownProtocol { name: String },

    /// A header record was handed to the codec of another protocol
    #[error("Protocol mismatch: codec is {expected}, header is {got}")]
    ProtocolMismatch {
        expected: &'static str,
        got: &'static str,
    },
}

impl CodecError {
    /// Buffer shorter than the fixed header layout
    pub fn truncated(protocol: &'static str, need: usize, got: usize) -> Self {
        Self::InvalidHeader {
            protocol,
            reason: format!("need {} bytes, got {}", need, got),
        }
    }

    /// Generic malformed header
    pub fn invalid_header(protocol: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            protocol,
            reason: reason.into(),
        }
    }

    /// Sync word mismatch, with a hint when the bytes are merely swapped
    pub fn bad_sync(protocol: &'static str, expected: u32, actual: u32) -> Self {
        let diagnosis = if actual.swap_bytes() == expected {
            "byte order mismatch"
        } else {
            "not a frame of this protocol"
        };
        Self::InvalidHeader {
            protocol,
            reason: format!(
                "sync word {:#010x}, expected {:#010x} ({})",
                actual, expected, diagnosis
            ),
        }
    }

    /// Field overflow of a declared width
    pub fn invalid_field(field: &'static str, value: u64, max: u64) -> Self {
        Self::InvalidField { field, value, max }
    }

    /// Zero in a field that must be non-zero
    pub fn zero_field(field: &'static str) -> Self {
        Self::ZeroField { field }
    }

    /// Unknown protocol tag
    pub fn unknown_protocol(name: impl Into<String>) -> Self {
        Self::UnknownProtocol { name: name.into() }
    }
}

/// Narrow a wide parameter into a wire field, failing with `InvalidField`
pub(crate) fn narrow<T>(field: &'static str, value: u64) -> CodecResult<T>
where
    T: TryFrom<u64> + Bounded,
{
    T::try_from(value).map_err(|_| CodecError::invalid_field(field, value, T::MAX_VALUE))
}

/// Maximum representable value of a wire integer type
pub(crate) trait Bounded {
    const MAX_VALUE: u64;
}

impl Bounded for u8 {
    const MAX_VALUE: u64 = u8::MAX as u64;
}

impl Bounded for u16 {
    const MAX_VALUE: u64 = u16::MAX as u64;
}

impl Bounded for u32 {
    const MAX_VALUE: u64 = u32::MAX as u64;
}

/// Check a value against an explicit bit width (for packed sub-byte fields)
pub(crate) fn check_bits(field: &'static str, value: u64, bits: u32) -> CodecResult<()> {
    let max = (1u64 << bits) - 1;
    if value > max {
        Err(CodecError::invalid_field(field, value, max))
    } else {
        Ok(())
    }
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;
