//! Wire layouts, one module per protocol
//!
//! Every layout is a `#[repr(C)]` struct of unaligned big-endian fields, so
//! decoding is a bounds-checked copy out of the datagram with no per-field
//! offset arithmetic.
//!
//! ```text
//! ┌──────────────────────────────┬───────────────────────────────┐
//! │ fixed header (8..32 bytes)   │ N samples in declared dtype   │
//! └──────────────────────────────┴───────────────────────────────┘
//! ```

use std::mem::size_of;
use zerocopy::byteorder::{BigEndian, U16, U32, U64};
use zerocopy::{AsBytes, FromBytes};

use crate::error::{CodecError, CodecResult};
use crate::header::PacketHeader;

mod chips;
mod drx;
mod pbeam;
mod simple;
mod tbn;

pub use chips::{ChipsCodec, ChipsHeader};
pub use drx::{DrxCodec, DrxHeader};
pub use pbeam::{PbeamCodec, PbeamHeader};
pub use simple::{SimpleCodec, SimpleHeader};
pub use tbn::{TbnCodec, TbnHeader};

/// Sync word opening TBN and DRX frames
pub const SYNC_WORD: u32 = 0x5CDE_C0DE;

pub(crate) type Be16 = U16<BigEndian>;
pub(crate) type Be32 = U32<BigEndian>;
pub(crate) type Be64 = U64<BigEndian>;

/// Copy a wire header out of the front of a datagram
pub(crate) fn read_wire<W: FromBytes>(protocol: &'static str, datagram: &[u8]) -> CodecResult<W> {
    W::read_from_prefix(datagram)
        .ok_or_else(|| CodecError::truncated(protocol, size_of::<W>(), datagram.len()))
}

/// Write a wire header into the front of `out`
pub(crate) fn write_wire<W: AsBytes>(
    protocol: &'static str,
    wire: &W,
    out: &mut [u8],
) -> CodecResult<usize> {
    let need = size_of::<W>();
    wire.write_to_prefix(out).ok_or(CodecError::BufferTooSmall {
        protocol,
        need,
        got: out.len(),
    })?;
    Ok(need)
}

pub(crate) fn mismatch(expected: &'static str, header: &PacketHeader) -> CodecError {
    CodecError::ProtocolMismatch {
        expected,
        got: header.protocol().name(),
    }
}

pub(crate) fn non_zero(field: &'static str, value: u64) -> CodecResult<()> {
    if value == 0 {
        Err(CodecError::zero_field(field))
    } else {
        Ok(())
    }
}
