//! # Packet Header Codecs
//!
//! ## Purpose
//!
//! Fixed binary header layouts for the UDP packet formats produced by
//! digitizers and beamformers. Each protocol is a stateless
//! [`HeaderCodec`] that decodes the header at the front of a datagram into
//! a [`PacketHeader`] record and encodes such a record back, byte for byte.
//!
//! ## Architecture Role
//!
//! ```text
//! socket bytes → [codec] → capture state machine → ring spans
//!                   ↑
//!       transmit ── build/encode
//! ```
//!
//! ## What This Crate Contains
//! - [`Protocol`] registry resolving a stream's protocol name once
//! - Per-protocol wire layouts (simple, tbn, drx, pbeam, chips)
//! - [`DataType`] sample encodings and their sizes
//! - [`HeaderInfo`] parameters for the transmit path
//!
//! ## What This Crate Does NOT Contain
//! - Socket handling (belongs in `network`)
//! - Span assembly or buffering (belongs in `network` and `stream-ring`)
//! - Payload sample conversion

pub mod dtype;
pub mod error;
pub mod formats;
pub mod header;
pub mod protocol;

pub use dtype::DataType;
pub use error::{CodecError, CodecResult};
pub use formats::{
    ChipsHeader, DrxHeader, PbeamHeader, SimpleHeader, TbnHeader, SYNC_WORD,
};
pub use header::{ChannelInfo, HeaderInfo, PacketHeader};
pub use protocol::{lookup, HeaderCodec, Protocol};
